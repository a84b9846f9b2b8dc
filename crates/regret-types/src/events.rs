use serde::{Deserialize, Serialize};

use crate::api::{CreateConfessionRequest, FieldError};
use crate::models::Confession;

/// Events sent over the live socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum SocketEvent {
    /// Public confessions from the trailing 24 hours, newest first. Sent once on connect.
    InitialConfessions(Vec<Confession>),

    /// A public confession was just created
    NewConfession(Confession),

    /// A `submitConfession` from this viewer was refused
    SubmitRejected {
        status: u16,
        error: String,
        details: Vec<FieldError>,
    },
}

/// Commands sent FROM client TO server over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum SocketCommand {
    /// Same payload and pipeline as `POST /api/confessions`
    SubmitConfession(CreateConfessionRequest),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_command_parses_from_wire_shape() {
        let raw = r#"{"type":"submitConfession","data":{"content":"hi","emotions":["hope"]}}"#;
        let SocketCommand::SubmitConfession(req) = serde_json::from_str(raw).unwrap();
        assert_eq!(req.content.as_deref(), Some("hi"));
        assert_eq!(req.emotions, vec!["hope".to_string()]);
    }

    #[test]
    fn rejection_event_shape() {
        let event = SocketEvent::SubmitRejected {
            status: 429,
            error: "Too many confessions. Please try again later.".into(),
            details: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "submitRejected");
        assert_eq!(json["data"]["status"], 429);
    }
}
