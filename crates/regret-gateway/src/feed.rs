use std::future::Future;

use regret_types::api::{CreateConfessionRequest, FieldError};
use regret_types::models::Confession;

/// Why a socket submission was refused. Mirrors the REST status codes.
#[derive(Debug, Clone)]
pub struct SubmitRejection {
    pub status: u16,
    pub error: String,
    pub details: Vec<FieldError>,
}

/// What the connection loop needs from the rest of the service.
pub trait ConfessionFeed: Clone + Send + Sync + 'static {
    /// Public confessions sent to a viewer right after it connects, newest first.
    fn snapshot(&self) -> impl Future<Output = anyhow::Result<Vec<Confession>>> + Send;

    /// Run a `submitConfession` through the same pipeline as a REST create.
    /// A successful public create is broadcast by the implementation.
    fn submit(
        &self,
        req: CreateConfessionRequest,
    ) -> impl Future<Output = Result<Confession, SubmitRejection>> + Send;
}
