use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Confession, Reactions, Role, User};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the socket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserEnvelope {
    pub user: User,
}

// -- Confessions --

/// Raw submission as it arrives over REST or the socket. Enum-valued fields stay
/// strings here so validation can report unknown values per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateConfessionRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub emotions: Vec<String>,
    #[serde(default)]
    pub anonymity_level: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub audio_content: Option<String>,
    #[serde(default)]
    pub location: Option<LocationInput>,
}

/// Client-reported coordinates. Extra keys (city, country) are tolerated and ignored;
/// missing or out-of-range coordinates drop the location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationInput {
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateConfessionRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub emotions: Option<Vec<String>>,
    #[serde(default)]
    pub anonymity_level: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReactRequest {
    pub reaction_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfessionResponse {
    pub message: String,
    pub confession: Confession,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfessionEnvelope {
    pub confession: Confession,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfessionPage {
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u32,
    pub confessions: Vec<Confession>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NearbyResponse {
    pub count: usize,
    pub confessions: Vec<Confession>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReactionResponse {
    pub message: String,
    pub reactions: Reactions,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub message: String,
    pub confession_id: Uuid,
}

// -- Misc --

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub database: String,
    pub viewers: usize,
}

/// One failed check on a submitted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}
