use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use regret_gateway::feed::SubmitRejection;
use regret_types::api::{ErrorBody, FieldError};

/// Machine-readable reason attached to each field failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCode {
    MissingContent,
    ContentTooLong,
    InvalidEmotion,
    InvalidAnonymityLevel,
    InvalidAudio,
    InvalidContentType,
    TooManyTags,
    TagTooLong,
    InvalidUsername,
    InvalidEmail,
    WeakPassword,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingContent => "missing_content",
            Self::ContentTooLong => "content_too_long",
            Self::InvalidEmotion => "invalid_emotion",
            Self::InvalidAnonymityLevel => "invalid_anonymity_level",
            Self::InvalidAudio => "invalid_audio",
            Self::InvalidContentType => "invalid_content_type",
            Self::TooManyTags => "too_many_tags",
            Self::TagTooLong => "tag_too_long",
            Self::InvalidUsername => "invalid_username",
            Self::InvalidEmail => "invalid_email",
            Self::WeakPassword => "weak_password",
        }
    }
}

/// Every failed check from one validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, field: &str, code: ValidationCode, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            code: code.as_str().to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, code: ValidationCode) -> bool {
        self.0.iter().any(|e| e.code == code.as_str())
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    /// `Ok(value)` if nothing failed.
    pub fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.0.is_empty() { Ok(value) } else { Err(self) }
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    InvalidCredentials(&'static str),

    #[error("You are not allowed to modify this confession")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many confessions, please try again later")]
    RateLimitExceeded,

    #[error("Internal server error")]
    Persistence(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing body. Storage failures are logged here and never leak details.
    fn into_body(self) -> ErrorBody {
        let error = self.to_string();
        match self {
            Self::Validation(errors) => ErrorBody {
                error,
                details: errors.into_inner(),
            },
            Self::Persistence(e) => {
                error!("Storage failure: {:#}", e);
                ErrorBody {
                    error,
                    details: vec![],
                }
            }
            _ => ErrorBody {
                error,
                details: vec![],
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self.into_body())).into_response()
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        Self::BadRequest("Invalid confession id".into())
    }
}

/// Socket submissions report the same status and body a REST create would.
impl From<ApiError> for SubmitRejection {
    fn from(err: ApiError) -> Self {
        let status = err.status().as_u16();
        let body = err.into_body();
        SubmitRejection {
            status,
            error: body.error,
            details: body.details,
        }
    }
}
