use thiserror::Error;

use crate::api::ApiError;
use crate::errors::{ErrorKind, ServiceError};

/// Business errors for session workflows
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),
    /// Credentials or token refused during an interactive attempt.
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Map a collaborator failure, using `default_message` when the server
    /// gave no explanation.
    pub fn from_api(err: ApiError, default_message: &str) -> Self {
        let message = err.message_or(default_message);
        match err {
            ApiError::Network(m) => AuthError::Network(m),
            ApiError::Decode(m) => AuthError::UnexpectedResponse(m),
            ApiError::Unauthorized { .. } => AuthError::InvalidCredentials(message),
            ApiError::Rejected { status, .. } => AuthError::Rejected { status, message },
        }
    }

    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            AuthError::Validation(_) => 1001,
            AuthError::InvalidCredentials(_) => 1004,
            AuthError::NotAuthenticated => 1005,
            AuthError::Rejected { .. } => 1010,
            AuthError::Network(_) => 1100,
            AuthError::UnexpectedResponse(_) => 1101,
            AuthError::Storage(_) => 1200,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::InvalidCredentials(_) | AuthError::NotAuthenticated => ErrorKind::Authentication,
            AuthError::Rejected { status: 403, .. } => ErrorKind::Authorization,
            AuthError::Rejected { status: 400 | 409 | 422, .. } => ErrorKind::Validation,
            AuthError::Rejected { .. } | AuthError::Network(_) | AuthError::UnexpectedResponse(_) => ErrorKind::Network,
            AuthError::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl From<models::ModelError> for AuthError {
    fn from(e: models::ModelError) -> Self {
        match e {
            models::ModelError::Validation(m) => AuthError::Validation(m),
            other => AuthError::Validation(other.to_string()),
        }
    }
}

impl From<ServiceError> for AuthError {
    fn from(e: ServiceError) -> Self {
        AuthError::Storage(e.to_string())
    }
}
