use thiserror::Error;

use models::{BookingId, BookingStatus, ModelError, Role};

use crate::api::ApiError;
use crate::errors::ErrorKind;

/// Failures of user-triggered booking operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("a {role} cannot move a booking from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus, role: Role },
    #[error("not signed in")]
    NotAuthenticated,
    #[error("not allowed: {0}")]
    NotAuthorized(String),
    #[error("booking {0} not found")]
    NotFound(BookingId),
    #[error("{0}")]
    Validation(String),
    /// Server refused the credential.
    #[error("{0}")]
    Unauthorized(String),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    /// The owning view went away before the response arrived.
    #[error("response discarded: view no longer mounted")]
    Detached,
}

impl BookingError {
    pub fn from_api(err: ApiError, default_message: &str) -> Self {
        let message = err.message_or(default_message);
        match err {
            ApiError::Network(m) => BookingError::Network(m),
            ApiError::Decode(m) => BookingError::UnexpectedResponse(m),
            ApiError::Unauthorized { .. } => BookingError::Unauthorized(message),
            ApiError::Rejected { status, .. } => BookingError::Rejected { status, message },
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            BookingError::InvalidTransition { .. } => 2001,
            BookingError::Validation(_) => 2002,
            BookingError::NotFound(_) => 2004,
            BookingError::NotAuthenticated => 2005,
            BookingError::Unauthorized(_) => 2006,
            BookingError::NotAuthorized(_) => 2007,
            BookingError::Rejected { .. } => 2010,
            BookingError::Network(_) => 2100,
            BookingError::UnexpectedResponse(_) => 2101,
            BookingError::Detached => 2200,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::InvalidTransition { .. } | BookingError::Validation(_) | BookingError::NotFound(_) => {
                ErrorKind::Validation
            }
            BookingError::NotAuthenticated | BookingError::Unauthorized(_) => ErrorKind::Authentication,
            BookingError::NotAuthorized(_) | BookingError::Rejected { status: 403, .. } => ErrorKind::Authorization,
            BookingError::Rejected { status: 400 | 409 | 422, .. } => ErrorKind::Validation,
            BookingError::Rejected { .. } | BookingError::Network(_) | BookingError::UnexpectedResponse(_) => {
                ErrorKind::Network
            }
            BookingError::Detached => ErrorKind::Internal,
        }
    }
}

impl From<ModelError> for BookingError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Validation(m) => BookingError::Validation(m),
            other => BookingError::Validation(other.to_string()),
        }
    }
}
