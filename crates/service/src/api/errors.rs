use thiserror::Error;

use crate::errors::ErrorKind;

/// Failure talking to the marketplace REST API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("network error: {0}")]
    Network(String),
    /// 401: credential missing, invalid or expired.
    #[error("unauthorized: {}", .message.as_deref().unwrap_or("credential rejected"))]
    Unauthorized { message: Option<String> },
    /// Any other non-success status.
    #[error("request rejected ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    Rejected { status: u16, message: Option<String> },
    /// Success status but a body we could not understand.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected { status, message: Some(message.into()) }
    }

    /// Server-supplied message, or `default` when the body carried none.
    pub fn message_or(&self, default: &str) -> String {
        match self {
            ApiError::Unauthorized { message: Some(m) } | ApiError::Rejected { message: Some(m), .. } => m.clone(),
            ApiError::Network(_) => "Network error".to_string(),
            _ => default.to_string(),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized { .. } => ErrorKind::Authentication,
            ApiError::Rejected { status: 403, .. } => ErrorKind::Authorization,
            ApiError::Rejected { status: 400 | 422, .. } => ErrorKind::Validation,
            ApiError::Network(_) | ApiError::Rejected { .. } | ApiError::Decode(_) => ErrorKind::Network,
        }
    }
}
