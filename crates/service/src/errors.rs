use thiserror::Error;

/// Coarse classification every workflow error maps onto before it reaches a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or expired credential.
    Authentication,
    /// Valid session, insufficient role or ownership.
    Authorization,
    /// Malformed request rejected before dispatch.
    Validation,
    /// Transport failure or a non-success response from the server.
    Network,
    /// Local bookkeeping failure (storage, detached controller).
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("storage error: {0}")]
    Storage(String),
}

impl ServiceError {
    pub fn storage(e: impl std::fmt::Display) -> Self { Self::Storage(e.to_string()) }
}
