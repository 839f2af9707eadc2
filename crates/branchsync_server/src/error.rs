//! Error types for the sync server.

use branchsync_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Credential missing or not valid.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No route for the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Route exists but not for this method.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::AuthenticationFailed(_)
                | ServerError::NotFound(_)
                | ServerError::MethodNotAllowed(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Store(_) | ServerError::Internal(_))
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::AuthenticationFailed(_) => 401,
            ServerError::NotFound(_) => 404,
            ServerError::MethodNotAllowed(_) => 405,
            ServerError::Store(_) | ServerError::Internal(_) => 500,
        }
    }

    /// Message safe to put in a response envelope.
    pub fn public_message(&self) -> String {
        match self {
            ServerError::Store(_) | ServerError::Internal(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }
}
