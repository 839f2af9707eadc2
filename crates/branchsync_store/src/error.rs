//! Error types for store operations.

use branchsync_protocol::{ProtocolError, RecordId, RecordKind};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An insert hit an existing identity.
    #[error("{kind} {id} already exists")]
    Duplicate {
        /// Record kind.
        kind: RecordKind,
        /// Record identity.
        id: RecordId,
    },

    /// The record failed validation and was not written.
    #[error("invalid {kind} {id}: {source}")]
    InvalidRecord {
        /// Record kind.
        kind: RecordKind,
        /// Record identity.
        id: RecordId,
        /// What was wrong with it.
        #[source]
        source: ProtocolError,
    },

    /// A uniqueness or integrity rule was violated.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The store cannot serve requests right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Returns true if retrying the same write can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            StoreError::Duplicate { .. } | StoreError::InvalidRecord { .. } | StoreError::Constraint(_)
        )
    }
}
