//! Server configuration.

use branchsync_protocol::RecordId;
use std::collections::HashMap;

/// Configuration for the cloud sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum records (both kinds together) accepted in one push.
    pub max_push_batch: usize,
    /// Secret for verifying issued branch credentials.
    pub credential_secret: Option<Vec<u8>>,
    /// Pre-shared keys mapped to the branch they authenticate.
    pub static_keys: HashMap<String, RecordId>,
}

impl ServerConfig {
    /// Creates a configuration with authentication disabled.
    pub fn new() -> Self {
        Self {
            max_push_batch: 500,
            credential_secret: None,
            static_keys: HashMap::new(),
        }
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Enables issued-credential authentication with the given secret.
    pub fn with_credential_secret(mut self, secret: Vec<u8>) -> Self {
        self.credential_secret = Some(secret);
        self
    }

    /// Registers a pre-shared key for a branch.
    pub fn with_static_key(mut self, key: impl Into<String>, branch_id: RecordId) -> Self {
        self.static_keys.insert(key.into(), branch_id);
        self
    }

    /// Returns true if requests must carry a credential.
    pub fn require_auth(&self) -> bool {
        self.credential_secret.is_some() || !self.static_keys.is_empty()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
