//! Branch authentication for the sync server.
//!
//! Every push and pull carries a bearer credential that identifies one
//! branch. Two kinds are accepted:
//!
//! - **Issued credentials**, signed with a server secret. No server-side
//!   state is needed to verify them.
//! - **Static keys**, a configured table of pre-shared keys.
//!
//! ## Credential Format
//!
//! Issued credentials are composed of:
//! - 16 bytes: branch id
//! - 32 bytes: HMAC-SHA256(secret, branch id)
//!
//! Total: 48 bytes, hex-encoded for transport (96 characters).

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use branchsync_protocol::RecordId;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const ID_LEN: usize = 16;
const SIGNATURE_LEN: usize = 32;

fn invalid_key() -> ServerError {
    ServerError::AuthenticationFailed("Invalid API key".into())
}

/// Issues and verifies branch credentials.
#[derive(Clone)]
pub struct BranchCredentials {
    secret: Vec<u8>,
}

impl BranchCredentials {
    /// Creates a credential authority with the given secret.
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| ServerError::Internal(e.to_string()))
    }

    /// Issues the credential for a branch.
    pub fn issue(&self, branch_id: RecordId) -> ServerResult<String> {
        let mut mac = self.mac()?;
        mac.update(branch_id.as_bytes());
        let signature = mac.finalize().into_bytes();

        let mut token = Vec::with_capacity(ID_LEN + SIGNATURE_LEN);
        token.extend_from_slice(branch_id.as_bytes());
        token.extend_from_slice(&signature);
        Ok(hex::encode(token))
    }

    /// Verifies a credential and returns the branch it was issued for.
    pub fn verify(&self, token: &str) -> ServerResult<RecordId> {
        let bytes = hex::decode(token.trim()).map_err(|_| invalid_key())?;
        if bytes.len() != ID_LEN + SIGNATURE_LEN {
            return Err(invalid_key());
        }
        let (id, signature) = bytes.split_at(ID_LEN);

        let mut mac = self.mac()?;
        mac.update(id);
        mac.verify_slice(signature).map_err(|_| invalid_key())?;

        let id: [u8; ID_LEN] = id.try_into().map_err(|_| invalid_key())?;
        Ok(RecordId::from_bytes(id))
    }
}

impl fmt::Debug for BranchCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchCredentials").finish_non_exhaustive()
    }
}

/// Resolves bearer credentials to branches.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    credentials: Option<BranchCredentials>,
    static_keys: HashMap<String, RecordId>,
}

impl Authenticator {
    /// Builds an authenticator from server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            credentials: config.credential_secret.clone().map(BranchCredentials::new),
            static_keys: config.static_keys.clone(),
        }
    }

    /// Returns true if requests must carry a credential.
    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some() || !self.static_keys.is_empty()
    }

    /// Authenticates a request.
    ///
    /// Returns `Ok(None)` when authentication is disabled, otherwise the
    /// branch the credential belongs to.
    pub fn authenticate(&self, bearer: Option<&str>) -> ServerResult<Option<RecordId>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let token = bearer
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServerError::AuthenticationFailed("Authorization header required".into()))?;

        if let Some(branch) = self.static_keys.get(token) {
            return Ok(Some(*branch));
        }
        match &self.credentials {
            Some(credentials) => credentials.verify(token).map(Some),
            None => Err(invalid_key()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> BranchCredentials {
        BranchCredentials::new(b"test-secret-key-32-bytes-long!!".to_vec())
    }

    #[test]
    fn issue_and_verify() {
        let branch = RecordId::new();
        let token = credentials().issue(branch).unwrap();
        assert_eq!(token.len(), 96);
        assert_eq!(credentials().verify(&token).unwrap(), branch);
    }

    #[test]
    fn reject_wrong_secret() {
        let token = credentials().issue(RecordId::new()).unwrap();
        let other = BranchCredentials::new(b"another-secret".to_vec());
        assert!(matches!(
            other.verify(&token),
            Err(ServerError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn reject_tampered_branch() {
        let token = credentials().issue(RecordId::from_bytes([1u8; 16])).unwrap();
        let forged = format!("{}{}", hex::encode([2u8; 16]), &token[32..]);
        assert!(credentials().verify(&forged).is_err());
    }

    #[test]
    fn reject_malformed() {
        assert!(credentials().verify("not-hex").is_err());
        assert!(credentials().verify("abcd").is_err());
        assert!(credentials().verify("").is_err());
    }

    #[test]
    fn disabled_authenticator_allows_everything() {
        let auth = Authenticator::from_config(&ServerConfig::new());
        assert!(!auth.is_enabled());
        assert_eq!(auth.authenticate(None).unwrap(), None);
        assert_eq!(auth.authenticate(Some("whatever")).unwrap(), None);
    }

    #[test]
    fn static_keys_and_issued_credentials() {
        let static_branch = RecordId::new();
        let issued_branch = RecordId::new();
        let secret = b"test-secret-key-32-bytes-long!!".to_vec();
        let config = ServerConfig::new()
            .with_static_key("dapur-key", static_branch)
            .with_credential_secret(secret);
        let auth = Authenticator::from_config(&config);
        let token = credentials().issue(issued_branch).unwrap();

        assert_eq!(auth.authenticate(Some("dapur-key")).unwrap(), Some(static_branch));
        assert_eq!(auth.authenticate(Some(&token)).unwrap(), Some(issued_branch));
        assert!(auth.authenticate(Some("wrong")).is_err());
        assert!(matches!(
            auth.authenticate(None),
            Err(ServerError::AuthenticationFailed(m)) if m.contains("required")
        ));
    }

    #[test]
    fn static_only_rejects_unknown_keys() {
        let auth = Authenticator::from_config(
            &ServerConfig::new().with_static_key("dapur-key", RecordId::new()),
        );
        assert!(auth.authenticate(Some("other")).is_err());
    }
}
