//! Protocol messages for sync.
//!
//! Every endpoint has its own typed request/response structure. Responses
//! travel inside an [`ApiEnvelope`], which must be checked with
//! [`ApiEnvelope::into_data`] before the payload is used.

use crate::error::{ProtocolError, ProtocolResult};
use crate::id::RecordId;
use crate::record::{Branch, Transaction};
use crate::timestamp::{self, format_timestamp, parse_timestamp, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Standard response wrapper used by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Whether the request succeeded.
    pub success: bool,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Endpoint-specific payload.
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Creates a successful envelope.
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Creates a failed envelope with no payload.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    /// Unwraps the payload, rejecting failed or empty envelopes.
    pub fn into_data(self) -> ProtocolResult<T> {
        if !self.success {
            return Err(ProtocolError::Rejected(self.message));
        }
        self.data.ok_or(ProtocolError::MissingField("data"))
    }
}

impl<T: Serialize> ApiEnvelope<T> {
    /// Encodes to JSON bytes.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<T: DeserializeOwned> ApiEnvelope<T> {
    /// Decodes from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Push request: local unreconciled records sent edge → cloud.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Branch records.
    #[serde(default)]
    pub branches: Vec<Branch>,
    /// Transaction records.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(branches: Vec<Branch>, transactions: Vec<Transaction>) -> Self {
        Self {
            branches,
            transactions,
        }
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.branches.len() + self.transactions.len()
    }

    /// Returns true if there is nothing to push.
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.transactions.is_empty()
    }

    /// Encodes to JSON bytes.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decodes a push body one record at a time, skipping entries that do
    /// not decode (unknown `type`, bad UUID, missing fields).
    ///
    /// The body itself must still be an object whose record fields are
    /// arrays.
    pub fn from_json_lenient(bytes: &[u8]) -> ProtocolResult<LenientPush> {
        let raw: RawPushRequest = serde_json::from_slice(bytes)?;
        let mut malformed = 0;
        let branches = decode_each(raw.branches, &mut malformed);
        let transactions = decode_each(raw.transactions, &mut malformed);
        Ok(LenientPush {
            request: PushRequest::new(branches, transactions),
            malformed,
        })
    }
}

/// A push body decoded record by record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LenientPush {
    /// Records that decoded.
    pub request: PushRequest,
    /// Entries that did not.
    pub malformed: usize,
}

#[derive(Deserialize)]
struct RawPushRequest {
    #[serde(default)]
    branches: Vec<serde_json::Value>,
    #[serde(default)]
    transactions: Vec<serde_json::Value>,
}

fn decode_each<T: DeserializeOwned>(
    values: Vec<serde_json::Value>,
    malformed: &mut usize,
) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(_) => {
                *malformed += 1;
                None
            }
        })
        .collect()
}

/// Push response: the identities the cloud applied, per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Number of records in the request.
    pub received_count: usize,
    /// Branches successfully upserted.
    #[serde(default)]
    pub synced_branch_ids: Vec<RecordId>,
    /// Transactions successfully upserted.
    #[serde(default)]
    pub synced_transaction_ids: Vec<RecordId>,
}

impl PushResponse {
    /// Number of acknowledged records.
    pub fn acknowledged_count(&self) -> usize {
        self.synced_branch_ids.len() + self.synced_transaction_ids.len()
    }
}

/// Pull request parameters.
///
/// Travels as the `last_sync` query parameter. Absent means full resync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullQuery {
    /// Only records mutated strictly after this instant are returned.
    pub last_sync: Option<Timestamp>,
}

impl PullQuery {
    /// Query parameter name.
    pub const LAST_SYNC: &'static str = "last_sync";

    /// Creates a pull query with an optional cutoff.
    pub fn new(last_sync: Option<Timestamp>) -> Self {
        Self { last_sync }
    }

    /// Creates a pull query asking for everything.
    pub fn full() -> Self {
        Self { last_sync: None }
    }

    /// Encodes as query pairs.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.last_sync
            .map(|ts| vec![(Self::LAST_SYNC.to_string(), format_timestamp(&ts))])
            .unwrap_or_default()
    }

    /// Decodes from already percent-decoded query pairs.
    ///
    /// Unknown parameters are ignored; an empty `last_sync` means no cutoff.
    pub fn from_query_pairs(pairs: &[(String, String)]) -> ProtocolResult<Self> {
        let last_sync = pairs
            .iter()
            .find(|(key, _)| key == Self::LAST_SYNC)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.trim().is_empty())
            .map(parse_timestamp)
            .transpose()?;
        Ok(Self { last_sync })
    }
}

/// Pull response: records mutated after the cutoff, plus the next cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Branch records.
    #[serde(default)]
    pub branches: Vec<Branch>,
    /// Transaction records.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// Cloud time captured before the query; the caller persists it.
    pub sync_cutoff: Timestamp,
}

impl PullResponse {
    /// Creates a pull response.
    pub fn new(branches: Vec<Branch>, transactions: Vec<Transaction>, sync_cutoff: Timestamp) -> Self {
        Self {
            branches,
            transactions,
            sync_cutoff,
        }
    }

    /// Creates an empty response.
    pub fn empty(sync_cutoff: Timestamp) -> Self {
        Self::new(Vec::new(), Vec::new(), sync_cutoff)
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.branches.len() + self.transactions.len()
    }

    /// Returns true if no records were returned.
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.transactions.is_empty()
    }
}

/// Liveness payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"` when served.
    pub status: String,
    /// Server time.
    pub timestamp: Timestamp,
}

impl HealthResponse {
    /// Creates the constant healthy payload.
    pub fn healthy() -> Self {
        Self {
            status: "healthy".into(),
            timestamp: timestamp::now(),
        }
    }
}

/// Connectivity verdict reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    /// The last probe reached the cloud.
    Online,
    /// The last probe failed, or no probe has run yet.
    Offline,
}

impl From<bool> for ConnectivityStatus {
    fn from(online: bool) -> Self {
        if online {
            ConnectivityStatus::Online
        } else {
            ConnectivityStatus::Offline
        }
    }
}

/// Sync health as surfaced to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Online / offline.
    pub status: ConnectivityStatus,
    /// Total unreconciled records.
    pub unsynced_count: u64,
    /// Unreconciled branches.
    pub unsynced_branches: u64,
    /// Unreconciled transactions.
    pub unsynced_transactions: u64,
    /// Report time.
    pub timestamp: Timestamp,
}
