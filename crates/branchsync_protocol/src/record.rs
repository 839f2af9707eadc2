//! Synchronized record kinds.

use crate::error::{ProtocolError, ProtocolResult};
use crate::id::RecordId;
use crate::timestamp::{self, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two kinds of record exchanged between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Branch metadata.
    Branch,
    /// Cash-in / cash-out transaction.
    Transaction,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Branch => f.write_str("branch"),
            RecordKind::Transaction => f.write_str("transaction"),
        }
    }
}

/// Behaviour shared by every synchronized record.
///
/// Reconciliation state (`is_synced` / `synced_at`) is local to each node.
/// It travels on the wire for convenience but the receiver always
/// overwrites it.
pub trait SyncRecord: Clone + Send + Sync + 'static {
    /// The record kind.
    const KIND: RecordKind;

    /// Returns the record identity.
    fn id(&self) -> RecordId;

    /// Returns the latest of creation and update time.
    fn mutated_at(&self) -> Timestamp;

    /// Returns true if this node's copy has been exchanged with the counterparty.
    fn is_reconciled(&self) -> bool;

    /// Marks this copy as reconciled at `at`.
    fn mark_reconciled(&mut self, at: Timestamp);

    /// Clears reconciliation state (used when a local edit makes the record dirty).
    fn clear_reconciliation(&mut self);

    /// Checks required fields.
    fn validate(&self) -> ProtocolResult<()>;
}

fn default_true() -> bool {
    true
}

/// Branch metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Identity.
    pub id: RecordId,
    /// Short unique code, e.g. `"DAPUR"`.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Whether the branch is operating.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Local reconciliation flag.
    #[serde(default)]
    pub is_synced: bool,
    /// When the local copy was reconciled.
    #[serde(default)]
    pub synced_at: Option<Timestamp>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last in-place edit.
    pub updated_at: Timestamp,
}

impl Branch {
    /// Creates a new, unreconciled branch with a fresh identity.
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        let now = timestamp::now();
        Self {
            id: RecordId::new(),
            code: code.into(),
            name: name.into(),
            description: String::new(),
            is_active: true,
            is_synced: false,
            synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Records a local edit: bumps `updated_at` and makes the record dirty.
    pub fn touch(&mut self) {
        self.updated_at = timestamp::now();
        self.clear_reconciliation();
    }
}

impl SyncRecord for Branch {
    const KIND: RecordKind = RecordKind::Branch;

    fn id(&self) -> RecordId {
        self.id
    }

    fn mutated_at(&self) -> Timestamp {
        self.created_at.max(self.updated_at)
    }

    fn is_reconciled(&self) -> bool {
        self.is_synced
    }

    fn mark_reconciled(&mut self, at: Timestamp) {
        self.is_synced = true;
        self.synced_at = Some(at);
    }

    fn clear_reconciliation(&mut self) {
        self.is_synced = false;
        self.synced_at = None;
    }

    fn validate(&self) -> ProtocolResult<()> {
        if self.id.is_nil() {
            return Err(ProtocolError::invalid("id", "nil identity"));
        }
        if self.code.trim().is_empty() {
            return Err(ProtocolError::MissingField("code"));
        }
        if self.name.trim().is_empty() {
            return Err(ProtocolError::MissingField("name"));
        }
        Ok(())
    }
}

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Cash in.
    #[serde(rename = "IN")]
    In,
    /// Cash out.
    #[serde(rename = "OUT")]
    Out,
}

impl TransactionType {
    /// Returns the wire/storage code.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::In => "IN",
            TransactionType::Out => "OUT",
        }
    }

    /// Parses the wire/storage code.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "IN" => Some(TransactionType::In),
            "OUT" => Some(TransactionType::Out),
            _ => None,
        }
    }
}

/// A cash-in or cash-out entry owned by a branch.
///
/// Transactions are append-only: they have a creation time but no update
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identity.
    pub id: RecordId,
    /// Owning branch.
    pub branch_id: RecordId,
    /// Direction.
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Category label.
    pub category: String,
    /// Positive amount.
    pub amount: f64,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Local reconciliation flag.
    #[serde(default)]
    pub is_synced: bool,
    /// When the local copy was reconciled.
    #[serde(default)]
    pub synced_at: Option<Timestamp>,
    /// Creation time.
    pub created_at: Timestamp,
}

impl Transaction {
    /// Creates a new, unreconciled transaction with a fresh identity.
    pub fn new(
        branch_id: RecordId,
        tx_type: TransactionType,
        category: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            id: RecordId::new(),
            branch_id,
            tx_type,
            category: category.into(),
            amount,
            description: String::new(),
            is_synced: false,
            synced_at: None,
            created_at: timestamp::now(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns the signed amount: positive for cash in, negative for cash out.
    pub fn signed_amount(&self) -> f64 {
        match self.tx_type {
            TransactionType::In => self.amount,
            TransactionType::Out => -self.amount,
        }
    }
}

impl SyncRecord for Transaction {
    const KIND: RecordKind = RecordKind::Transaction;

    fn id(&self) -> RecordId {
        self.id
    }

    fn mutated_at(&self) -> Timestamp {
        self.created_at
    }

    fn is_reconciled(&self) -> bool {
        self.is_synced
    }

    fn mark_reconciled(&mut self, at: Timestamp) {
        self.is_synced = true;
        self.synced_at = Some(at);
    }

    fn clear_reconciliation(&mut self) {
        self.is_synced = false;
        self.synced_at = None;
    }

    fn validate(&self) -> ProtocolResult<()> {
        if self.id.is_nil() {
            return Err(ProtocolError::invalid("id", "nil identity"));
        }
        if self.branch_id.is_nil() {
            return Err(ProtocolError::MissingField("branch_id"));
        }
        if self.category.trim().is_empty() {
            return Err(ProtocolError::MissingField("category"));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ProtocolError::invalid(
                "amount",
                format!("must be a positive number, got {}", self.amount),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn branch_mutated_at_uses_latest_timestamp() {
        let mut branch = Branch::new("DAPUR", "Dapur Pusat");
        assert_eq!(branch.mutated_at(), branch.created_at);

        branch.updated_at = branch.created_at + Duration::seconds(5);
        assert_eq!(branch.mutated_at(), branch.updated_at);
    }

    #[test]
    fn touch_makes_branch_dirty() {
        let mut branch = Branch::new("DAPUR", "Dapur Pusat");
        branch.mark_reconciled(timestamp::now());
        assert!(branch.is_reconciled());

        branch.touch();
        assert!(!branch.is_reconciled());
        assert!(branch.synced_at.is_none());
    }

    #[test]
    fn branch_validation() {
        assert!(Branch::new("DAPUR", "Dapur").validate().is_ok());
        assert!(matches!(
            Branch::new("  ", "Dapur").validate(),
            Err(ProtocolError::MissingField("code"))
        ));
        assert!(matches!(
            Branch::new("DAPUR", "").validate(),
            Err(ProtocolError::MissingField("name"))
        ));
    }

    #[test]
    fn transaction_validation() {
        let branch = RecordId::new();
        assert!(Transaction::new(branch, TransactionType::In, "sales", 500.0)
            .validate()
            .is_ok());
        assert!(Transaction::new(branch, TransactionType::In, "sales", 0.0)
            .validate()
            .is_err());
        assert!(Transaction::new(branch, TransactionType::Out, "rent", f64::NAN)
            .validate()
            .is_err());
        assert!(Transaction::new(branch, TransactionType::Out, "", 10.0)
            .validate()
            .is_err());
        assert!(
            Transaction::new(RecordId::from_bytes([0; 16]), TransactionType::In, "x", 1.0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn transaction_wire_shape() {
        let tx = Transaction::new(RecordId::new(), TransactionType::In, "sales", 500.0);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "IN");
        assert_eq!(json["amount"], 500.0);
        assert_eq!(json["is_synced"], false);
    }

    #[test]
    fn reconciliation_fields_are_optional_on_the_wire() {
        let json = serde_json::json!({
            "id": "6f1c1a52-3d5e-4b7a-9a43-0c1f6f0b2e11",
            "code": "DAPUR",
            "name": "Dapur Pusat",
            "created_at": "2024-05-01T08:30:00Z",
            "updated_at": "2024-05-01T08:30:00Z"
        });
        let branch: Branch = serde_json::from_value(json).unwrap();
        assert!(branch.is_active);
        assert!(!branch.is_synced);
        assert!(branch.description.is_empty());
    }

    #[test]
    fn signed_amount() {
        let branch = RecordId::new();
        let cash_in = Transaction::new(branch, TransactionType::In, "sales", 500.0);
        let cash_out = Transaction::new(branch, TransactionType::Out, "rent", 200.0);
        assert_eq!(cash_in.signed_amount() + cash_out.signed_amount(), 300.0);
    }

    #[test]
    fn transaction_type_codes() {
        assert_eq!(TransactionType::parse("IN"), Some(TransactionType::In));
        assert_eq!(TransactionType::parse("OUT"), Some(TransactionType::Out));
        assert_eq!(TransactionType::parse("in"), None);
        assert_eq!(TransactionType::Out.as_str(), "OUT");
    }
}
