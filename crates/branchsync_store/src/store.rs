//! Record store trait definition.

use crate::error::{StoreError, StoreResult};
use branchsync_protocol::{Branch, RecordId, SyncRecord, Timestamp, Transaction};

/// Durable keyed storage for Branch and Transaction records.
///
/// The same interface backs the edge node and the cloud node.
///
/// # Invariants
///
/// - Every write is atomic per record
/// - `upsert_*` is idempotent: writing the same record twice leaves the
///   store as if it were written once
/// - `upsert_*` overwrites the whole record, reconciliation fields included
/// - `*_after(cutoff)` returns records whose mutation time is strictly after
///   `cutoff`, oldest first
/// - `unreconciled_*` returns records with `is_synced == false`, oldest
///   first
/// - `mark_*_reconciled` only flips records whose stored payload still
///   equals what was sent
/// - Implementations must be `Send + Sync`; CRUD traffic and the sync task
///   share one store
pub trait RecordStore: Send + Sync {
    /// Inserts a new branch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the identity exists.
    fn insert_branch(&self, branch: &Branch) -> StoreResult<()>;

    /// Inserts or overwrites a branch by identity.
    fn upsert_branch(&self, branch: &Branch) -> StoreResult<()>;

    /// Looks up a branch.
    fn get_branch(&self, id: RecordId) -> StoreResult<Option<Branch>>;

    /// Branches mutated strictly after `cutoff`; all branches when `None`.
    fn branches_after(&self, cutoff: Option<Timestamp>) -> StoreResult<Vec<Branch>>;

    /// Up to `limit` unreconciled branches, oldest first.
    fn unreconciled_branches(&self, limit: usize) -> StoreResult<Vec<Branch>>;

    /// Marks the given branches reconciled at `at`, as sent.
    ///
    /// A branch whose stored copy no longer matches the sent one was edited
    /// after it was read and stays unreconciled. Unknown ids are ignored.
    ///
    /// Returns the number of records updated.
    fn mark_branches_reconciled(&self, sent: &[Branch], at: Timestamp) -> StoreResult<usize>;

    /// Inserts a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the identity exists.
    fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()>;

    /// Inserts or overwrites a transaction by identity.
    fn upsert_transaction(&self, transaction: &Transaction) -> StoreResult<()>;

    /// Looks up a transaction.
    fn get_transaction(&self, id: RecordId) -> StoreResult<Option<Transaction>>;

    /// Transactions created strictly after `cutoff`; all when `None`.
    fn transactions_after(&self, cutoff: Option<Timestamp>) -> StoreResult<Vec<Transaction>>;

    /// Up to `limit` unreconciled transactions, oldest first.
    fn unreconciled_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>>;

    /// Marks the given transactions reconciled at `at`, as sent. Same rules as
    /// [`mark_branches_reconciled`](Self::mark_branches_reconciled).
    fn mark_transactions_reconciled(
        &self,
        sent: &[Transaction],
        at: Timestamp,
    ) -> StoreResult<usize>;

    /// Counts unreconciled records per kind.
    fn unreconciled_counts(&self) -> StoreResult<UnreconciledCounts>;

    /// The last pull cutoff persisted by this node, if any.
    fn sync_cutoff(&self) -> StoreResult<Option<Timestamp>>;

    /// Persists the pull cutoff.
    fn set_sync_cutoff(&self, cutoff: Timestamp) -> StoreResult<()>;
}

/// Unreconciled record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreconciledCounts {
    /// Unreconciled branches.
    pub branches: u64,
    /// Unreconciled transactions.
    pub transactions: u64,
}

impl UnreconciledCounts {
    /// Sum across kinds.
    pub fn total(&self) -> u64 {
        self.branches + self.transactions
    }
}

/// Rejects malformed records before they reach storage.
pub(crate) fn validate<R: SyncRecord>(record: &R) -> StoreResult<()> {
    record.validate().map_err(|source| StoreError::InvalidRecord {
        kind: R::KIND,
        id: record.id(),
        source,
    })
}

/// True when `stored` carries the same payload as `sent`, reconciliation
/// fields aside.
pub(crate) fn unchanged_since<R: SyncRecord + PartialEq>(stored: &R, sent: &R) -> bool {
    let mut stored = stored.clone();
    let mut sent = sent.clone();
    stored.clear_reconciliation();
    sent.clear_reconciliation();
    stored == sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchsync_protocol::TransactionType;

    #[test]
    fn counts_total() {
        let counts = UnreconciledCounts {
            branches: 2,
            transactions: 5,
        };
        assert_eq!(counts.total(), 7);
    }

    #[test]
    fn reconciliation_fields_do_not_count_as_changes() {
        let mut tx = Transaction::new(RecordId::new(), TransactionType::In, "sales", 10.0);
        let sent = tx.clone();
        tx.mark_reconciled(branchsync_protocol::now());
        assert!(unchanged_since(&tx, &sent));

        tx.amount = 11.0;
        assert!(!unchanged_since(&tx, &sent));
    }

    #[test]
    fn validate_maps_protocol_error() {
        let tx = Transaction::new(RecordId::new(), TransactionType::In, "sales", -1.0);
        let err = validate(&tx).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { id, .. } if id == tx.id));
    }
}
