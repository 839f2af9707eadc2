//! In-memory record store.

use crate::error::{StoreError, StoreResult};
use crate::store::{unchanged_since, validate, RecordStore, UnreconciledCounts};
use branchsync_protocol::{
    Branch, RecordId, RecordKind, SyncRecord, Timestamp, Transaction,
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory record store.
///
/// Suitable for tests and for nodes that do not need durability. All
/// operations take a single `RwLock`, so each call is atomic.
///
/// # Example
///
/// ```rust
/// use branchsync_protocol::{Branch, Transaction, TransactionType};
/// use branchsync_store::{MemoryStore, RecordStore};
///
/// let store = MemoryStore::new();
/// let branch = Branch::new("DAPUR", "Dapur Pusat");
/// let tx = Transaction::new(branch.id, TransactionType::In, "sales", 500.0);
/// store.insert_branch(&branch).unwrap();
/// store.insert_transaction(&tx).unwrap();
/// assert_eq!(store.unreconciled_transactions(10).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    branches: HashMap<RecordId, Branch>,
    transactions: HashMap<RecordId, Transaction>,
    cutoff: Option<Timestamp>,
}

impl Inner {
    fn check_code_unique(&self, branch: &Branch) -> StoreResult<()> {
        let taken = self
            .branches
            .values()
            .any(|other| other.id != branch.id && other.code == branch.code);
        if taken {
            return Err(StoreError::Constraint(format!(
                "branch code {:?} already used by another branch",
                branch.code
            )));
        }
        Ok(())
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored branches.
    pub fn branch_count(&self) -> usize {
        self.inner.read().branches.len()
    }

    /// Returns the number of stored transactions.
    pub fn transaction_count(&self) -> usize {
        self.inner.read().transactions.len()
    }
}

fn sorted_by_mutation<R: SyncRecord>(mut records: Vec<R>) -> Vec<R> {
    records.sort_by(|a, b| {
        a.mutated_at()
            .cmp(&b.mutated_at())
            .then_with(|| a.id().cmp(&b.id()))
    });
    records
}

fn after<'a, R: SyncRecord>(
    records: impl Iterator<Item = &'a R>,
    cutoff: Option<Timestamp>,
) -> Vec<R> {
    let selected = records
        .filter(|r| cutoff.map_or(true, |c| r.mutated_at() > c))
        .cloned()
        .collect();
    sorted_by_mutation(selected)
}

fn mark<R: SyncRecord + PartialEq>(
    map: &mut HashMap<RecordId, R>,
    sent: &[R],
    at: Timestamp,
) -> usize {
    let mut updated = 0;
    for record in sent {
        match map.get_mut(&record.id()) {
            Some(stored) if unchanged_since(stored, record) => {
                stored.mark_reconciled(at);
                updated += 1;
            }
            _ => {}
        }
    }
    updated
}

impl RecordStore for MemoryStore {
    fn insert_branch(&self, branch: &Branch) -> StoreResult<()> {
        validate(branch)?;
        let mut inner = self.inner.write();
        if inner.branches.contains_key(&branch.id) {
            return Err(StoreError::Duplicate {
                kind: RecordKind::Branch,
                id: branch.id,
            });
        }
        inner.check_code_unique(branch)?;
        inner.branches.insert(branch.id, branch.clone());
        Ok(())
    }

    fn upsert_branch(&self, branch: &Branch) -> StoreResult<()> {
        validate(branch)?;
        let mut inner = self.inner.write();
        inner.check_code_unique(branch)?;
        inner.branches.insert(branch.id, branch.clone());
        Ok(())
    }

    fn get_branch(&self, id: RecordId) -> StoreResult<Option<Branch>> {
        Ok(self.inner.read().branches.get(&id).cloned())
    }

    fn branches_after(&self, cutoff: Option<Timestamp>) -> StoreResult<Vec<Branch>> {
        Ok(after(self.inner.read().branches.values(), cutoff))
    }

    fn unreconciled_branches(&self, limit: usize) -> StoreResult<Vec<Branch>> {
        let inner = self.inner.read();
        let mut pending: Vec<Branch> = inner
            .branches
            .values()
            .filter(|b| !b.is_synced)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    fn mark_branches_reconciled(&self, sent: &[Branch], at: Timestamp) -> StoreResult<usize> {
        Ok(mark(&mut self.inner.write().branches, sent, at))
    }

    fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        validate(transaction)?;
        let mut inner = self.inner.write();
        if inner.transactions.contains_key(&transaction.id) {
            return Err(StoreError::Duplicate {
                kind: RecordKind::Transaction,
                id: transaction.id,
            });
        }
        inner.transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    fn upsert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        validate(transaction)?;
        self.inner
            .write()
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(())
    }

    fn get_transaction(&self, id: RecordId) -> StoreResult<Option<Transaction>> {
        Ok(self.inner.read().transactions.get(&id).cloned())
    }

    fn transactions_after(&self, cutoff: Option<Timestamp>) -> StoreResult<Vec<Transaction>> {
        Ok(after(self.inner.read().transactions.values(), cutoff))
    }

    fn unreconciled_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
        let inner = self.inner.read();
        let mut pending: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|t| !t.is_synced)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    fn mark_transactions_reconciled(
        &self,
        sent: &[Transaction],
        at: Timestamp,
    ) -> StoreResult<usize> {
        Ok(mark(&mut self.inner.write().transactions, sent, at))
    }

    fn unreconciled_counts(&self) -> StoreResult<UnreconciledCounts> {
        let inner = self.inner.read();
        Ok(UnreconciledCounts {
            branches: inner.branches.values().filter(|b| !b.is_synced).count() as u64,
            transactions: inner.transactions.values().filter(|t| !t.is_synced).count() as u64,
        })
    }

    fn sync_cutoff(&self) -> StoreResult<Option<Timestamp>> {
        Ok(self.inner.read().cutoff)
    }

    fn set_sync_cutoff(&self, cutoff: Timestamp) -> StoreResult<()> {
        self.inner.write().cutoff = Some(cutoff);
        Ok(())
    }
}
