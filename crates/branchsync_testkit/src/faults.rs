//! Fault injection for record stores.
//!
//! [`FlakyStore`] wraps any [`RecordStore`] and fails chosen writes, which
//! is how the partial-failure and retry paths of a sync cycle are exercised.
//! It also counts writes, so tests can assert that an offline cycle left the
//! store untouched.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use branchsync_testkit::faults::FlakyStore;
//!
//! let store = FlakyStore::new(MemoryStore::new());
//! store.fail_upserts_for(bad.id);
//! // ... a push carrying `bad` acknowledges everything else
//! store.heal();
//! ```

use branchsync_protocol::{Branch, RecordId, Timestamp, Transaction};
use branchsync_store::{RecordStore, StoreError, StoreResult, UnreconciledCounts};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Write counters kept by a [`FlakyStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    /// Insert and upsert calls, successful or not.
    pub upserts: u64,
    /// Mark-reconciled calls.
    pub marks: u64,
    /// Cutoff writes.
    pub cutoffs: u64,
    /// Writes that were failed on purpose.
    pub injected_failures: u64,
}

impl WriteCounts {
    /// Returns the number of write calls of any kind.
    pub fn total(&self) -> u64 {
        self.upserts + self.marks + self.cutoffs
    }
}

/// Callback run when a record is upserted; see [`FlakyStore::on_upsert`].
pub type UpsertHook = Box<dyn Fn(RecordId) + Send + Sync>;

/// A store wrapper that fails selected writes.
pub struct FlakyStore<S> {
    inner: S,
    failing_ids: RwLock<HashSet<RecordId>>,
    upsert_hook: RwLock<Option<UpsertHook>>,
    fail_all: AtomicBool,
    upserts: AtomicU64,
    marks: AtomicU64,
    cutoffs: AtomicU64,
    injected: AtomicU64,
}

impl<S: RecordStore> FlakyStore<S> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_ids: RwLock::new(HashSet::new()),
            upsert_hook: RwLock::new(None),
            fail_all: AtomicBool::new(false),
            upserts: AtomicU64::new(0),
            marks: AtomicU64::new(0),
            cutoffs: AtomicU64::new(0),
            injected: AtomicU64::new(0),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes inserts and upserts of `id` fail.
    pub fn fail_upserts_for(&self, id: RecordId) {
        self.failing_ids.write().insert(id);
    }

    /// Makes every write fail, as a full disk would.
    pub fn fail_all_writes(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Runs `hook` with the record id before every upsert that is let
    /// through. Lets a test act while a request is being served, such as
    /// writing to an edge store mid-push.
    pub fn on_upsert(&self, hook: impl Fn(RecordId) + Send + Sync + 'static) {
        *self.upsert_hook.write() = Some(Box::new(hook));
    }

    /// Disarms every fault and removes the upsert hook.
    pub fn heal(&self) {
        self.failing_ids.write().clear();
        *self.upsert_hook.write() = None;
        self.fail_all.store(false, Ordering::SeqCst);
    }

    /// Returns the write counters.
    pub fn write_counts(&self) -> WriteCounts {
        WriteCounts {
            upserts: self.upserts.load(Ordering::SeqCst),
            marks: self.marks.load(Ordering::SeqCst),
            cutoffs: self.cutoffs.load(Ordering::SeqCst),
            injected_failures: self.injected.load(Ordering::SeqCst),
        }
    }

    fn injected(&self, what: &str) -> StoreError {
        self.injected.fetch_add(1, Ordering::SeqCst);
        StoreError::Unavailable(format!("injected fault: {what}"))
    }

    fn check_upsert(&self, id: RecordId) -> StoreResult<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) || self.failing_ids.read().contains(&id) {
            return Err(self.injected("upsert"));
        }
        if let Some(hook) = self.upsert_hook.read().as_ref() {
            hook(id);
        }
        Ok(())
    }

    fn check_write(&self, counter: &AtomicU64, what: &str) -> StoreResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(self.injected(what));
        }
        Ok(())
    }
}

impl<S: RecordStore> RecordStore for FlakyStore<S> {
    fn insert_branch(&self, branch: &Branch) -> StoreResult<()> {
        self.check_upsert(branch.id)?;
        self.inner.insert_branch(branch)
    }

    fn upsert_branch(&self, branch: &Branch) -> StoreResult<()> {
        self.check_upsert(branch.id)?;
        self.inner.upsert_branch(branch)
    }

    fn get_branch(&self, id: RecordId) -> StoreResult<Option<Branch>> {
        self.inner.get_branch(id)
    }

    fn branches_after(&self, cutoff: Option<Timestamp>) -> StoreResult<Vec<Branch>> {
        self.inner.branches_after(cutoff)
    }

    fn unreconciled_branches(&self, limit: usize) -> StoreResult<Vec<Branch>> {
        self.inner.unreconciled_branches(limit)
    }

    fn mark_branches_reconciled(&self, sent: &[Branch], at: Timestamp) -> StoreResult<usize> {
        self.check_write(&self.marks, "mark")?;
        self.inner.mark_branches_reconciled(sent, at)
    }

    fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        self.check_upsert(transaction.id)?;
        self.inner.insert_transaction(transaction)
    }

    fn upsert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        self.check_upsert(transaction.id)?;
        self.inner.upsert_transaction(transaction)
    }

    fn get_transaction(&self, id: RecordId) -> StoreResult<Option<Transaction>> {
        self.inner.get_transaction(id)
    }

    fn transactions_after(&self, cutoff: Option<Timestamp>) -> StoreResult<Vec<Transaction>> {
        self.inner.transactions_after(cutoff)
    }

    fn unreconciled_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
        self.inner.unreconciled_transactions(limit)
    }

    fn mark_transactions_reconciled(
        &self,
        sent: &[Transaction],
        at: Timestamp,
    ) -> StoreResult<usize> {
        self.check_write(&self.marks, "mark")?;
        self.inner.mark_transactions_reconciled(sent, at)
    }

    fn unreconciled_counts(&self) -> StoreResult<UnreconciledCounts> {
        self.inner.unreconciled_counts()
    }

    fn sync_cutoff(&self) -> StoreResult<Option<Timestamp>> {
        self.inner.sync_cutoff()
    }

    fn set_sync_cutoff(&self, cutoff: Timestamp) -> StoreResult<()> {
        self.check_write(&self.cutoffs, "cutoff")?;
        self.inner.set_sync_cutoff(cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{branch, sale};
    use branchsync_protocol::now;
    use branchsync_store::MemoryStore;

    #[test]
    fn test_selected_ids_fail() {
        let store = FlakyStore::new(MemoryStore::new());
        let b = branch("DAPUR");
        let good = sale(b.id, 1.0);
        let bad = sale(b.id, 2.0);
        store.fail_upserts_for(bad.id);

        assert!(store.upsert_transaction(&good).is_ok());
        let err = store.upsert_transaction(&bad).unwrap_err();
        assert!(!err.is_permanent());
        assert!(store.get_transaction(bad.id).unwrap().is_none());

        store.heal();
        assert!(store.upsert_transaction(&bad).is_ok());
        assert_eq!(store.inner().transaction_count(), 2);
    }

    #[test]
    fn test_fail_all_and_counts() {
        let store = FlakyStore::new(MemoryStore::new());
        store.fail_all_writes(true);
        assert!(store.upsert_branch(&branch("A")).is_err());
        assert!(store.set_sync_cutoff(now()).is_err());
        assert!(store.mark_transactions_reconciled(&[], now()).is_err());

        let counts = store.write_counts();
        assert_eq!(counts.upserts, 1);
        assert_eq!(counts.cutoffs, 1);
        assert_eq!(counts.marks, 1);
        assert_eq!(counts.injected_failures, 3);
        assert_eq!(counts.total(), 3);

        // Reads are never affected.
        assert_eq!(store.sync_cutoff().unwrap(), None);
    }

    #[test]
    fn test_upsert_hook_sees_passing_writes() {
        use std::sync::Arc;

        let store = FlakyStore::new(MemoryStore::new());
        let seen = Arc::new(RwLock::new(Vec::new()));
        let log = Arc::clone(&seen);
        store.on_upsert(move |id| log.write().push(id));

        let good = sale(branch("DAPUR").id, 1.0);
        let bad = sale(good.branch_id, 2.0);
        store.fail_upserts_for(bad.id);
        store.upsert_transaction(&good).unwrap();
        assert!(store.upsert_transaction(&bad).is_err());
        assert_eq!(*seen.read(), vec![good.id]);

        store.heal();
        store.upsert_transaction(&bad).unwrap();
        assert_eq!(seen.read().len(), 1);
    }
}
