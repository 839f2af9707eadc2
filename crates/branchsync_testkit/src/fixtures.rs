//! Test fixtures and store helpers.
//!
//! Provides scratch stores and ready-made records for common test
//! scenarios.

use branchsync_protocol::{now, Branch, RecordId, Timestamp, Transaction, TransactionType};
use branchsync_store::SqliteStore;
use chrono::Duration;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A SQLite store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<SqliteStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory SQLite store.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(SqliteStore::open_in_memory().expect("Failed to open in-memory store")),
            _temp_dir: None,
        }
    }

    /// Creates a new file-backed SQLite store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("edge.db");
        let store = SqliteStore::open(&path).expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-backed, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("edge.db"))
    }

    /// Opens a second handle on the same file, as a restarted process would.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores.
    pub fn reopen(&self) -> SqliteStore {
        let path = self.path().expect("Cannot reopen an in-memory store");
        SqliteStore::open(path).expect("Failed to reopen store")
    }
}

impl std::ops::Deref for TestStore {
    type Target = SqliteStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// A branch with the given code and a derived name.
pub fn branch(code: &str) -> Branch {
    Branch::new(code, format!("Branch {code}"))
}

/// A cash-in sale for `branch_id`.
pub fn sale(branch_id: RecordId, amount: f64) -> Transaction {
    Transaction::new(branch_id, TransactionType::In, "sales", amount)
}

/// A cash-out expense for `branch_id`.
pub fn expense(branch_id: RecordId, amount: f64) -> Transaction {
    Transaction::new(branch_id, TransactionType::Out, "supplies", amount)
}

/// Returns `tx` with its creation time moved `age` into the past.
pub fn backdated(mut tx: Transaction, age: Duration) -> Transaction {
    tx.created_at = now() - age;
    tx
}

/// Returns `branch` created at `at` and never edited since.
pub fn branch_created_at(mut branch: Branch, at: Timestamp) -> Branch {
    branch.created_at = at;
    branch.updated_at = at;
    branch
}

/// A small ledger: one branch with a sale and an expense.
pub fn sample_ledger(code: &str) -> (Branch, Vec<Transaction>) {
    let branch = branch(code);
    let transactions = vec![sale(branch.id, 250_000.0), expense(branch.id, 40_000.0)];
    (branch, transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchsync_protocol::SyncRecord;
    use branchsync_store::RecordStore;

    #[test]
    fn test_memory_store() {
        let store = TestStore::memory();
        assert!(store.path().is_none());
        store.insert_branch(&branch("DAPUR")).unwrap();
        assert_eq!(store.unreconciled_counts().unwrap().branches, 1);
    }

    #[test]
    fn test_file_store_reopen() {
        let store = TestStore::file();
        let (b, txs) = sample_ledger("DAPUR");
        store.insert_branch(&b).unwrap();
        for tx in &txs {
            store.insert_transaction(tx).unwrap();
        }

        let reopened = store.reopen();
        assert_eq!(reopened.unreconciled_counts().unwrap().transactions, 2);
    }

    #[test]
    fn test_record_builders() {
        let (b, txs) = sample_ledger("GUDANG");
        assert_eq!(b.name, "Branch GUDANG");
        assert!(txs.iter().all(|t| t.branch_id == b.id && t.validate().is_ok()));

        let old = backdated(sale(b.id, 1.0), Duration::hours(3));
        assert!(old.mutated_at() < now() - Duration::hours(2));
    }
}
