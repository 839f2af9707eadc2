//! Embedded SQLite record store.
//!
//! Identities are stored as hyphenated UUID text and timestamps in the
//! fixed-width RFC 3339 form, so `ORDER BY` on either column matches the
//! ordering used by [`MemoryStore`](crate::MemoryStore).

use crate::error::{StoreError, StoreResult};
use crate::store::{unchanged_since, validate, RecordStore, UnreconciledCounts};
use branchsync_protocol::{
    format_timestamp, parse_timestamp, Branch, ProtocolError, RecordId, RecordKind, SyncRecord,
    Timestamp, Transaction, TransactionType,
};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS branches (
    id          TEXT PRIMARY KEY NOT NULL,
    code        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    is_active   INTEGER NOT NULL DEFAULT 1,
    is_synced   INTEGER NOT NULL DEFAULT 0,
    synced_at   TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_branches_is_synced ON branches (is_synced);

CREATE TABLE IF NOT EXISTS transactions (
    id          TEXT PRIMARY KEY NOT NULL,
    branch_id   TEXT NOT NULL,
    type        TEXT NOT NULL CHECK (type IN ('IN', 'OUT')),
    category    TEXT NOT NULL,
    amount      REAL NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    is_synced   INTEGER NOT NULL DEFAULT 0,
    synced_at   TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_is_synced ON transactions (is_synced);
CREATE INDEX IF NOT EXISTS idx_transactions_created_at ON transactions (created_at);

CREATE TABLE IF NOT EXISTS sync_meta (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
";

const BRANCH_COLUMNS: &str =
    "id, code, name, description, is_active, is_synced, synced_at, created_at, updated_at";

const TRANSACTION_COLUMNS: &str =
    "id, branch_id, type, category, amount, description, is_synced, synced_at, created_at";

const CUTOFF_KEY: &str = "pull_cutoff";

/// A record store backed by a single SQLite database file.
///
/// The connection is guarded by a mutex; every trait call runs as one
/// statement or one SQLite transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a database file and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening sqlite store");
        Self::init(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn ts_text(ts: &Timestamp) -> String {
    format_timestamp(ts)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<RecordId> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Timestamp> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text).map_err(|e| conversion_error(idx, e))
}

fn opt_ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Timestamp>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_timestamp(&t).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        id: id_at(row, 0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        is_active: row.get(4)?,
        is_synced: row.get(5)?,
        synced_at: opt_ts_at(row, 6)?,
        created_at: ts_at(row, 7)?,
        updated_at: ts_at(row, 8)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let code: String = row.get(2)?;
    let tx_type = TransactionType::parse(&code).ok_or_else(|| {
        conversion_error(2, ProtocolError::invalid("type", format!("unknown code {code:?}")))
    })?;
    Ok(Transaction {
        id: id_at(row, 0)?,
        branch_id: id_at(row, 1)?,
        tx_type,
        category: row.get(3)?,
        amount: row.get(4)?,
        description: row.get(5)?,
        is_synced: row.get(6)?,
        synced_at: opt_ts_at(row, 7)?,
        created_at: ts_at(row, 8)?,
    })
}

/// Maps uniqueness failures to [`StoreError::Constraint`].
fn map_write_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, ref msg) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Constraint(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        other => StoreError::Sqlite(other),
    }
}

/// Marks `sent` records reconciled where the stored row still matches.
///
/// The compare and the update run in one SQLite transaction under the
/// connection lock, so a concurrent CRUD write lands either before the
/// compare or after the mark.
fn mark_reconciled<R, F>(
    conn: &mut Connection,
    table: &str,
    columns: &str,
    from_row: F,
    sent: &[R],
    at: Timestamp,
) -> StoreResult<usize>
where
    R: SyncRecord + PartialEq,
    F: Fn(&Row<'_>) -> rusqlite::Result<R>,
{
    if sent.is_empty() {
        return Ok(0);
    }
    let at = ts_text(&at);
    let tx = conn.transaction()?;
    let mut updated = 0;
    {
        let mut select = tx.prepare(&format!("SELECT {columns} FROM {table} WHERE id = ?1"))?;
        let mut update = tx.prepare(&format!(
            "UPDATE {table} SET is_synced = 1, synced_at = ?1 WHERE id = ?2"
        ))?;
        for record in sent {
            let id = record.id().to_string();
            let stored = select.query_row(params![id], &from_row).optional()?;
            if stored.map_or(false, |stored| unchanged_since(&stored, record)) {
                updated += update.execute(params![at, id])?;
            }
        }
    }
    tx.commit()?;
    Ok(updated)
}

fn count_unreconciled(conn: &Connection, table: &str) -> StoreResult<u64> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE is_synced = 0");
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or_default())
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl SqliteStore {
    fn exists(conn: &Connection, table: &str, id: RecordId) -> StoreResult<bool> {
        let sql = format!("SELECT 1 FROM {table} WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id.to_string()], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn write_branch(conn: &Connection, branch: &Branch, upsert: bool) -> StoreResult<()> {
        let conflict = if upsert {
            "ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                name = excluded.name,
                description = excluded.description,
                is_active = excluded.is_active,
                is_synced = excluded.is_synced,
                synced_at = excluded.synced_at,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at"
        } else {
            ""
        };
        let sql = format!(
            "INSERT INTO branches ({BRANCH_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) {conflict}"
        );
        conn.execute(
            &sql,
            params![
                branch.id.to_string(),
                branch.code,
                branch.name,
                branch.description,
                branch.is_active,
                branch.is_synced,
                branch.synced_at.as_ref().map(ts_text),
                ts_text(&branch.created_at),
                ts_text(&branch.updated_at),
            ],
        )
        .map_err(map_write_error)?;
        Ok(())
    }

    fn write_transaction(conn: &Connection, tx: &Transaction, upsert: bool) -> StoreResult<()> {
        let conflict = if upsert {
            "ON CONFLICT(id) DO UPDATE SET
                branch_id = excluded.branch_id,
                type = excluded.type,
                category = excluded.category,
                amount = excluded.amount,
                description = excluded.description,
                is_synced = excluded.is_synced,
                synced_at = excluded.synced_at,
                created_at = excluded.created_at"
        } else {
            ""
        };
        let sql = format!(
            "INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) {conflict}"
        );
        conn.execute(
            &sql,
            params![
                tx.id.to_string(),
                tx.branch_id.to_string(),
                tx.tx_type.as_str(),
                tx.category,
                tx.amount,
                tx.description,
                tx.is_synced,
                tx.synced_at.as_ref().map(ts_text),
                ts_text(&tx.created_at),
            ],
        )
        .map_err(map_write_error)?;
        Ok(())
    }
}

impl RecordStore for SqliteStore {
    fn insert_branch(&self, branch: &Branch) -> StoreResult<()> {
        validate(branch)?;
        let conn = self.conn.lock();
        if Self::exists(&conn, "branches", branch.id)? {
            return Err(StoreError::Duplicate {
                kind: RecordKind::Branch,
                id: branch.id,
            });
        }
        Self::write_branch(&conn, branch, false)
    }

    fn upsert_branch(&self, branch: &Branch) -> StoreResult<()> {
        validate(branch)?;
        Self::write_branch(&self.conn.lock(), branch, true)
    }

    fn get_branch(&self, id: RecordId) -> StoreResult<Option<Branch>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id.to_string()], branch_from_row)
            .optional()?)
    }

    fn branches_after(&self, cutoff: Option<Timestamp>) -> StoreResult<Vec<Branch>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {BRANCH_COLUMNS} FROM branches
             WHERE ?1 IS NULL OR max(created_at, updated_at) > ?1
             ORDER BY max(created_at, updated_at), id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![cutoff.as_ref().map(ts_text)], branch_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn unreconciled_branches(&self, limit: usize) -> StoreResult<Vec<Branch>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {BRANCH_COLUMNS} FROM branches
             WHERE is_synced = 0 ORDER BY created_at, id LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit_param(limit)], branch_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn mark_branches_reconciled(&self, sent: &[Branch], at: Timestamp) -> StoreResult<usize> {
        mark_reconciled(
            &mut self.conn.lock(),
            "branches",
            BRANCH_COLUMNS,
            branch_from_row,
            sent,
            at,
        )
    }

    fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        validate(transaction)?;
        let conn = self.conn.lock();
        if Self::exists(&conn, "transactions", transaction.id)? {
            return Err(StoreError::Duplicate {
                kind: RecordKind::Transaction,
                id: transaction.id,
            });
        }
        Self::write_transaction(&conn, transaction, false)
    }

    fn upsert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        validate(transaction)?;
        Self::write_transaction(&self.conn.lock(), transaction, true)
    }

    fn get_transaction(&self, id: RecordId) -> StoreResult<Option<Transaction>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id.to_string()], transaction_from_row)
            .optional()?)
    }

    fn transactions_after(&self, cutoff: Option<Timestamp>) -> StoreResult<Vec<Transaction>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE ?1 IS NULL OR created_at > ?1
             ORDER BY created_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![cutoff.as_ref().map(ts_text)], transaction_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn unreconciled_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE is_synced = 0 ORDER BY created_at, id LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit_param(limit)], transaction_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn mark_transactions_reconciled(
        &self,
        sent: &[Transaction],
        at: Timestamp,
    ) -> StoreResult<usize> {
        mark_reconciled(
            &mut self.conn.lock(),
            "transactions",
            TRANSACTION_COLUMNS,
            transaction_from_row,
            sent,
            at,
        )
    }

    fn unreconciled_counts(&self) -> StoreResult<UnreconciledCounts> {
        let conn = self.conn.lock();
        Ok(UnreconciledCounts {
            branches: count_unreconciled(&conn, "branches")?,
            transactions: count_unreconciled(&conn, "transactions")?,
        })
    }

    fn sync_cutoff(&self) -> StoreResult<Option<Timestamp>> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1",
                params![CUTOFF_KEY],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|v| parse_timestamp(&v).map_err(|e| StoreError::Corrupt(e.to_string())))
            .transpose()
    }

    fn set_sync_cutoff(&self, cutoff: Timestamp) -> StoreResult<()> {
        self.conn.lock().execute(
            "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![CUTOFF_KEY, ts_text(&cutoff)],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchsync_protocol::{now, SyncRecord};

    #[test]
    fn roundtrips_branch_columns() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut branch = Branch::new("DAPUR", "Dapur").with_description("central kitchen");
        branch.is_active = false;
        branch.mark_reconciled(now());
        store.upsert_branch(&branch).unwrap();

        assert_eq!(store.get_branch(branch.id).unwrap(), Some(branch));
    }

    #[test]
    fn code_clash_is_constraint() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_branch(&Branch::new("DAPUR", "Dapur")).unwrap();

        let err = store.upsert_branch(&Branch::new("DAPUR", "Other")).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)), "{err:?}");
    }

    #[test]
    fn insert_duplicate_identity() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tx = Transaction::new(RecordId::new(), TransactionType::Out, "supplies", 12.5);
        store.insert_transaction(&tx).unwrap();

        let err = store.insert_transaction(&tx).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[test]
    fn mark_compares_the_stored_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tx = Transaction::new(RecordId::new(), TransactionType::Out, "supplies", 12.5);
        store.insert_transaction(&tx).unwrap();
        let sent = store.unreconciled_transactions(1).unwrap();

        let mut edited = tx.clone();
        edited.category = "rent".into();
        store.upsert_transaction(&edited).unwrap();

        assert_eq!(store.mark_transactions_reconciled(&sent, now()).unwrap(), 0);
        assert_eq!(store.mark_transactions_reconciled(&[edited], now()).unwrap(), 1);
    }

    #[test]
    fn cutoff_persists() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.sync_cutoff().unwrap(), None);

        let ts = now();
        store.set_sync_cutoff(ts).unwrap();
        store.set_sync_cutoff(ts).unwrap();
        assert_eq!(store.sync_cutoff().unwrap(), Some(ts));
    }

    #[test]
    fn corrupt_cutoff_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO sync_meta (key, value) VALUES (?1, 'yesterday')",
                params![CUTOFF_KEY],
            )
            .unwrap();

        assert!(matches!(store.sync_cutoff(), Err(StoreError::Corrupt(_))));
    }
}
