//! # branchsync store
//!
//! Record store trait and implementations.
//!
//! Both nodes keep their Branch and Transaction records behind the same
//! [`RecordStore`] interface. The sync engine relies on four things from it:
//! atomic upsert by identity, query-after-cutoff, query-unreconciled and
//! bulk mark-reconciled.
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral nodes
//! - [`SqliteStore`] - Embedded on-disk store for edge deployments
//!
//! ## Example
//!
//! ```rust
//! use branchsync_protocol::Branch;
//! use branchsync_store::{MemoryStore, RecordStore};
//!
//! let store = MemoryStore::new();
//! let branch = Branch::new("DAPUR", "Dapur Pusat");
//! store.upsert_branch(&branch).unwrap();
//! store.upsert_branch(&branch).unwrap();
//! assert_eq!(store.unreconciled_counts().unwrap().branches, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod sqlite;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{RecordStore, UnreconciledCounts};
