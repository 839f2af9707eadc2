//! # branchsync engine
//!
//! Edge-side synchronization for branchsync.
//!
//! This crate provides:
//! - [`SyncEngine`]: one probe → pull → push cycle against the cloud
//! - [`SyncScheduler`]: the background loop with start / stop
//! - [`ReachabilityProbe`] implementations
//! - [`SyncTransport`] over HTTP, plus loopback and mock transports
//! - [`StatusReporter`]: the read-only status surface
//!
//! ## Architecture
//!
//! The engine implements a **pull-then-push** model:
//! 1. Probe the cloud; if unreachable, skip the cycle entirely
//! 2. Pull cloud changes after the stored cutoff and apply them reconciled
//! 3. Push one batch of unreconciled local records and mark the
//!    acknowledged ones reconciled
//!
//! ## Key Invariants
//!
//! - Pull always happens before push
//! - A record is marked reconciled only after the cloud acknowledged it
//! - A failed step never aborts the other step or the loop
//! - Offline cycles never touch the store
//!
//! ## Example
//!
//! ```rust,no_run
//! use branchsync_engine::{HttpSyncEngine, StatusReporter, SyncConfig, SyncScheduler};
//! use branchsync_store::SqliteStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::open("edge.db")?);
//! let config = SyncConfig::new("https://ledger.example.com", "branch-key");
//! let engine = Arc::new(HttpSyncEngine::connect(config.clone(), Arc::clone(&store))?);
//! let status = StatusReporter::new(Arc::clone(&engine), store);
//!
//! let scheduler = SyncScheduler::start_if_enabled(&config, Arc::clone(&engine));
//! println!("{:?}", status.report()?);
//! if let Some(scheduler) = scheduler {
//!     scheduler.shutdown().await;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod probe;
mod scheduler;
mod status;
mod transport;

pub use config::{SyncConfig, DEFAULT_SYNC_INTERVAL_SECS};
pub use engine::{
    ConnectivityState, CycleRunner, HttpSyncEngine, PullOutcome, PushOutcome, SyncCycleResult,
    SyncEngine, SyncState, SyncStats,
};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, ReqwestClient};
pub use probe::{HttpProbe, ReachabilityProbe, StaticProbe};
pub use scheduler::SyncScheduler;
pub use status::StatusReporter;
pub use transport::{MockTransport, SyncTransport};
