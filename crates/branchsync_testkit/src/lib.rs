//! # branchsync testkit
//!
//! Test utilities for branchsync.
//!
//! This crate provides:
//! - Record fixtures and scratch stores
//! - A fault-injecting store wrapper
//! - Property-based test generators using proptest
//! - An in-process edge/cloud harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use branchsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn edge_reaches_cloud() {
//!     let mut harness = SyncHarness::new();
//!     let edge = harness.add_edge();
//!     harness.edge(edge).store.insert_transaction(&sale(branch_id, 10.0))?;
//!     harness.sync_all().await;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod harness;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use harness::*;
