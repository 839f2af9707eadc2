//! # Branchsync Server
//!
//! Cloud side of branch ledger synchronization.
//!
//! This crate provides:
//! - Push ingestion: idempotent upserts of branches and transactions
//! - Pull deltas: records mutated after the caller's cutoff
//! - Branch authentication (static keys or HMAC-SHA256 issued credentials)
//!
//! # Architecture
//!
//! The server owns no listener. [`CloudServer`] implements
//! [`branchsync_protocol::WireHandler`], so any HTTP front end can translate
//! its requests into wire requests and write the responses back. Records
//! live in any [`branchsync_store::RecordStore`].
//!
//! # Authentication
//!
//! Authentication is off unless a secret or static key is configured:
//!
//! ```rust,ignore
//! use branchsync_server::{BranchCredentials, ServerConfig};
//!
//! let secret = b"my-secure-secret-32-bytes-long!".to_vec();
//! let config = ServerConfig::new().with_credential_secret(secret.clone());
//!
//! // Hand this to the branch as its BRANCH_API_KEY
//! let key = BranchCredentials::new(secret).issue(branch_id)?;
//! ```
//!
//! When a credential identifies a branch, pushed transactions belonging to
//! another branch are skipped.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::{Authenticator, BranchCredentials};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler, ServerStats};
pub use server::CloudServer;
