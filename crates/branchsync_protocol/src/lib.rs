//! # branchsync protocol
//!
//! Record model and wire messages shared by the edge and cloud nodes.
//!
//! This crate provides:
//! - [`Branch`] and [`Transaction`], the two synchronized record kinds
//! - [`RecordId`], the client-generated 128-bit identity
//! - Push / pull / health / status messages and the JSON [`ApiEnvelope`]
//! - [`WireRequest`] / [`WireResponse`] and the [`WireHandler`] seam that
//!   lets handlers be mounted behind any HTTP front end
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod messages;
mod record;
mod timestamp;
mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use id::RecordId;
pub use messages::{
    ApiEnvelope, ConnectivityStatus, HealthResponse, LenientPush, PullQuery, PullResponse,
    PushRequest, PushResponse, StatusResponse,
};
pub use record::{Branch, RecordKind, SyncRecord, Transaction, TransactionType};
pub use timestamp::{format_timestamp, now, parse_timestamp, Timestamp};
pub use wire::{endpoints, Method, WireHandler, WireRequest, WireResponse};
