//! CLI command implementations.

pub mod edge;
pub mod issue_credential;
pub mod status;
pub mod sync_once;
