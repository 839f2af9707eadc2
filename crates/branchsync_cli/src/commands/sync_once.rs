//! One-shot sync command implementation.

use branchsync_engine::{HttpSyncEngine, SyncConfig, SyncCycleResult};
use branchsync_store::SqliteStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Outcome of a single cycle, as printed.
#[derive(Debug, Serialize)]
pub struct SyncOnceResult {
    /// Whether the cloud was reachable.
    pub online: bool,
    /// Records pulled and applied.
    pub pulled: usize,
    /// Records pushed and acknowledged.
    pub pushed: usize,
    /// Records left for a later cycle.
    pub rejected: usize,
    /// Step failures.
    pub errors: Vec<String>,
    /// Cycle duration in milliseconds.
    pub duration_ms: u64,
}

impl From<&SyncCycleResult> for SyncOnceResult {
    fn from(result: &SyncCycleResult) -> Self {
        Self {
            online: result.online,
            pulled: result.pull.map_or(0, |p| p.applied),
            pushed: result.push.map_or(0, |p| p.acknowledged),
            rejected: result.rejected(),
            errors: result.errors.clone(),
            duration_ms: result.duration.as_millis() as u64,
        }
    }
}

/// Runs the sync-once command.
pub async fn run(
    db: &Path,
    config: SyncConfig,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !config.is_enabled() {
        return Err("Cloud URL and branch key are required (CLOUD_API_URL, BRANCH_API_KEY)".into());
    }
    let store = Arc::new(SqliteStore::open(db)?);
    let engine = HttpSyncEngine::connect(config, store)?;
    let result = SyncOnceResult::from(&engine.sync().await);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }

    if result.online && result.errors.is_empty() {
        Ok(())
    } else if !result.online {
        Err("Cloud unreachable".into())
    } else {
        Err(result.errors.join("; ").into())
    }
}

fn print_text(result: &SyncOnceResult) {
    println!("Sync Cycle");
    println!("==========");
    println!("Online:   {}", if result.online { "yes" } else { "no" });
    println!("Pulled:   {}", result.pulled);
    println!("Pushed:   {}", result.pushed);
    println!("Rejected: {}", result.rejected);
    println!("Duration: {} ms", result.duration_ms);
    for error in &result.errors {
        println!("Error:    {error}");
    }
}
