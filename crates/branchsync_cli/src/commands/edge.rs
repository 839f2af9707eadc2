//! Edge daemon command implementation.

use branchsync_engine::{HttpSyncEngine, StatusReporter, SyncConfig, SyncScheduler};
use branchsync_store::SqliteStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the edge daemon until Ctrl-C.
///
/// With sync disabled the process still opens the store and waits, so the
/// local ledger keeps working without a cloud.
pub async fn run(db: &Path, config: SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteStore::open(db)?);
    info!(db = %db.display(), "edge store opened");

    let engine = if config.is_enabled() {
        Some(Arc::new(HttpSyncEngine::connect(config.clone(), Arc::clone(&store))?))
    } else {
        warn!("CLOUD_API_URL or BRANCH_API_KEY not set, running without sync");
        None
    };
    let scheduler = engine.as_ref().map(|engine| {
        let scheduler = SyncScheduler::start(Arc::clone(engine), config.sync_interval);
        info!(
            cloud_url = config.base_url(),
            interval_secs = scheduler.interval().as_secs(),
            "edge sync enabled"
        );
        scheduler
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    if let Some(engine) = engine {
        let stats = engine.stats();
        let status = StatusReporter::new(Arc::clone(&engine), store).report()?;
        info!(
            cycles = stats.cycles_completed,
            offline_cycles = stats.offline_cycles,
            pulled = stats.records_pulled,
            pushed = stats.records_pushed,
            unsynced = status.unsynced_count,
            "edge stopped"
        );
    }
    Ok(())
}
