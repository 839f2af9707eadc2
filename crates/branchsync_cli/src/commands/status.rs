//! Status command implementation.

use branchsync_engine::{
    ConnectivityState, HttpProbe, ReachabilityProbe, ReqwestClient, StatusReporter, SyncConfig,
};
use branchsync_protocol::{format_timestamp, ConnectivityStatus, StatusResponse};
use branchsync_store::{RecordStore, SqliteStore};
use std::path::Path;
use std::sync::Arc;

/// Connectivity taken from a single probe.
struct Probed(bool);

impl ConnectivityState for Probed {
    fn is_online(&self) -> bool {
        self.0
    }
}

/// Runs the status command.
///
/// Probes the cloud once when sync is configured; otherwise reports offline.
pub async fn run(
    db: &Path,
    config: SyncConfig,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteStore::open(db)?);

    let online = if config.is_enabled() {
        HttpProbe::new(config.base_url(), config.probe_path.clone(), ReqwestClient::new()?)
            .with_timeout(config.probe_timeout)
            .probe()
            .await
    } else {
        false
    };

    let status = StatusReporter::new(Probed(online), Arc::clone(&store)).report()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&status)?),
        _ => print_text(&status, store.as_ref(), config.is_enabled())?,
    }
    Ok(())
}

fn print_text(
    status: &StatusResponse,
    store: &dyn RecordStore,
    sync_enabled: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let connectivity = match status.status {
        ConnectivityStatus::Online => "online",
        ConnectivityStatus::Offline if sync_enabled => "offline",
        ConnectivityStatus::Offline => "offline (sync disabled)",
    };
    let cutoff = store
        .sync_cutoff()?
        .map(|c| format_timestamp(&c))
        .unwrap_or_else(|| "never".to_string());

    println!("Edge Status");
    println!("===========");
    println!("Connectivity:          {connectivity}");
    println!("Unsynced branches:     {}", status.unsynced_branches);
    println!("Unsynced transactions: {}", status.unsynced_transactions);
    println!("Unsynced total:        {}", status.unsynced_count);
    println!("Last pull cutoff:      {cutoff}");
    Ok(())
}
