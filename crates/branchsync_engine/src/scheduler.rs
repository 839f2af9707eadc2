//! Background sync loop.

use crate::config::SyncConfig;
use crate::engine::CycleRunner;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Runs a [`CycleRunner`] on a fixed interval in one background task.
///
/// The first cycle starts immediately. Cycles never overlap: the loop waits,
/// runs a cycle to completion, then waits again, and ticks missed during a
/// slow cycle are not replayed. Stopping is cooperative; an in-flight cycle
/// finishes and the loop exits before its next wait.
///
/// Must be started from within a tokio runtime.
pub struct SyncScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl SyncScheduler {
    /// Spawns the loop.
    pub fn start<R: CycleRunner + 'static>(runner: Arc<R>, interval: Duration) -> Self {
        // tokio::time::interval panics on a zero period.
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(runner, interval, shutdown_rx));
        Self {
            shutdown_tx,
            handle: Some(handle),
            interval,
        }
    }

    /// Spawns the loop only when `config` names a cloud URL and a credential.
    pub fn start_if_enabled<R: CycleRunner + 'static>(
        config: &SyncConfig,
        runner: Arc<R>,
    ) -> Option<Self> {
        if !config.is_enabled() {
            warn!("cloud URL or branch credential not configured, sync disabled");
            return None;
        }
        Some(Self::start(runner, config.sync_interval))
    }

    /// The effective interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signals the loop to stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Returns true until the loop has exited.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "sync task ended abnormally");
            }
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop<R: CycleRunner + ?Sized>(
    runner: Arc<R>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    if *shutdown_rx.borrow_and_update() {
        return;
    }

    info!(interval_ms = interval.as_millis() as u64, "sync scheduler started");

    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }

            _ = timer.tick() => {}
        }

        runner.run_cycle().await;
    }

    info!("sync scheduler stopped");
}
