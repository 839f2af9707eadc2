//! The edge sync engine.
//!
//! One cycle is probe → pull → push. Pull runs first so the edge sees cloud
//! state before it offers its own; a failure in either step is recorded and
//! the other step still runs. An offline cycle touches neither the store nor
//! the transport.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpTransport, ReqwestClient};
use crate::probe::{HttpProbe, ReachabilityProbe};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use branchsync_protocol::{now, PullQuery, PushRequest, RecordId, SyncRecord, Timestamp};
use branchsync_store::RecordStore;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has run yet.
    Idle,
    /// Checking whether the cloud is reachable.
    Probing,
    /// Fetching cloud changes.
    Pulling,
    /// Sending local changes.
    Pushing,
    /// The last probe failed; the cycle was skipped.
    Offline,
    /// The last cycle completed without errors or rejected records.
    Synced,
    /// The last cycle ran but a step failed or records were left behind.
    Degraded,
}

impl SyncState {
    /// Returns true while a cycle is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Probing | SyncState::Pulling | SyncState::Pushing
        )
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Online cycles completed.
    pub cycles_completed: u64,
    /// Cycles skipped because the cloud was unreachable.
    pub offline_cycles: u64,
    /// Records pulled and applied locally.
    pub records_pulled: u64,
    /// Records pushed and acknowledged.
    pub records_pushed: u64,
    /// Records that failed to apply or were not acknowledged.
    pub records_rejected: u64,
    /// End of the last cycle in which both steps succeeded.
    pub last_sync_time: Option<Timestamp>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// What a pull step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullOutcome {
    /// Records in the response.
    pub received: usize,
    /// Records written locally.
    pub applied: usize,
    /// Records that could not be written.
    pub failed: usize,
    /// Whether the stored cutoff moved.
    pub cutoff_advanced: bool,
}

/// What a push step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Records sent.
    pub sent: usize,
    /// Sent records the cloud acknowledged, now marked reconciled.
    pub acknowledged: usize,
    /// Sent records left unreconciled.
    pub rejected: usize,
    /// Acknowledged records edited locally while the push was out; they
    /// stay unreconciled and go out again with the edit.
    pub superseded: usize,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncCycleResult {
    /// Probe verdict.
    pub online: bool,
    /// Pull outcome, if the pull step succeeded.
    pub pull: Option<PullOutcome>,
    /// Push outcome, if the push step succeeded.
    pub push: Option<PushOutcome>,
    /// Step failures, prefixed with the step name.
    pub errors: Vec<String>,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    /// Returns true if the cycle ran online and no step failed.
    pub fn is_success(&self) -> bool {
        self.online && self.errors.is_empty()
    }

    /// Records that failed to apply or were not acknowledged.
    pub fn rejected(&self) -> usize {
        self.pull.map_or(0, |p| p.failed) + self.push.map_or(0, |p| p.rejected)
    }
}

/// Something the scheduler can run once per tick.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    /// Runs one complete cycle. Never fails; problems are reported in the
    /// result.
    async fn run_cycle(&self) -> SyncCycleResult;
}

#[async_trait]
impl<R: CycleRunner + ?Sized> CycleRunner for Arc<R> {
    async fn run_cycle(&self) -> SyncCycleResult {
        (**self).run_cycle().await
    }
}

/// Read access to the last reachability verdict.
pub trait ConnectivityState: Send + Sync {
    /// Returns the result of the most recent probe; false before any.
    fn is_online(&self) -> bool;
}

impl<C: ConnectivityState + ?Sized> ConnectivityState for Arc<C> {
    fn is_online(&self) -> bool {
        (**self).is_online()
    }
}

/// Engine wired to the cloud over `reqwest`.
pub type HttpSyncEngine<S> =
    SyncEngine<HttpTransport<Arc<ReqwestClient>>, HttpProbe<Arc<ReqwestClient>>, S>;

/// The sync engine reconciles a local store with the cloud.
pub struct SyncEngine<T, P, S: ?Sized> {
    config: SyncConfig,
    transport: T,
    probe: P,
    store: Arc<S>,
    online: AtomicBool,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    deferred: RwLock<HashSet<RecordId>>,
}

impl<S: RecordStore + ?Sized> HttpSyncEngine<S> {
    /// Builds an engine that talks to `config.cloud_url` over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] when sync is not configured.
    pub fn connect(config: SyncConfig, store: Arc<S>) -> SyncResult<Self> {
        if !config.is_enabled() {
            return Err(SyncError::NotConnected);
        }
        let key = config.branch_key.clone().unwrap_or_default();
        let client = Arc::new(ReqwestClient::new()?);
        let base = config.base_url().to_string();
        let transport = HttpTransport::new(base.clone(), key, Arc::clone(&client))
            .with_timeout(config.request_timeout);
        let probe = HttpProbe::new(base, config.probe_path.clone(), client)
            .with_timeout(config.probe_timeout);
        Ok(SyncEngine::new(config, transport, probe, store))
    }
}

impl<T, P, S> SyncEngine<T, P, S>
where
    T: SyncTransport,
    P: ReachabilityProbe,
    S: RecordStore + ?Sized,
{
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, transport: T, probe: P, store: Arc<S>) -> Self {
        Self {
            config,
            transport,
            probe,
            store,
            online: AtomicBool::new(false),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            deferred: RwLock::new(HashSet::new()),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Gets the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs probe → pull → push once.
    pub async fn sync(&self) -> SyncCycleResult {
        let start = Instant::now();

        self.set_state(SyncState::Probing);
        let online = self.probe.probe().await;
        self.online.store(online, Ordering::SeqCst);

        let mut result = SyncCycleResult {
            online,
            ..SyncCycleResult::default()
        };

        if !online {
            debug!("cloud unreachable, skipping sync cycle");
            self.set_state(SyncState::Offline);
            self.stats.write().offline_cycles += 1;
            result.duration = start.elapsed();
            return result;
        }

        self.set_state(SyncState::Pulling);
        match self.pull().await {
            Ok(outcome) => result.pull = Some(outcome),
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "pull failed");
                result.errors.push(format!("pull: {e}"));
            }
        }

        self.set_state(SyncState::Pushing);
        match self.push().await {
            Ok(outcome) => result.push = Some(outcome),
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "push failed");
                result.errors.push(format!("push: {e}"));
            }
        }

        result.duration = start.elapsed();
        self.record_cycle(&result);

        if result.is_success() && result.rejected() == 0 {
            self.set_state(SyncState::Synced);
        } else {
            self.set_state(SyncState::Degraded);
        }

        let pulled = result.pull.map_or(0, |p| p.applied);
        let pushed = result.push.map_or(0, |p| p.acknowledged);
        if pulled > 0 || pushed > 0 || !result.is_success() {
            info!(
                pulled,
                pushed,
                rejected = result.rejected(),
                errors = result.errors.len(),
                duration_ms = result.duration.as_millis() as u64,
                "sync cycle completed"
            );
        } else {
            debug!("sync cycle completed, nothing to exchange");
        }

        result
    }

    fn record_cycle(&self, result: &SyncCycleResult) {
        let mut stats = self.stats.write();
        stats.cycles_completed += 1;
        stats.records_pulled += result.pull.map_or(0, |p| p.applied) as u64;
        stats.records_pushed += result.push.map_or(0, |p| p.acknowledged) as u64;
        stats.records_rejected += result.rejected() as u64;
        if result.errors.is_empty() {
            stats.last_sync_time = Some(now());
        } else {
            stats.last_error = Some(result.errors.join("; "));
        }
    }

    /// Fetches cloud changes after the stored cutoff and applies them.
    ///
    /// Received records are written already reconciled. The returned cutoff
    /// is persisted unless it would move the stored one backwards. Records
    /// that fail to apply are logged and counted; they come down again once
    /// their cloud copy changes.
    pub async fn pull(&self) -> SyncResult<PullOutcome> {
        let cutoff = self.store.sync_cutoff()?;
        let response = self.transport.pull(&PullQuery::new(cutoff)).await?;

        let at = now();
        let mut outcome = PullOutcome {
            received: response.len(),
            ..PullOutcome::default()
        };

        // Branches first so transactions never land before their owner.
        for mut branch in response.branches {
            branch.mark_reconciled(at);
            match self.store.upsert_branch(&branch) {
                Ok(()) => outcome.applied += 1,
                Err(e) => {
                    warn!(id = %branch.id, error = %e, "failed to apply pulled branch");
                    outcome.failed += 1;
                }
            }
        }
        for mut transaction in response.transactions {
            transaction.mark_reconciled(at);
            match self.store.upsert_transaction(&transaction) {
                Ok(()) => outcome.applied += 1,
                Err(e) => {
                    warn!(id = %transaction.id, error = %e, "failed to apply pulled transaction");
                    outcome.failed += 1;
                }
            }
        }

        if outcome.failed > 0 {
            warn!(failed = outcome.failed, "some pulled records were not applied");
        }
        if cutoff.map_or(true, |c| response.sync_cutoff >= c) {
            self.store.set_sync_cutoff(response.sync_cutoff)?;
            outcome.cutoff_advanced = true;
        }

        Ok(outcome)
    }

    /// Sends one batch of unreconciled records and marks what the cloud
    /// acknowledged.
    ///
    /// Records beyond the batch size wait for later cycles. Records the
    /// cloud turned down go to the back of the queue, behind records it has
    /// not seen yet. A record is only marked if it was not edited while the
    /// push was out.
    pub async fn push(&self) -> SyncResult<PushOutcome> {
        let limit = self.config.push_batch_size.max(1);
        let deferred = self.deferred.read().clone();
        let window = limit.saturating_add(deferred.len());
        let branches = fresh_first(self.store.unreconciled_branches(window)?, &deferred, limit);
        let transactions = fresh_first(
            self.store.unreconciled_transactions(window)?,
            &deferred,
            limit,
        );
        let request = PushRequest::new(branches, transactions);

        if request.is_empty() {
            debug!("no unreconciled records to push");
            return Ok(PushOutcome::default());
        }

        let response = self.transport.push(&request).await?;

        let acked_branches = acknowledged(&request.branches, &response.synced_branch_ids);
        let acked_transactions =
            acknowledged(&request.transactions, &response.synced_transaction_ids);

        let at = now();
        let marked = self.store.mark_branches_reconciled(&acked_branches, at)?
            + self
                .store
                .mark_transactions_reconciled(&acked_transactions, at)?;

        let sent = request.len();
        let acknowledged = acked_branches.len() + acked_transactions.len();
        let outcome = PushOutcome {
            sent,
            acknowledged,
            rejected: sent - acknowledged,
            superseded: acknowledged.saturating_sub(marked),
        };

        let acked: HashSet<RecordId> = acked_branches
            .iter()
            .map(|b| b.id)
            .chain(acked_transactions.iter().map(|t| t.id))
            .collect();
        {
            let mut deferred = self.deferred.write();
            let sent_ids = request
                .branches
                .iter()
                .map(|b| b.id)
                .chain(request.transactions.iter().map(|t| t.id));
            for id in sent_ids {
                if acked.contains(&id) {
                    deferred.remove(&id);
                } else {
                    deferred.insert(id);
                }
            }
        }

        if outcome.rejected > 0 {
            warn!(
                sent,
                acknowledged,
                "cloud did not acknowledge every record; the rest stay unreconciled"
            );
        }
        if outcome.superseded > 0 {
            debug!(
                superseded = outcome.superseded,
                "records edited during push stay unreconciled"
            );
        }
        Ok(outcome)
    }
}

/// Sent records whose ids the cloud acknowledged.
fn acknowledged<R: SyncRecord>(sent: &[R], acked: &[RecordId]) -> Vec<R> {
    let acked: HashSet<RecordId> = acked.iter().copied().collect();
    sent.iter().filter(|r| acked.contains(&r.id())).cloned().collect()
}

/// Keeps selection order but moves `deferred` ids behind the rest, then
/// caps at `limit`.
fn fresh_first<R: SyncRecord>(
    records: Vec<R>,
    deferred: &HashSet<RecordId>,
    limit: usize,
) -> Vec<R> {
    let (mut fresh, retried): (Vec<R>, Vec<R>) = records
        .into_iter()
        .partition(|r| !deferred.contains(&r.id()));
    fresh.extend(retried);
    fresh.truncate(limit);
    fresh
}

#[async_trait]
impl<T, P, S> CycleRunner for SyncEngine<T, P, S>
where
    T: SyncTransport,
    P: ReachabilityProbe,
    S: RecordStore + ?Sized,
{
    async fn run_cycle(&self) -> SyncCycleResult {
        self.sync().await
    }
}

impl<T, P, S> ConnectivityState for SyncEngine<T, P, S>
where
    T: Send + Sync,
    P: Send + Sync,
    S: Send + Sync + ?Sized,
{
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
