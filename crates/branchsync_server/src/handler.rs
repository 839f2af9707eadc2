//! Request handlers for sync endpoints.

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use branchsync_protocol::{
    now, HealthResponse, LenientPush, PullQuery, PullResponse, PushRequest, PushResponse, RecordId,
    SyncRecord,
};
use branchsync_store::RecordStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters kept by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Push requests handled.
    pub pushes: u64,
    /// Pull requests handled.
    pub pulls: u64,
    /// Records written from pushes.
    pub records_accepted: u64,
    /// Pushed records that were skipped.
    pub records_rejected: u64,
}

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Cloud record store.
    pub store: Arc<dyn RecordStore>,
    /// Credential resolver.
    pub authenticator: Authenticator,
    stats: RwLock<ServerStats>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<dyn RecordStore>) -> Self {
        let authenticator = Authenticator::from_config(&config);
        Self {
            config,
            store,
            authenticator,
            stats: RwLock::new(ServerStats::default()),
        }
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> ServerStats {
        *self.stats.read()
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Handles a push request.
    ///
    /// Each record is written on its own. A record that fails validation,
    /// belongs to another branch or cannot be stored is skipped and left out
    /// of the acknowledgment; the rest of the batch still applies. Stored
    /// records are marked reconciled on the cloud side.
    pub fn handle_push(
        &self,
        branch: Option<RecordId>,
        request: PushRequest,
    ) -> ServerResult<PushResponse> {
        self.apply_push(branch, request, 0)
    }

    /// Handles a push whose body was decoded leniently. Entries that did not
    /// decode count as received and rejected.
    pub fn handle_lenient_push(
        &self,
        branch: Option<RecordId>,
        push: LenientPush,
    ) -> ServerResult<PushResponse> {
        if push.malformed > 0 {
            warn!(malformed = push.malformed, "skipping undecodable pushed records");
        }
        self.apply_push(branch, push.request, push.malformed)
    }

    fn apply_push(
        &self,
        branch: Option<RecordId>,
        request: PushRequest,
        malformed: usize,
    ) -> ServerResult<PushResponse> {
        let received = request.len() + malformed;
        let max = self.context.config.max_push_batch;
        if received > max {
            return Err(ServerError::InvalidRequest(format!(
                "Too many records: {received} > {max}"
            )));
        }

        let store = &self.context.store;
        let at = now();
        let mut response = PushResponse {
            received_count: received,
            ..PushResponse::default()
        };

        for mut record in request.branches {
            record.mark_reconciled(at);
            match store.upsert_branch(&record) {
                Ok(()) => response.synced_branch_ids.push(record.id),
                Err(e) => warn!(id = %record.id, error = %e, "skipping pushed branch"),
            }
        }

        for mut record in request.transactions {
            if let Some(owner) = branch {
                if record.branch_id != owner {
                    warn!(
                        id = %record.id,
                        branch_id = %record.branch_id,
                        authenticated = %owner,
                        "skipping transaction for another branch"
                    );
                    continue;
                }
            }
            record.mark_reconciled(at);
            match store.upsert_transaction(&record) {
                Ok(()) => response.synced_transaction_ids.push(record.id),
                Err(e) => warn!(id = %record.id, error = %e, "skipping pushed transaction"),
            }
        }

        let accepted = response.acknowledged_count();
        let rejected = response.received_count - accepted;
        {
            let mut stats = self.context.stats.write();
            stats.pushes += 1;
            stats.records_accepted += accepted as u64;
            stats.records_rejected += rejected as u64;
        }
        info!(
            branch = ?branch,
            received = response.received_count,
            accepted,
            rejected,
            "push processed"
        );
        Ok(response)
    }

    /// Handles a pull request.
    ///
    /// The cutoff returned to the caller is taken before the store is read,
    /// so anything written while the query runs is returned again next time
    /// rather than skipped.
    pub fn handle_pull(&self, query: PullQuery) -> ServerResult<PullResponse> {
        let sync_cutoff = now();
        let store = &self.context.store;
        let branches = store.branches_after(query.last_sync)?;
        let transactions = store.transactions_after(query.last_sync)?;

        self.context.stats.write().pulls += 1;
        debug!(
            last_sync = ?query.last_sync,
            branches = branches.len(),
            transactions = transactions.len(),
            "pull served"
        );
        Ok(PullResponse::new(branches, transactions, sync_cutoff))
    }

    /// Handles a health check.
    pub fn handle_health(&self) -> HealthResponse {
        HealthResponse::healthy()
    }
}
