//! Read-only status surface for the edge node.

use crate::engine::ConnectivityState;
use crate::error::SyncResult;
use branchsync_protocol::{
    endpoints, now, HealthResponse, Method, StatusResponse, WireHandler, WireRequest, WireResponse,
};
use branchsync_store::RecordStore;
use std::sync::Arc;
use tracing::warn;

/// Reports the engine's last connectivity verdict and the unreconciled
/// backlog. Never triggers a sync.
pub struct StatusReporter<C, S: ?Sized> {
    connectivity: C,
    store: Arc<S>,
}

impl<C: ConnectivityState, S: RecordStore + ?Sized> StatusReporter<C, S> {
    /// Creates a reporter.
    pub fn new(connectivity: C, store: Arc<S>) -> Self {
        Self {
            connectivity,
            store,
        }
    }

    /// Builds a status snapshot.
    pub fn report(&self) -> SyncResult<StatusResponse> {
        let counts = self.store.unreconciled_counts()?;
        Ok(StatusResponse {
            status: self.connectivity.is_online().into(),
            unsynced_count: counts.total(),
            unsynced_branches: counts.branches,
            unsynced_transactions: counts.transactions,
            timestamp: now(),
        })
    }
}

impl<C: ConnectivityState, S: RecordStore + ?Sized> WireHandler for StatusReporter<C, S> {
    fn handle(&self, request: &WireRequest) -> WireResponse {
        match request.path.as_str() {
            endpoints::STATUS | endpoints::HEALTH if request.method != Method::Get => {
                WireResponse::error(405, "Method not allowed")
            }
            endpoints::STATUS => match self.report() {
                Ok(status) => WireResponse::ok("System status", status),
                Err(e) => {
                    warn!(error = %e, "failed to build status report");
                    WireResponse::error(500, "Failed to get status")
                }
            },
            endpoints::HEALTH => WireResponse::ok("Service is healthy", HealthResponse::healthy()),
            _ => WireResponse::error(404, "Not found"),
        }
    }
}
