//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use branchsync_protocol::{PullQuery, PullResponse, PushRequest, PushResponse};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A sync transport carries pull and push exchanges to the cloud.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Pulls records changed after the query's cutoff.
    async fn pull(&self, query: &PullQuery) -> SyncResult<PullResponse>;

    /// Pushes a batch of local records.
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;
}

#[async_trait]
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    async fn pull(&self, query: &PullQuery) -> SyncResult<PullResponse> {
        (**self).pull(query).await
    }

    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        (**self).push(request).await
    }
}

/// A mock transport for testing.
///
/// Pull returns the configured response. Push acknowledges every record it
/// receives unless a response has been set explicitly. Every request is
/// recorded.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    pull_response: Mutex<Option<PullResponse>>,
    push_response: Mutex<Option<PushResponse>>,
    pulls: Mutex<Vec<PullQuery>>,
    pushes: Mutex<Vec<PushRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            pull_response: Mutex::new(None),
            push_response: Mutex::new(None),
            pulls: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
        }
    }

    /// Sets the pull response.
    pub fn set_pull_response(&self, response: PullResponse) {
        *self.pull_response.lock() = Some(response);
    }

    /// Sets a fixed push response instead of acknowledging everything.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Sets the connected state. Requests fail while disconnected.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every pull query seen so far.
    pub fn pulls(&self) -> Vec<PullQuery> {
        self.pulls.lock().clone()
    }

    /// Returns every push request seen so far.
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::transport_retryable("mock transport disconnected"))
        }
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn pull(&self, query: &PullQuery) -> SyncResult<PullResponse> {
        self.check_connected()?;
        self.pulls.lock().push(query.clone());
        self.pull_response
            .lock()
            .clone()
            .ok_or(SyncError::NotConnected)
    }

    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.check_connected()?;
        self.pushes.lock().push(request.clone());
        if let Some(response) = self.push_response.lock().clone() {
            return Ok(response);
        }
        Ok(PushResponse {
            received_count: request.len(),
            synced_branch_ids: request.branches.iter().map(|b| b.id).collect(),
            synced_transaction_ids: request.transactions.iter().map(|t| t.id).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchsync_protocol::{now, Branch};

    #[tokio::test]
    async fn mock_acknowledges_everything_by_default() {
        let transport = MockTransport::new();
        let branch = Branch::new("DAPUR", "Dapur");
        let request = PushRequest::new(vec![branch.clone()], vec![]);

        let response = transport.push(&request).await.unwrap();
        assert_eq!(response.received_count, 1);
        assert_eq!(response.synced_branch_ids, vec![branch.id]);
        assert_eq!(transport.pushes().len(), 1);
    }

    #[tokio::test]
    async fn mock_transport_disconnected_error() {
        let transport = MockTransport::new();
        transport.set_connected(false);

        let err = transport.pull(&PullQuery::full()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(transport.pulls().is_empty());
    }

    #[tokio::test]
    async fn mock_pull_response() {
        let transport = MockTransport::new();
        assert!(transport.pull(&PullQuery::full()).await.is_err());

        let cutoff = now();
        transport.set_pull_response(PullResponse::empty(cutoff));
        let response = transport.pull(&PullQuery::new(Some(cutoff))).await.unwrap();
        assert_eq!(response.sync_cutoff, cutoff);
        assert_eq!(transport.pulls()[1].last_sync, Some(cutoff));
    }
}
