//! HTTP transport implementation.
//!
//! The sync transport speaks JSON over HTTP. The actual HTTP client is
//! abstracted via [`HttpClient`] so the same transport runs over `reqwest`
//! in production and over an in-process [`LoopbackClient`] in tests.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use branchsync_protocol::{
    endpoints, ApiEnvelope, PullQuery, PullResponse, PushRequest, PushResponse, WireHandler,
    WireRequest, WireResponse,
};
use parking_lot::RwLock;
use serde::de::{DeserializeOwned, IgnoredAny};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// HTTP client abstraction.
///
/// Implementations send one request to `base_url + request.path` and return
/// the raw status and body. Connection failures map to
/// [`SyncError::Transport`] and expired deadlines to [`SyncError::Timeout`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request, giving up after `timeout`.
    async fn send(
        &self,
        base_url: &str,
        request: WireRequest,
        timeout: Duration,
    ) -> SyncResult<WireResponse>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    async fn send(
        &self,
        base_url: &str,
        request: WireRequest,
        timeout: Duration,
    ) -> SyncResult<WireResponse> {
        (**self).send(base_url, request, timeout).await
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client with rustls.
    pub fn new() -> SyncResult<Self> {
        let inner = reqwest::Client::builder()
            .build()
            .map_err(|e| SyncError::transport_fatal(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Wraps an existing `reqwest` client.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(
        &self,
        base_url: &str,
        request: WireRequest,
        timeout: Duration,
    ) -> SyncResult<WireResponse> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), request.path);
        let mut builder = match request.method {
            branchsync_protocol::Method::Get => self.inner.get(&url),
            branchsync_protocol::Method::Post => self
                .inner
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(request.body),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder.timeout(timeout).send().await.map_err(map_reqwest)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest)?;
        Ok(WireResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn map_reqwest(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::transport_retryable(err.to_string())
    }
}

/// HTTP-based sync transport.
///
/// Uses JSON bodies inside the standard response envelope and attaches the
/// branch credential as a bearer token.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the cloud node.
    base_url: String,
    /// Branch credential.
    bearer: String,
    /// HTTP client implementation.
    client: C,
    /// Per-request timeout.
    timeout: Duration,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, bearer: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            bearer: bearer.into(),
            client,
            timeout: Duration::from_secs(30),
            last_error: RwLock::new(None),
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn exchange<T: DeserializeOwned>(&self, request: WireRequest) -> SyncResult<T> {
        let path = request.path.clone();
        let result = self.exchange_inner(request).await;
        match &result {
            Ok(_) => *self.last_error.write() = None,
            Err(e) => {
                debug!(path = %path, error = %e, "sync request failed");
                *self.last_error.write() = Some(e.to_string());
            }
        }
        result
    }

    async fn exchange_inner<T: DeserializeOwned>(&self, request: WireRequest) -> SyncResult<T> {
        let request = request.with_bearer(self.bearer.clone());
        let response = self
            .client
            .send(&self.base_url, request, self.timeout)
            .await?;

        if response.status == 401 {
            return Err(SyncError::AuthenticationFailed(error_message(&response)));
        }
        if !response.is_success() {
            return Err(SyncError::Server {
                status: response.status,
                message: error_message(&response),
            });
        }

        Ok(ApiEnvelope::<T>::from_json(&response.body)?.into_data()?)
    }
}

/// Best-effort message from a failed response.
fn error_message(response: &WireResponse) -> String {
    ApiEnvelope::<IgnoredAny>::from_json(&response.body)
        .map(|env| env.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned())
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn pull(&self, query: &PullQuery) -> SyncResult<PullResponse> {
        self.exchange(WireRequest::get(endpoints::PULL).with_query(query.to_query_pairs()))
            .await
    }

    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let body = request.to_json()?;
        self.exchange(WireRequest::post(endpoints::PUSH, body)).await
    }
}

/// An [`HttpClient`] that hands requests straight to an in-process handler.
///
/// Reachability can be toggled to simulate network partitions.
pub struct LoopbackClient<H: WireHandler> {
    handler: H,
    reachable: AtomicBool,
    requests: AtomicU64,
}

impl<H: WireHandler> LoopbackClient<H> {
    /// Creates a reachable loopback client.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            reachable: AtomicBool::new(true),
            requests: AtomicU64::new(0),
        }
    }

    /// Sets whether requests reach the handler.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of requests that reached the handler.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Returns the wrapped handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

#[async_trait]
impl<H: WireHandler> HttpClient for LoopbackClient<H> {
    async fn send(
        &self,
        _base_url: &str,
        request: WireRequest,
        _timeout: Duration,
    ) -> SyncResult<WireResponse> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("connection refused"));
        }
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.handler.handle(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchsync_protocol::{now, Branch, Method};
    use parking_lot::Mutex;

    /// Replies with a fixed response and records what it saw.
    struct Canned {
        response: WireResponse,
        seen: Mutex<Vec<WireRequest>>,
    }

    impl Canned {
        fn new(response: WireResponse) -> Self {
            Self {
                response,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl WireHandler for Canned {
        fn handle(&self, request: &WireRequest) -> WireResponse {
            self.seen.lock().push(request.clone());
            self.response.clone()
        }
    }

    fn transport(response: WireResponse) -> HttpTransport<LoopbackClient<Canned>> {
        HttpTransport::new(
            "http://cloud.local",
            "branch-key",
            LoopbackClient::new(Canned::new(response)),
        )
    }

    #[tokio::test]
    async fn push_attaches_bearer_and_decodes_ack() {
        let branch = Branch::new("DAPUR", "Dapur");
        let ack = PushResponse {
            received_count: 1,
            synced_branch_ids: vec![branch.id],
            synced_transaction_ids: vec![],
        };
        let transport = transport(WireResponse::ok("Sync completed successfully", &ack));

        let response = transport
            .push(&PushRequest::new(vec![branch], vec![]))
            .await
            .unwrap();
        assert_eq!(response, ack);

        let seen = transport.client.handler().seen.lock();
        assert_eq!(seen[0].method, Method::Post);
        assert_eq!(seen[0].path, endpoints::PUSH);
        assert_eq!(seen[0].bearer.as_deref(), Some("branch-key"));
        assert!(transport.last_error().is_none());
    }

    #[tokio::test]
    async fn pull_sends_cutoff_as_query() {
        let cutoff = now();
        let transport = transport(WireResponse::ok("ok", PullResponse::empty(cutoff)));

        let response = transport
            .pull(&PullQuery::new(Some(cutoff)))
            .await
            .unwrap();
        assert_eq!(response.sync_cutoff, cutoff);

        let seen = transport.client.handler().seen.lock();
        assert_eq!(seen[0].path, endpoints::PULL);
        assert_eq!(seen[0].query, PullQuery::new(Some(cutoff)).to_query_pairs());
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_failed() {
        let transport = transport(WireResponse::error(401, "Invalid API key"));

        let err = transport.pull(&PullQuery::full()).await.unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed(ref m) if m == "Invalid API key"));
        assert!(transport.last_error().is_some());
    }

    #[tokio::test]
    async fn server_failure_keeps_status() {
        let transport = transport(WireResponse::error(500, "Failed to sync"));

        let err = transport.push(&PushRequest::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::Server { status: 500, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn failed_envelope_is_rejected_even_on_200() {
        let transport = transport(WireResponse::error(200, "nope"));

        let err = transport.pull(&PullQuery::full()).await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[tokio::test]
    async fn unreachable_loopback_is_transport_error() {
        let transport = transport(WireResponse::ok("ok", PullResponse::empty(now())));
        transport.client.set_reachable(false);

        let err = transport.pull(&PullQuery::full()).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { retryable: true, .. }));
        assert_eq!(transport.client.request_count(), 0);
    }
}
