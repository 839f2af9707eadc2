//! Reachability probing.

use crate::http::HttpClient;
use async_trait::async_trait;
use branchsync_protocol::WireRequest;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Decides whether the cloud is reachable right now.
///
/// A probe never fails: every error is folded into `false`.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Returns true if the cloud answered in time with a success status.
    async fn probe(&self) -> bool;
}

/// Probes by issuing an unauthenticated GET against the cloud health path.
pub struct HttpProbe<C: HttpClient> {
    base_url: String,
    path: String,
    timeout: Duration,
    client: C,
}

impl<C: HttpClient> HttpProbe<C> {
    /// Creates a probe for `base_url + path`.
    pub fn new(base_url: impl Into<String>, path: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            timeout: Duration::from_secs(3),
            client,
        }
    }

    /// Sets the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<C: HttpClient> ReachabilityProbe for HttpProbe<C> {
    async fn probe(&self) -> bool {
        let request = WireRequest::get(self.path.clone());
        match self.client.send(&self.base_url, request, self.timeout).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                debug!(status = response.status, "probe got non-success status");
                false
            }
            Err(e) => {
                debug!(error = %e, "probe failed");
                false
            }
        }
    }
}

/// A probe with a fixed, settable verdict.
#[derive(Debug)]
pub struct StaticProbe {
    reachable: AtomicBool,
}

impl StaticProbe {
    /// Creates a probe that returns `reachable`.
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    /// Changes the verdict.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<P: ReachabilityProbe + ?Sized> ReachabilityProbe for std::sync::Arc<P> {
    async fn probe(&self) -> bool {
        (**self).probe().await
    }
}
