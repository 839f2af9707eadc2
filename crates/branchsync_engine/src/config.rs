//! Configuration for the sync engine.

use branchsync_protocol::endpoints;
use std::time::Duration;

/// Default seconds between sync cycles.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

/// Configuration for edge sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cloud base URL, e.g. `https://ledger.example.com`.
    pub cloud_url: Option<String>,
    /// Branch-scoped bearer credential.
    pub branch_key: Option<String>,
    /// Time between the end of one cycle's wait and the next.
    pub sync_interval: Duration,
    /// Maximum records of each kind sent in one push.
    pub push_batch_size: usize,
    /// Timeout for push and pull requests.
    pub request_timeout: Duration,
    /// Timeout for the reachability probe.
    pub probe_timeout: Duration,
    /// Path probed for reachability.
    pub probe_path: String,
}

impl SyncConfig {
    /// Creates a configuration pointing at `cloud_url` with `branch_key`.
    pub fn new(cloud_url: impl Into<String>, branch_key: impl Into<String>) -> Self {
        Self {
            cloud_url: Some(cloud_url.into()),
            branch_key: Some(branch_key.into()),
            ..Self::default()
        }
    }

    /// Sets the sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the push batch size.
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Sets the push/pull request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the probed path.
    pub fn with_probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = path.into();
        self
    }

    /// Returns true when both the cloud URL and the credential are present
    /// and non-blank. Sync never starts otherwise.
    pub fn is_enabled(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.cloud_url) && present(&self.branch_key)
    }

    /// Cloud URL without a trailing slash, or an empty string.
    pub fn base_url(&self) -> &str {
        self.cloud_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or("")
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cloud_url: None,
            branch_key: None,
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            push_batch_size: 100,
            request_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(3),
            probe_path: endpoints::HEALTH.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(config.push_batch_size, 100);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.probe_path, "/api/v1/health");
        assert!(!config.is_enabled());
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://ledger.example.com/", "k3y")
            .with_sync_interval(Duration::from_secs(5))
            .with_push_batch_size(25)
            .with_request_timeout(Duration::from_secs(10));

        assert!(config.is_enabled());
        assert_eq!(config.base_url(), "https://ledger.example.com");
        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(config.push_batch_size, 25);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn blank_values_disable_sync() {
        assert!(!SyncConfig::new("", "k3y").is_enabled());
        assert!(!SyncConfig::new("https://ledger.example.com", "  ").is_enabled());
    }
}
