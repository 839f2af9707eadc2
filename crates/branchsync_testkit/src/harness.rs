//! In-process edge/cloud harness.
//!
//! Wires any number of edge engines to one [`CloudServer`] through loopback
//! HTTP clients. Both sides keep their records in [`FlakyStore`]-wrapped
//! memory stores, so tests can partition an edge from the network or make
//! individual writes fail on either side.

use crate::faults::FlakyStore;
use branchsync_engine::{
    HttpProbe, HttpTransport, LoopbackClient, SyncConfig, SyncCycleResult, SyncEngine,
};
use branchsync_protocol::{endpoints, Branch, RecordId, Transaction};
use branchsync_server::{CloudServer, ServerConfig};
use branchsync_store::{MemoryStore, RecordStore};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Loopback link from an edge to the shared cloud server.
pub type CloudLink = Arc<LoopbackClient<Arc<CloudServer>>>;

/// Store type used on both sides of the harness.
pub type HarnessStore = FlakyStore<MemoryStore>;

/// Engine type used by harness edges.
pub type EdgeEngine = SyncEngine<HttpTransport<CloudLink>, HttpProbe<CloudLink>, HarnessStore>;

/// One edge node in the harness.
pub struct EdgeNode {
    /// The edge engine.
    pub engine: Arc<EdgeEngine>,
    /// The edge's local store.
    pub store: Arc<HarnessStore>,
    /// The edge's link to the cloud; toggle reachability here.
    pub link: CloudLink,
}

impl EdgeNode {
    /// Runs one sync cycle.
    pub async fn sync(&self) -> SyncCycleResult {
        self.engine.sync().await
    }

    /// Cuts the edge off from the cloud, or reconnects it.
    pub fn set_partitioned(&self, partitioned: bool) {
        self.link.set_reachable(!partitioned);
    }

    /// Records a transaction locally, as a CRUD handler would.
    pub fn record(&self, transaction: &Transaction) {
        self.store
            .insert_transaction(transaction)
            .expect("Failed to insert transaction");
    }

    /// Records a branch locally, as a CRUD handler would.
    pub fn open_branch(&self, branch: &Branch) {
        self.store
            .insert_branch(branch)
            .expect("Failed to insert branch");
    }
}

/// A cloud server with any number of edges attached.
pub struct SyncHarness {
    /// The cloud server.
    pub server: Arc<CloudServer>,
    /// The cloud store.
    pub cloud_store: Arc<HarnessStore>,
    edges: Vec<EdgeNode>,
    edge_config: SyncConfig,
}

impl SyncHarness {
    /// Creates a harness with an open (unauthenticated) cloud.
    pub fn new() -> Self {
        Self::with_server_config(ServerConfig::new())
    }

    /// Creates a harness with the given cloud configuration.
    pub fn with_server_config(config: ServerConfig) -> Self {
        let cloud_store = Arc::new(FlakyStore::new(MemoryStore::new()));
        let server = Arc::new(CloudServer::new(config, cloud_store.clone()));
        Self {
            server,
            cloud_store,
            edges: Vec::new(),
            edge_config: SyncConfig::new("http://cloud.local", "harness-key"),
        }
    }

    /// Sets the push batch size used by edges added afterwards.
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.edge_config = self.edge_config.with_push_batch_size(size);
        self
    }

    /// Adds an edge that presents `key` to the cloud. Returns its index.
    pub fn add_edge_with_key(&mut self, key: &str) -> usize {
        let link: CloudLink = Arc::new(LoopbackClient::new(Arc::clone(&self.server)));
        let store = Arc::new(FlakyStore::new(MemoryStore::new()));
        let config = self.edge_config.clone();
        let base = config.base_url().to_string();
        let transport = HttpTransport::new(base.clone(), key, Arc::clone(&link));
        let probe = HttpProbe::new(base, endpoints::HEALTH, Arc::clone(&link));
        let engine = SyncEngine::new(config, transport, probe, Arc::clone(&store));

        self.edges.push(EdgeNode {
            engine: Arc::new(engine),
            store,
            link,
        });
        self.edges.len() - 1
    }

    /// Adds an edge with the default key. Returns its index.
    pub fn add_edge(&mut self) -> usize {
        self.add_edge_with_key("harness-key")
    }

    /// Returns edge `index`.
    ///
    /// # Panics
    ///
    /// Panics if no such edge was added.
    pub fn edge(&self, index: usize) -> &EdgeNode {
        &self.edges[index]
    }

    /// Returns all edges.
    pub fn edges(&self) -> &[EdgeNode] {
        &self.edges
    }

    /// Runs one cycle on every edge, in order.
    pub async fn sync_all(&self) -> Vec<SyncCycleResult> {
        let mut results = Vec::with_capacity(self.edges.len());
        for edge in &self.edges {
            results.push(edge.sync().await);
        }
        results
    }

    /// Runs `rounds` cycles on every edge.
    pub async fn sync_rounds(&self, rounds: usize) {
        for _ in 0..rounds {
            self.sync_all().await;
        }
    }
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Ledger contents keyed by identity, with reconciliation state stripped.
///
/// Two nodes have converged when their snapshots are equal.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    /// Branches by id.
    pub branches: BTreeMap<RecordId, Branch>,
    /// Transactions by id.
    pub transactions: BTreeMap<RecordId, Transaction>,
}

impl LedgerSnapshot {
    /// Takes a snapshot of everything in `store`.
    pub fn of<S: RecordStore + ?Sized>(store: &S) -> Self {
        let branches = store
            .branches_after(None)
            .expect("Failed to read branches")
            .into_iter()
            .map(|mut b| {
                b.is_synced = false;
                b.synced_at = None;
                (b.id, b)
            })
            .collect();
        let transactions = store
            .transactions_after(None)
            .expect("Failed to read transactions")
            .into_iter()
            .map(|mut t| {
                t.is_synced = false;
                t.synced_at = None;
                (t.id, t)
            })
            .collect();
        Self {
            branches,
            transactions,
        }
    }

    /// Total records in the snapshot.
    pub fn len(&self) -> usize {
        self.branches.len() + self.transactions.len()
    }

    /// Returns true if the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{branch, sale};

    #[tokio::test]
    async fn test_harness_round_trip() {
        let mut harness = SyncHarness::new();
        let a = harness.add_edge();
        let b = harness.add_edge();

        let shop = branch("DAPUR");
        harness.edge(a).open_branch(&shop);
        harness.edge(a).record(&sale(shop.id, 10.0));

        harness.sync_rounds(2).await;

        let cloud = LedgerSnapshot::of(harness.cloud_store.as_ref());
        assert_eq!(cloud.len(), 2);
        assert_eq!(LedgerSnapshot::of(harness.edge(a).store.as_ref()), cloud);
        assert_eq!(LedgerSnapshot::of(harness.edge(b).store.as_ref()), cloud);
    }
}
