//! Property tests for push idempotence, pull monotonicity and edge/cloud
//! convergence.

use branchsync_protocol::{now, PullQuery, PushRequest, RecordId, SyncRecord};
use branchsync_server::{CloudServer, ServerConfig};
use branchsync_store::{MemoryStore, RecordStore};
use branchsync_testkit::prelude::*;
use chrono::Duration;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn cloud() -> (CloudServer, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (CloudServer::new(ServerConfig::new(), store.clone()), store)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn push_twice_equals_push_once((branches, transactions) in ledger_strategy(3, 5)) {
        let (server, store) = cloud();
        let request = PushRequest::new(branches, transactions);

        let first = server.handler().handle_push(None, request.clone()).unwrap();
        let once = LedgerSnapshot::of(store.as_ref());
        let second = server.handler().handle_push(None, request).unwrap();
        let twice = LedgerSnapshot::of(store.as_ref());

        prop_assert_eq!(once, twice);
        prop_assert_eq!(first.synced_branch_ids, second.synced_branch_ids);
        prop_assert_eq!(first.synced_transaction_ids, second.synced_transaction_ids);
    }

    #[test]
    fn later_cutoff_returns_subset(
        (branches, transactions) in ledger_strategy(3, 8),
        earlier in 0i64..8 * 24 * 3600,
        gap in 0i64..24 * 3600,
    ) {
        let (server, store) = cloud();
        for branch in &branches {
            store.upsert_branch(branch).unwrap();
        }
        for tx in &transactions {
            store.upsert_transaction(tx).unwrap();
        }

        let t1 = now() - Duration::seconds(earlier);
        let t2 = t1 + Duration::seconds(gap);
        let wide = server.handler().handle_pull(PullQuery::new(Some(t1))).unwrap();
        let narrow = server.handler().handle_pull(PullQuery::new(Some(t2))).unwrap();

        let wide_ids: HashSet<RecordId> = wide
            .branches
            .iter()
            .map(|b| b.id)
            .chain(wide.transactions.iter().map(|t| t.id))
            .collect();
        for id in narrow.branches.iter().map(|b| b.id).chain(narrow.transactions.iter().map(|t| t.id)) {
            prop_assert!(wide_ids.contains(&id));
        }
        for tx in &narrow.transactions {
            prop_assert!(tx.mutated_at() > t2);
        }
    }

    #[test]
    fn edge_and_cloud_converge(
        (branches, transactions) in ledger_strategy(4, 4),
        overlap_every in 1usize..4,
    ) {
        let mut harness = SyncHarness::new();
        let edge = harness.add_edge();
        let edge_store = Arc::clone(&harness.edge(edge).store);
        let cloud_store = Arc::clone(&harness.cloud_store);

        // Split the ledger by owner: even branches live on the edge, odd
        // ones in the cloud.
        let edge_owners: HashSet<RecordId> =
            branches.iter().step_by(2).map(|b| b.id).collect();
        for branch in &branches {
            let target = if edge_owners.contains(&branch.id) { &edge_store } else { &cloud_store };
            target.insert_branch(branch).unwrap();
        }
        let mut overlapping = Vec::new();
        for (i, tx) in transactions.iter().enumerate() {
            if edge_owners.contains(&tx.branch_id) {
                edge_store.insert_transaction(tx).unwrap();
                if i % overlap_every == 0 {
                    // Same identity, different payload, already in the cloud.
                    let mut cloud_copy = tx.clone();
                    cloud_copy.amount += 1.0;
                    cloud_store.upsert_transaction(&cloud_copy).unwrap();
                    overlapping.push(cloud_copy);
                }
            } else {
                cloud_store.insert_transaction(tx).unwrap();
            }
        }

        let rt = runtime();
        for _ in 0..2 {
            let result = rt.block_on(harness.edge(edge).sync());
            prop_assert!(result.is_success(), "errors: {:?}", result.errors);
        }

        let at_edge = LedgerSnapshot::of(edge_store.as_ref());
        let at_cloud = LedgerSnapshot::of(cloud_store.as_ref());
        prop_assert_eq!(at_edge.len(), branches.len() + transactions.len());
        prop_assert_eq!(&at_edge, &at_cloud);
        prop_assert_eq!(edge_store.unreconciled_counts().unwrap().total(), 0);

        // The pull ran first, so the cloud's copy was the last write.
        for copy in &overlapping {
            prop_assert_eq!(at_edge.transactions[&copy.id].amount, copy.amount);
        }
    }
}
