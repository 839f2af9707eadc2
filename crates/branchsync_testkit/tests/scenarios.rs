//! End-to-end sync scenarios through the harness.

use branchsync_engine::SyncState;
use branchsync_protocol::{now, Branch, SyncRecord, Transaction, TransactionType};
use branchsync_store::RecordStore;
use branchsync_testkit::prelude::*;
use chrono::Duration;

#[tokio::test]
async fn unreconciled_transaction_is_pushed_and_reconciled() {
    let mut harness = SyncHarness::new();
    let edge = harness.add_edge();
    let a1 = Transaction::new(
        branch("DAPUR").id,
        TransactionType::In,
        "sales",
        500.0,
    );
    harness.edge(edge).record(&a1);

    let result = harness.edge(edge).sync().await;

    assert!(result.is_success(), "errors: {:?}", result.errors);
    let in_cloud = harness.cloud_store.get_transaction(a1.id).unwrap().unwrap();
    assert_eq!(in_cloud.amount, 500.0);
    assert_eq!(in_cloud.tx_type, TransactionType::In);
    assert!(harness.edge(edge).store.get_transaction(a1.id).unwrap().unwrap().is_reconciled());
}

#[tokio::test]
async fn cloud_write_failure_keeps_record_unreconciled() {
    let mut harness = SyncHarness::new();
    let edge = harness.add_edge();
    let owner = branch("DAPUR").id;
    let a1 = sale(owner, 500.0);
    harness.edge(edge).record(&a1);
    harness.cloud_store.fail_upserts_for(a1.id);

    let result = harness.edge(edge).sync().await;

    // The cycle itself succeeds; the record is simply not acknowledged.
    assert!(result.errors.is_empty());
    let push = result.push.unwrap();
    assert_eq!(push.sent, 1);
    assert_eq!(push.acknowledged, 0);
    assert_eq!(harness.edge(edge).engine.state(), SyncState::Degraded);
    assert!(!harness.edge(edge).store.get_transaction(a1.id).unwrap().unwrap().is_reconciled());
    assert!(harness.cloud_store.get_transaction(a1.id).unwrap().is_none());
}

#[tokio::test]
async fn failed_record_is_retried_while_the_rest_is_acknowledged() {
    let mut harness = SyncHarness::new();
    let edge = harness.add_edge();
    let owner = branch("DAPUR").id;
    let x = sale(owner, 1.0);
    let y = sale(owner, 2.0);
    harness.edge(edge).record(&x);
    harness.edge(edge).record(&y);
    harness.cloud_store.fail_upserts_for(x.id);

    let first = harness.edge(edge).sync().await;
    assert_eq!(first.push.unwrap().acknowledged, 1);
    let store = &harness.edge(edge).store;
    assert!(store.get_transaction(y.id).unwrap().unwrap().is_reconciled());
    assert!(!store.get_transaction(x.id).unwrap().unwrap().is_reconciled());

    harness.cloud_store.heal();
    let second = harness.edge(edge).sync().await;
    let push = second.push.unwrap();
    assert_eq!(push.sent, 1);
    assert_eq!(push.acknowledged, 1);
    assert!(store.get_transaction(x.id).unwrap().unwrap().is_reconciled());
    assert!(harness.cloud_store.get_transaction(x.id).unwrap().is_some());
    assert_eq!(harness.edge(edge).engine.state(), SyncState::Synced);
}

#[tokio::test]
async fn pull_applies_new_branch_and_advances_cutoff() {
    let mut harness = SyncHarness::new();
    let edge = harness.add_edge();
    let stored_cutoff = now() - Duration::hours(1);
    harness.edge(edge).store.set_sync_cutoff(stored_cutoff).unwrap();

    let b1 = Branch::new("DAPUR", "Dapur");
    harness.cloud_store.upsert_branch(&b1).unwrap();

    let result = harness.edge(edge).sync().await;

    let pull = result.pull.unwrap();
    assert_eq!(pull.applied, 1);
    assert!(pull.cutoff_advanced);
    let local = harness.edge(edge).store.get_branch(b1.id).unwrap().unwrap();
    assert_eq!(local.code, "DAPUR");
    assert!(local.is_reconciled());

    let advanced = harness.edge(edge).store.sync_cutoff().unwrap().unwrap();
    assert!(advanced > stored_cutoff);
    assert!(advanced >= b1.created_at);
}

#[tokio::test]
async fn records_before_the_cutoff_are_not_pulled() {
    let mut harness = SyncHarness::new();
    let edge = harness.add_edge();
    harness.edge(edge).store.set_sync_cutoff(now()).unwrap();

    let old = branch_created_at(branch("LAMA"), now() - Duration::days(1));
    harness.cloud_store.upsert_branch(&old).unwrap();

    let result = harness.edge(edge).sync().await;
    assert_eq!(result.pull.unwrap().received, 0);
    assert!(harness.edge(edge).store.get_branch(old.id).unwrap().is_none());
}

#[tokio::test]
async fn offline_cycle_writes_nothing() {
    let mut harness = SyncHarness::new();
    let edge = harness.add_edge();
    let node = harness.edge(edge);
    node.record(&sale(branch("DAPUR").id, 9.0));
    harness.cloud_store.upsert_branch(&branch("GUDANG")).unwrap();

    node.set_partitioned(true);
    let before = node.store.write_counts();
    let cloud_before = harness.cloud_store.write_counts();

    let result = node.sync().await;

    assert!(!result.online);
    assert_eq!(node.store.write_counts(), before);
    assert_eq!(harness.cloud_store.write_counts(), cloud_before);
    assert_eq!(node.link.request_count(), 0);
    assert_eq!(node.engine.stats().offline_cycles, 1);
    assert_eq!(node.store.unreconciled_counts().unwrap().transactions, 1);

    node.set_partitioned(false);
    assert!(node.sync().await.is_success());
    assert_eq!(node.store.unreconciled_counts().unwrap().total(), 0);
}

#[tokio::test]
async fn local_edit_propagates_to_other_edges() {
    let mut harness = SyncHarness::new();
    let a = harness.add_edge();
    let b = harness.add_edge();

    let mut shop = branch("DAPUR");
    harness.edge(a).open_branch(&shop);
    harness.sync_rounds(1).await;
    assert!(harness.edge(b).store.get_branch(shop.id).unwrap().is_some());

    // Keep the edit clear of the cutoffs taken in the round above.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    shop.name = "Dapur Utama".into();
    shop.touch();
    harness.edge(a).store.upsert_branch(&shop).unwrap();

    harness.sync_rounds(1).await;

    let at_b = harness.edge(b).store.get_branch(shop.id).unwrap().unwrap();
    assert_eq!(at_b.name, "Dapur Utama");
    assert_eq!(
        LedgerSnapshot::of(harness.edge(a).store.as_ref()),
        LedgerSnapshot::of(harness.edge(b).store.as_ref())
    );
}

#[tokio::test]
async fn push_is_split_across_cycles_by_batch_size() {
    let mut harness = SyncHarness::new().with_push_batch_size(2);
    let edge = harness.add_edge();
    let owner = branch("DAPUR").id;
    for amount in 1..=5 {
        harness.edge(edge).record(&sale(owner, amount as f64));
    }

    let sent: Vec<usize> = {
        let mut sent = Vec::new();
        for _ in 0..4 {
            sent.push(harness.edge(edge).sync().await.push.unwrap().sent);
        }
        sent
    };

    assert_eq!(sent, vec![2, 2, 1, 0]);
    assert_eq!(harness.cloud_store.inner().transaction_count(), 5);
}

#[tokio::test]
async fn unappliable_pull_does_not_hold_back_the_cutoff() {
    let mut harness = SyncHarness::new();
    let edge = harness.add_edge();
    let node = harness.edge(edge);

    // Cloud and edge each opened a "DAPUR" branch of their own.
    harness.cloud_store.upsert_branch(&branch("DAPUR")).unwrap();
    node.open_branch(&branch("DAPUR"));
    let mut shop = branch("SHOP");
    node.open_branch(&shop);

    let first = node.sync().await;
    let pull = first.pull.unwrap();
    assert_eq!((pull.received, pull.failed), (1, 1));
    assert!(pull.cutoff_advanced);
    assert!(node.store.sync_cutoff().unwrap().is_some());
    assert_eq!(first.push.unwrap().acknowledged, 1);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    shop.name = "Shop Renamed".into();
    shop.touch();
    node.store.upsert_branch(&shop).unwrap();

    let second = node.sync().await;
    assert_eq!(second.pull.unwrap().received, 0);
    // The renamed branch goes out; the clashing one is turned down again.
    let push = second.push.unwrap();
    assert_eq!((push.sent, push.acknowledged), (2, 1));

    let in_cloud = harness.cloud_store.get_branch(shop.id).unwrap().unwrap();
    assert_eq!(in_cloud.name, "Shop Renamed");
    let local = node.store.get_branch(shop.id).unwrap().unwrap();
    assert_eq!(local.name, "Shop Renamed");
    assert!(local.is_reconciled());
}

#[tokio::test]
async fn edit_during_push_goes_out_next_cycle() {
    let mut harness = SyncHarness::new();
    let edge = harness.add_edge();
    let node = harness.edge(edge);
    let shop = branch("DAPUR");
    node.open_branch(&shop);

    // A CRUD write lands on the edge while the cloud is storing the push.
    let mut edited = shop.clone();
    edited.name = "Edited mid-push".into();
    edited.touch();
    let edge_store = std::sync::Arc::clone(&node.store);
    let target = shop.id;
    harness.cloud_store.on_upsert(move |id| {
        if id == target {
            edge_store.upsert_branch(&edited).unwrap();
        }
    });

    let first = node.sync().await.push.unwrap();
    assert_eq!((first.sent, first.acknowledged, first.superseded), (1, 1, 1));
    assert_eq!(
        harness.cloud_store.get_branch(shop.id).unwrap().unwrap().name,
        shop.name
    );
    assert!(!node.store.get_branch(shop.id).unwrap().unwrap().is_reconciled());

    harness.cloud_store.heal();
    let second = node.sync().await.push.unwrap();
    assert_eq!((second.sent, second.acknowledged, second.superseded), (1, 1, 0));
    assert_eq!(
        harness.cloud_store.get_branch(shop.id).unwrap().unwrap().name,
        "Edited mid-push"
    );
    assert_eq!(node.store.unreconciled_counts().unwrap().total(), 0);
}
