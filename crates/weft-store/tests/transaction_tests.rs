// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::expect_used)]
//! Transaction lifecycle: abort, conflicts, optimistic layers.

use serde_json::json;
use weft_dry_tests::{
    add_item_mutation, add_item_response, commit_feed_page, feed_node_ids, feed_page,
    feed_range_add, variables, PageFlags, StoreTestBuilder,
};
use weft_store::{
    apply_optimistic_payload, CommitRequest, DataId, RangeBehavior, RecordStatus, StoreError,
};

#[test]
fn abort_leaves_store_byte_identical() {
    let mut store = StoreTestBuilder::new()
        .with_record("item:1", "Item")
        .with_value("item:1", "title", json!("first"))
        .build()
        .expect("seed");
    let before_source = store.source().clone();
    let before_snapshot = store.snapshot();

    let tx = store.begin().expect("begin");
    {
        let mut proxy = store.proxy(tx).expect("proxy");
        proxy
            .set_value(&DataId::new("item:1"), "title", None, json!("changed"))
            .expect("write");
        proxy
            .create(&DataId::new("item:2"), "Item")
            .expect("create");
        proxy.delete(&DataId::new("item:1")).expect("delete");
    }
    store.abort(tx).expect("abort");

    assert_eq!(store.source(), &before_source);
    assert_eq!(store.snapshot(), before_snapshot);
    assert_eq!(store.status("item:2"), RecordStatus::Unknown);
    assert_eq!(store.live_tx(), None);
}

#[test]
fn reads_outside_a_transaction_see_committed_state_only() {
    let mut store = StoreTestBuilder::new()
        .with_record("item:1", "Item")
        .build()
        .expect("seed");
    let tx = store.begin().expect("begin");
    store
        .proxy(tx)
        .expect("proxy")
        .set_value(&DataId::new("item:1"), "title", None, json!("draft"))
        .expect("write");
    assert_eq!(store.get("item:1").and_then(|r| r.value("title")), None);
    assert_eq!(
        store.begin(),
        Err(StoreError::TransactionConflict { live: tx })
    );

    let receipt = store.commit(tx).expect("commit");
    assert_eq!(receipt.updated_ids, vec![DataId::new("item:1")]);
    assert_eq!(receipt.snapshot, store.snapshot());
    assert_eq!(
        store.get("item:1").and_then(|r| r.value("title")),
        Some(&json!("draft"))
    );
}

#[test]
fn optimistic_revert_restores_prior_snapshot_hash() {
    let mut store = StoreTestBuilder::new().build().expect("store");
    commit_feed_page(
        &mut store,
        &variables(json!({"first": 2})),
        &feed_page(&[("A", "a")], PageFlags::default()),
    )
    .expect("seed feed");
    let before = store.snapshot();

    let mutation = add_item_mutation();
    let response = add_item_response("n1", "1");
    let configs = [feed_range_add(RangeBehavior::Append)];
    let report = apply_optimistic_payload(
        &mut store,
        CommitRequest::new(&mutation, &variables(json!({})), &response).with_configs(&configs),
    )
    .expect("optimistic");
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(feed_node_ids(store.source()), ["A", "n1"]);
    assert_eq!(feed_node_ids(store.base_source()), ["A"]);

    let id = report.receipt.optimistic.expect("layer id");
    assert_eq!(store.optimistic_updates(), vec![id]);
    let reverted = store.revert_optimistic(id).expect("revert");
    assert_eq!(reverted.hash, before.hash);
    assert_eq!(reverted.parent, Some(report.receipt.snapshot.hash));
    assert_eq!(feed_node_ids(store.source()), ["A"]);
    assert_eq!(
        store.revert_optimistic(id),
        Err(StoreError::UnknownOptimisticUpdate(id))
    );
}

#[test]
fn server_commits_rebase_under_optimistic_layers() {
    let mut store = StoreTestBuilder::new()
        .with_record("item:1", "Item")
        .build()
        .expect("seed");
    let item = DataId::new("item:1");
    let (_, optimistic) = store
        .apply_optimistic_update(|proxy| {
            proxy.set_value(&item, "liked", None, json!(true))?;
            Ok::<_, StoreError>(())
        })
        .expect("optimistic");
    store
        .update(|proxy| {
            proxy.set_value(&item, "title", None, json!("server"))?;
            Ok::<_, StoreError>(())
        })
        .expect("server");

    let visible = store.get("item:1").expect("visible");
    assert_eq!(visible.value("liked"), Some(&json!(true)));
    assert_eq!(visible.value("title"), Some(&json!("server")));

    store
        .revert_optimistic(optimistic.optimistic.expect("layer"))
        .expect("revert");
    let visible = store.get("item:1").expect("visible");
    assert_eq!(visible.value("liked"), None);
    assert_eq!(visible.value("title"), Some(&json!("server")));
}
