// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::expect_used)]
//! Subscriptions, retains, and garbage collection.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;
use weft_dry_tests::StoreTestBuilder;
use weft_ir::{ScalarField, Selection, Variables};
use weft_store::{DataId, Disposable, RecordStatus, Selector, Store, StoreError, ROOT_ID};

fn seeded() -> Store {
    StoreTestBuilder::new()
        .with_record("u1", "User")
        .with_value("u1", "name", json!("Ada"))
        .with_record("u2", "User")
        .with_value("u2", "name", json!("Grace"))
        .with_link(ROOT_ID, "viewer", "u1")
        .with_link("u1", "bestFriend", "u2")
        .with_record("orphan", "User")
        .build()
        .expect("seed store")
}

fn name_selector(id: &str) -> Selector {
    Selector::new(
        DataId::new(id),
        vec![Selection::ScalarField(ScalarField::new("name"))],
        Variables::new(),
    )
}

fn rename(store: &mut Store, id: &str, name: &str) {
    store
        .update(|proxy| proxy.set_value(&DataId::new(id), "name", None, json!(name)))
        .expect("rename");
}

#[test]
fn subscribers_hear_only_relevant_changes() {
    let mut store = seeded();
    let calls = Rc::new(Cell::new(0_u32));
    let snapshot = store.lookup(&name_selector("u1"));
    let seen = Rc::clone(&calls);
    let mut subscription = store.subscribe(snapshot, move |next| {
        assert_eq!(next.data, json!({"name": "Lovelace"}));
        seen.set(seen.get() + 1);
    });
    assert_eq!(store.subscription_count(), 1);

    rename(&mut store, "u2", "Hopper");
    assert_eq!(calls.get(), 0, "unrelated record");

    rename(&mut store, "u1", "Lovelace");
    assert_eq!(calls.get(), 1);

    rename(&mut store, "u1", "Lovelace");
    assert_eq!(calls.get(), 1, "same data is not a change");

    subscription.dispose();
    assert!(!subscription.is_active());
    assert_eq!(store.subscription_count(), 0);
    rename(&mut store, "u1", "Ada");
    assert_eq!(calls.get(), 1);
}

#[test]
fn optimistic_revert_notifies_with_restored_data() {
    let mut store = seeded();
    let names = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&names);
    let _subscription = store.subscribe(store.lookup(&name_selector("u1")), move |next| {
        sink.borrow_mut().push(next.data["name"].clone());
    });

    let (_, receipt) = store
        .apply_optimistic_update(|proxy| {
            proxy.set_value(&DataId::new("u1"), "name", None, json!("Pending"))
        })
        .expect("optimistic");
    store
        .revert_optimistic(receipt.optimistic.expect("layer id"))
        .expect("revert");
    assert_eq!(*names.borrow(), [json!("Pending"), json!("Ada")]);
}

#[test]
fn gc_removes_unreachable_records() {
    let mut store = seeded();
    let removed = store.gc().expect("gc");
    assert_eq!(removed, [DataId::new("orphan")]);
    assert_eq!(store.status("orphan"), RecordStatus::Unknown);
    assert_eq!(store.status("u2"), RecordStatus::Existent);
    assert!(store.gc().expect("second gc").is_empty());
}

#[test]
fn retained_records_survive_until_released() {
    let mut store = seeded();
    let mut handle = store.retain(DataId::new("orphan"));
    assert!(store.gc().expect("gc").is_empty());
    assert_eq!(store.status("orphan"), RecordStatus::Existent);

    handle.dispose();
    assert_eq!(store.gc().expect("gc"), [DataId::new("orphan")]);
}

#[test]
fn gc_waits_for_optimistic_layers() {
    let mut store = seeded();
    let (_, receipt) = store
        .apply_optimistic_update(|proxy| {
            proxy.set_value(&DataId::new("u1"), "name", None, json!("Pending"))
        })
        .expect("optimistic");
    assert_eq!(
        store.gc(),
        Err(StoreError::GcBlocked("optimistic updates applied"))
    );
    store
        .revert_optimistic(receipt.optimistic.expect("layer id"))
        .expect("revert");
    assert_eq!(store.gc().expect("gc"), [DataId::new("orphan")]);
}
