// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::expect_used, clippy::panic)]
//! Normalization through the commit pipeline: idempotence, reads, strictness.

use serde_json::{json, Value};
use weft_dry_tests::{commit_feed_page, feed_page, feed_query, variables, PageFlags};
use weft_ir::{Argument, LinkedField, Operation, ScalarField, Selection, Variables};
use weft_store::{
    commit_payload, CommitError, CommitRequest, DataId, NormalizeError, PayloadErrorKind,
    RecordStatus, Selector, Store, StoreConfig, Strictness,
};

fn scalar(name: &str) -> Selection {
    Selection::ScalarField(ScalarField::new(name))
}

fn profile_query() -> Operation {
    let friends = LinkedField::plural("friends", vec![scalar("id"), scalar("name")])
        .with_concrete_type("User")
        .with_args(vec![Argument::literal("first", json!(2))]);
    let viewer = LinkedField::new(
        "viewer",
        vec![
            scalar("id"),
            scalar("name"),
            scalar("email"),
            Selection::LinkedField(friends),
        ],
    )
    .with_concrete_type("User");
    Operation::new("ProfileQuery", vec![Selection::LinkedField(viewer)])
}

fn profile_payload() -> Value {
    json!({
        "viewer": {
            "id": "user:1",
            "name": "Ada",
            "email": "ada@example.com",
            "friends": [
                {"id": "user:2", "name": "Grace"},
                null,
                {"id": "user:3", "name": "Edsger"}
            ]
        }
    })
}

fn commit(store: &mut Store, op: &Operation, payload: &Value) -> Result<(), CommitError> {
    commit_payload(store, CommitRequest::new(op, &Variables::new(), payload)).map(|_| ())
}

#[test]
fn normalizing_the_same_response_twice_is_idempotent() {
    let mut store = Store::default();
    let op = profile_query();
    commit(&mut store, &op, &profile_payload()).expect("first");
    let first = store.snapshot();
    let records = store.source().clone();

    commit(&mut store, &op, &profile_payload()).expect("second");
    assert_eq!(store.snapshot().hash, first.hash);
    assert_eq!(store.snapshot().parent, Some(first.hash));
    assert_eq!(store.source(), &records);
}

#[test]
fn plural_links_keep_order_and_nulls() {
    let mut store = Store::default();
    commit(&mut store, &profile_query(), &profile_payload()).expect("commit");
    let viewer = store.get("user:1").expect("viewer");
    let friends: Vec<Option<&str>> = viewer
        .linked_ids("friends(first:2)")
        .expect("friends")
        .iter()
        .map(|id| id.as_ref().map(DataId::as_str))
        .collect();
    assert_eq!(friends, [Some("user:2"), None, Some("user:3")]);
}

#[test]
fn reading_a_sub_selection_yields_exactly_those_fields() {
    let mut store = Store::default();
    commit(&mut store, &profile_query(), &profile_payload()).expect("commit");

    let selector = Selector::new(
        DataId::new("user:1"),
        vec![scalar("name")],
        Variables::new(),
    );
    let snapshot = store.lookup(&selector);
    assert_eq!(snapshot.data, json!({"name": "Ada"}));
    assert!(!snapshot.is_missing_data);
    assert_eq!(
        snapshot.seen_records.iter().map(DataId::as_str).collect::<Vec<_>>(),
        ["user:1"]
    );

    let whole = store.lookup(&Selector::for_operation(&profile_query(), &Variables::new()));
    assert_eq!(whole.data, profile_payload());
}

#[test]
fn strict_mode_rejects_malformed_payloads_atomically() {
    let mut store = Store::default();
    let before = store.snapshot();
    let mut payload = profile_payload();
    payload["viewer"]["friends"] = json!("not a list");

    let err = commit(&mut store, &profile_query(), &payload).expect_err("strict rejects");
    match err {
        CommitError::Normalize(NormalizeError::Malformed(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].kind, PayloadErrorKind::ExpectedList);
            assert_eq!(errors[0].path, ["viewer", "friends"]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.status("user:1"), RecordStatus::Unknown);
}

#[test]
fn lenient_mode_keeps_sibling_data() {
    let mut store = Store::new(StoreConfig::with_strictness(Strictness::Lenient));
    let mut payload = profile_payload();
    payload["viewer"]["friends"][0] = json!({"name": "no id"});

    let report = commit_payload(
        &mut store,
        CommitRequest::new(&profile_query(), &Variables::new(), &payload),
    )
    .expect("lenient commit");
    assert_eq!(report.payload_errors.len(), 1);
    assert_eq!(report.payload_errors[0].kind, PayloadErrorKind::MissingIdentifier);

    let viewer = store.get("user:1").expect("viewer kept");
    assert_eq!(viewer.value("email"), Some(&json!("ada@example.com")));
    assert_eq!(
        store.get("user:3").and_then(|r| r.value("name")),
        Some(&json!("Edsger"))
    );
}

#[test]
fn feed_query_reads_back_through_the_connection_handle() {
    let mut store = Store::default();
    commit_feed_page(
        &mut store,
        &variables(json!({"first": 2})),
        &feed_page(&[("A", "a"), ("B", "b")], PageFlags { has_next: true, has_previous: false }),
    )
    .expect("commit");
    let read = store.lookup(&Selector::for_operation(&feed_query(), &variables(json!({"first": 2}))));
    let edges = read.data["viewer"]["items"]["edges"]
        .as_array()
        .expect("edges");
    let ids: Vec<&Value> = edges.iter().map(|edge| &edge["node"]["id"]).collect();
    assert_eq!(ids, [&json!("A"), &json!("B")]);
    assert_eq!(read.data["viewer"]["items"]["pageInfo"]["endCursor"], json!("b"));
    assert_eq!(read.data["viewer"]["items"]["pageInfo"]["hasNextPage"], json!(true));
}
