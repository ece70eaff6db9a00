// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::expect_used)]
//! Paging a connection forward through the store.

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::{json, Value};
use weft_dry_tests::{
    commit_feed_page, feed_connection_id, feed_cursors, feed_node_ids, feed_page, variables,
    PageFlags,
};
use weft_store::{ConnectionInterface, ConnectionMetadata, Direction, PageInfo, Store};

fn feed_metadata() -> ConnectionMetadata {
    ConnectionMetadata {
        path: vec!["viewer".into(), "items".into()],
        direction: Direction::Forward,
        cursor: "after".into(),
        count: "first".into(),
    }
}

fn page_info(store: &Store) -> PageInfo {
    PageInfo::read(
        store.source(),
        feed_connection_id().as_str(),
        &ConnectionInterface::default(),
    )
    .expect("feed page info")
}

#[test]
fn load_more_walks_until_exhausted() {
    let mut store = Store::default();
    let pages: [(&[(&str, &str)], bool); 3] = [
        (&[("A", "a"), ("B", "b")], true),
        (&[("C", "c"), ("D", "d")], true),
        (&[("E", "e")], false),
    ];
    let metadata = feed_metadata();
    let mut vars = variables(json!({"first": 2}));
    for (index, (items, has_next)) in pages.iter().enumerate() {
        let flags = PageFlags {
            has_next: *has_next,
            has_previous: index > 0,
        };
        let report = commit_feed_page(&mut store, &vars, &feed_page(items, flags))
            .expect("commit page");
        assert!(report.is_clean(), "{report:?}");

        let info = page_info(&store);
        match metadata.next_page_variables(&info, &vars, 2) {
            Some(next) => vars = next,
            None => {
                assert_eq!(index, pages.len() - 1, "exhausted early");
                break;
            }
        }
    }
    assert_eq!(feed_node_ids(store.source()), ["A", "B", "C", "D", "E"]);
    let info = page_info(&store);
    assert_eq!(info.start_cursor.as_deref(), Some("a"));
    assert_eq!(info.end_cursor.as_deref(), Some("e"));
    assert!(!info.has_more(Direction::Forward));
}

#[test]
fn next_page_variables_carry_the_end_cursor() {
    let mut store = Store::default();
    commit_feed_page(
        &mut store,
        &variables(json!({"first": 2})),
        &feed_page(&[("A", "a"), ("B", "b")], PageFlags { has_next: true, has_previous: false }),
    )
    .expect("first page");
    let next = feed_metadata()
        .next_page_variables(&page_info(&store), &variables(json!({"first": 2})), 5)
        .map(Value::Object);
    assert_eq!(next, Some(json!({"first": 5, "after": "b"})));
}

fn page_strategy() -> impl Strategy<Value = Vec<BTreeSet<u8>>> {
    prop::collection::vec(prop::collection::btree_set(0_u8..8, 1..4), 1..5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn appended_pages_keep_nodes_unique_in_arrival_order(pages in page_strategy()) {
        let mut store = Store::default();
        let mut expected: Vec<String> = Vec::new();
        for (index, page) in pages.iter().enumerate() {
            let items: Vec<(String, String)> =
                page.iter().map(|n| (format!("N{n}"), format!("c{n}"))).collect();
            let borrowed: Vec<(&str, &str)> =
                items.iter().map(|(id, cursor)| (id.as_str(), cursor.as_str())).collect();
            let vars = if index == 0 {
                variables(json!({"first": 3}))
            } else {
                let (_, end) = feed_cursors(store.source());
                variables(json!({"first": 3, "after": end}))
            };
            let report = commit_feed_page(
                &mut store,
                &vars,
                &feed_page(&borrowed, PageFlags { has_next: true, has_previous: index > 0 }),
            )
            .expect("commit page");
            prop_assert!(report.handler_errors.is_empty(), "{:?}", report.handler_errors);
            for (id, _) in &items {
                if !expected.contains(id) {
                    expected.push(id.clone());
                }
            }
        }
        prop_assert_eq!(feed_node_ids(store.source()), expected);
    }
}
