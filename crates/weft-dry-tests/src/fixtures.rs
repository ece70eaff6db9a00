// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Operation and payload fixtures around a paginated item feed.
//!
//! ```graphql
//! query FeedQuery($first: Int, $after: String, $last: Int, $before: String) {
//!   viewer {
//!     id
//!     items(first: $first, after: $after, last: $last, before: $before)
//!       @connection(key: "Feed_items") {
//!       edges { cursor node { id title } }
//!       pageInfo { endCursor hasNextPage startCursor hasPreviousPage }
//!     }
//!   }
//! }
//! ```

use serde_json::{json, Value};
use weft_ir::{
    Argument, ArgumentDefinition, HandleField, LinkedField, LocalArgument, Operation,
    ScalarField, Selection, Variables,
};
use weft_store::{
    commit_payload, generate_client_id, CommitError, CommitReport, CommitRequest, ConnectionInfo,
    DataId, DeletedIdField, MutationConfig, RangeBehavior, RecordSource, Store, CONNECTION_HANDLE,
};

/// Connection key of the feed.
pub const FEED_CONNECTION_KEY: &str = "Feed_items";
/// Server id of the viewer record.
pub const VIEWER_ID: &str = "viewer:1";

const PAGE_ARGS: [&str; 4] = ["first", "after", "last", "before"];

fn scalar(name: &str) -> Selection {
    Selection::ScalarField(ScalarField::new(name))
}

fn item_edge_selections() -> Vec<Selection> {
    vec![
        scalar("cursor"),
        Selection::LinkedField(
            LinkedField::new("node", vec![scalar("id"), scalar("title")])
                .with_concrete_type("Item"),
        ),
    ]
}

/// Selections of one `Item` edge.
pub fn item_edge_field(name: &str) -> LinkedField {
    LinkedField::new(name, item_edge_selections()).with_concrete_type("ItemEdge")
}

/// The feed query.
pub fn feed_query() -> Operation {
    let page_args: Vec<Argument> = PAGE_ARGS
        .iter()
        .map(|name| Argument::variable(*name, *name))
        .collect();
    let items = LinkedField::new(
        "items",
        vec![
            Selection::LinkedField(
                LinkedField::plural("edges", item_edge_selections())
                    .with_concrete_type("ItemEdge"),
            ),
            Selection::LinkedField(
                LinkedField::new(
                    "pageInfo",
                    vec![
                        scalar("endCursor"),
                        scalar("hasNextPage"),
                        scalar("startCursor"),
                        scalar("hasPreviousPage"),
                    ],
                )
                .with_concrete_type("PageInfo"),
            ),
        ],
    )
    .with_concrete_type("ItemConnection")
    .with_args(page_args.clone());
    let handle = HandleField::new("items", CONNECTION_HANDLE, FEED_CONNECTION_KEY)
        .with_args(page_args)
        .with_filters(Vec::new());
    let viewer = LinkedField::new(
        "viewer",
        vec![
            scalar("id"),
            Selection::LinkedField(items),
            Selection::LinkedHandle(handle),
        ],
    )
    .with_concrete_type("User");
    let definitions = PAGE_ARGS
        .iter()
        .map(|name| {
            ArgumentDefinition::LocalArgument(LocalArgument {
                name: (*name).to_owned(),
                type_name: match *name {
                    "first" | "last" => "Int",
                    _ => "String",
                }
                .to_owned(),
                default_value: Value::Null,
            })
        })
        .collect();
    Operation::new("FeedQuery", vec![Selection::LinkedField(viewer)])
        .with_argument_definitions(definitions)
}

/// Variables from a JSON object; anything else yields an empty map.
pub fn variables(value: Value) -> Variables {
    match value {
        Value::Object(map) => map,
        _ => Variables::new(),
    }
}

/// Page flags of a feed payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageFlags {
    /// `hasNextPage`.
    pub has_next: bool,
    /// `hasPreviousPage`.
    pub has_previous: bool,
}

/// Feed payload holding `items` as `(node id, cursor)` pairs.
pub fn feed_page(items: &[(&str, &str)], flags: PageFlags) -> Value {
    let edges: Vec<Value> = items
        .iter()
        .map(|(id, cursor)| {
            json!({"cursor": cursor, "node": {"id": id, "title": format!("Item {id}")}})
        })
        .collect();
    json!({
        "viewer": {
            "id": VIEWER_ID,
            "items": {
                "edges": edges,
                "pageInfo": {
                    "startCursor": items.first().map(|(_, cursor)| *cursor),
                    "endCursor": items.last().map(|(_, cursor)| *cursor),
                    "hasNextPage": flags.has_next,
                    "hasPreviousPage": flags.has_previous,
                }
            }
        }
    })
}

/// Client connection the handler maintains for the viewer's feed.
pub fn feed_connection_id() -> DataId {
    generate_client_id(
        &DataId::new(VIEWER_ID),
        &format!("__{FEED_CONNECTION_KEY}_{CONNECTION_HANDLE}"),
        None,
    )
}

/// Node ids of the feed's client connection, in edge order.
pub fn feed_node_ids(source: &RecordSource) -> Vec<String> {
    let Some(connection) = source.get(feed_connection_id().as_str()) else {
        return Vec::new();
    };
    connection
        .linked_ids("edges")
        .unwrap_or_default()
        .iter()
        .flatten()
        .filter_map(|edge| source.get(edge.as_str())?.linked_id("node"))
        .map(ToString::to_string)
        .collect()
}

/// Feed page info cursors as `(startCursor, endCursor)`.
pub fn feed_cursors(source: &RecordSource) -> (Option<String>, Option<String>) {
    let page_info = source
        .get(feed_connection_id().as_str())
        .and_then(|conn| conn.linked_id("pageInfo"))
        .and_then(|id| source.get(id.as_str()));
    let cursor = |key: &str| {
        page_info
            .and_then(|record| record.value(key))
            .and_then(Value::as_str)
            .map(str::to_owned)
    };
    (cursor("startCursor"), cursor("endCursor"))
}

/// Commits one feed page fetched with `vars`.
pub fn commit_feed_page(
    store: &mut Store,
    vars: &Variables,
    payload: &Value,
) -> Result<CommitReport, CommitError> {
    let query = feed_query();
    commit_payload(store, CommitRequest::new(&query, vars, payload))
}

/// `mutation { addItem { itemEdge { cursor node { id title } } } }`
pub fn add_item_mutation() -> Operation {
    let add_item = LinkedField::new(
        "addItem",
        vec![Selection::LinkedField(item_edge_field("itemEdge"))],
    )
    .with_concrete_type("AddItemPayload");
    Operation::new("AddItemMutation", vec![Selection::LinkedField(add_item)])
}

/// Response of [`add_item_mutation`].
pub fn add_item_response(node_id: &str, cursor: &str) -> Value {
    json!({
        "addItem": {
            "itemEdge": {
                "cursor": cursor,
                "node": {"id": node_id, "title": format!("Item {node_id}")}
            }
        }
    })
}

/// `mutation { removeItem { deletedId } }`
pub fn remove_item_mutation() -> Operation {
    let remove_item = LinkedField::new("removeItem", vec![scalar("deletedId")])
        .with_concrete_type("RemoveItemPayload");
    Operation::new("RemoveItemMutation", vec![Selection::LinkedField(remove_item)])
}

/// Response of [`remove_item_mutation`].
pub fn remove_item_response(node_id: &str) -> Value {
    json!({"removeItem": {"deletedId": node_id}})
}

/// `RANGE_ADD` of `itemEdge` into the viewer's feed.
pub fn feed_range_add(behavior: RangeBehavior) -> MutationConfig {
    MutationConfig::RangeAdd {
        parent_id: Some(DataId::new(VIEWER_ID)),
        connection_info: vec![ConnectionInfo {
            key: FEED_CONNECTION_KEY.to_owned(),
            range_behavior: behavior,
            filters: None,
        }],
        edge_name: "itemEdge".to_owned(),
    }
}

/// `RANGE_DELETE` of `deletedId` from the viewer's feed.
pub fn feed_range_delete() -> MutationConfig {
    MutationConfig::RangeDelete {
        parent_id: Some(DataId::new(VIEWER_ID)),
        connection_keys: vec![ConnectionInfo {
            key: FEED_CONNECTION_KEY.to_owned(),
            range_behavior: RangeBehavior::Append,
            filters: None,
        }],
        path_to_connection: vec!["viewer".to_owned(), "items".to_owned()],
        deleted_id_field_name: DeletedIdField::Name("deletedId".to_owned()),
    }
}

/// `NODE_DELETE` of `deletedId`.
pub fn node_delete() -> MutationConfig {
    MutationConfig::NodeDelete {
        deleted_id_field_name: "deletedId".to_owned(),
    }
}
