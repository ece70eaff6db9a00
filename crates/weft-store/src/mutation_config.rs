// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Declarative mutation configs (`NODE_DELETE`, `RANGE_ADD`, `RANGE_DELETE`).
//!
//! Configs run after normalization and field handlers, inside the same
//! transaction, and edit connections maintained by the
//! [`ConnectionHandler`]. Failures are collected, never fatal.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use weft_ir::Variables;

use crate::connection::ConnectionHandler;
use crate::handler::HandlerError;
use crate::ident::DataId;
use crate::proxy::RecordSourceProxy;

/// Where a `RANGE_ADD` places the new edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeBehavior {
    /// Insert at the tail.
    Append,
    /// Insert at the head.
    Prepend,
    /// Leave the connection alone.
    Ignore,
}

/// Connection addressed by key and filter arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Connection key from the `@connection` directive.
    pub key: String,
    /// Placement of added edges.
    pub range_behavior: RangeBehavior,
    /// Filter arguments narrowing the connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Variables>,
}

/// Location of deleted ids in a `RANGE_DELETE` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeletedIdField {
    /// Field of the root payload holding an id or a list of ids.
    Name(String),
    /// Path below the root payload to an object (or list of objects) with `id`.
    Path(Vec<String>),
}

/// One declarative store edit attached to a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MutationConfig {
    /// Deletes the records named by the root payload.
    #[serde(rename = "NODE_DELETE")]
    NodeDelete {
        /// Root payload field holding the id (or ids).
        #[serde(rename = "deletedIDFieldName")]
        deleted_id_field_name: String,
    },
    /// Inserts the root payload's edge into connections of `parent_id`.
    #[serde(rename = "RANGE_ADD")]
    RangeAdd {
        /// Record holding the connections; the root when absent.
        #[serde(rename = "parentID", default)]
        parent_id: Option<DataId>,
        /// Target connections.
        #[serde(rename = "connectionInfo")]
        connection_info: Vec<ConnectionInfo>,
        /// Root payload field holding the new edge.
        #[serde(rename = "edgeName")]
        edge_name: String,
    },
    /// Removes deleted nodes from connections reached via `path_to_connection`.
    #[serde(rename = "RANGE_DELETE")]
    RangeDelete {
        /// Record the path starts at; the root when absent.
        #[serde(rename = "parentID", default)]
        parent_id: Option<DataId>,
        /// Connections edited below the path.
        #[serde(rename = "connectionKeys")]
        connection_keys: Vec<ConnectionInfo>,
        /// Field names from the parent to the connection, parent first.
        #[serde(rename = "pathToConnection")]
        path_to_connection: Vec<String>,
        /// Where deleted ids sit in the response.
        #[serde(rename = "deletedIDFieldName")]
        deleted_id_field_name: DeletedIdField,
    },
}

impl MutationConfig {
    /// Wire name of the config kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeDelete { .. } => "NODE_DELETE",
            Self::RangeAdd { .. } => "RANGE_ADD",
            Self::RangeDelete { .. } => "RANGE_DELETE",
        }
    }
}

/// Mutation root field as seen by configs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootFieldPayload<'a> {
    /// Record the root field normalized into.
    pub record: Option<&'a DataId>,
    /// Raw response value of the root field.
    pub data: Option<&'a Value>,
}

/// Failure of one mutation config.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutationConfigError {
    /// The response carried no root field record.
    #[error("{0}: mutation root field is missing")]
    MissingRootField(&'static str),
    /// The root field record has no edge under the configured name.
    #[error("RANGE_ADD: root field has no edge `{0}`")]
    MissingEdge(String),
    /// `pathToConnection` needs the parent and the connection field.
    #[error("RANGE_DELETE: pathToConnection must name at least two fields, got {0:?}")]
    InvalidPath(Vec<String>),
    /// A connection edit failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Applies `configs` in order and returns every failure.
pub fn apply_mutation_configs(
    proxy: &mut RecordSourceProxy<'_>,
    handler: &ConnectionHandler,
    configs: &[MutationConfig],
    root: RootFieldPayload<'_>,
) -> Vec<MutationConfigError> {
    let mut errors = Vec::new();
    for config in configs {
        let result = match config {
            MutationConfig::NodeDelete {
                deleted_id_field_name,
            } => node_delete(proxy, handler, deleted_id_field_name, root),
            MutationConfig::RangeAdd {
                parent_id,
                connection_info,
                edge_name,
            } => range_add(
                proxy,
                handler,
                parent_id.as_ref(),
                connection_info,
                edge_name,
                root,
                &mut errors,
            ),
            MutationConfig::RangeDelete {
                parent_id,
                connection_keys,
                path_to_connection,
                deleted_id_field_name,
            } => {
                let ids = deleted_ids(root.data, deleted_id_field_name);
                range_delete(
                    proxy,
                    handler,
                    parent_id.as_ref(),
                    connection_keys,
                    path_to_connection,
                    &ids,
                    &mut errors,
                )
            }
        };
        if let Err(err) = result {
            errors.push(err);
        }
    }
    for err in &errors {
        warn!(error = %err, "mutation config failed");
    }
    errors
}

fn node_delete(
    proxy: &mut RecordSourceProxy<'_>,
    handler: &ConnectionHandler,
    field: &str,
    root: RootFieldPayload<'_>,
) -> Result<(), MutationConfigError> {
    let Some(record) = root.record else {
        return Err(MutationConfigError::MissingRootField("NODE_DELETE"));
    };
    let ids: Vec<DataId> = match proxy.value(record.as_str(), field, None) {
        Some(Value::String(id)) => vec![DataId::new(id.as_str())],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(DataId::from)
            .collect(),
        _ => Vec::new(),
    };
    let connections = ConnectionHandler::managed_connections(proxy);
    for id in &ids {
        for connection in &connections {
            handler.delete_node(proxy, connection, id)?;
        }
        if proxy.exists(id.as_str()) {
            proxy
                .delete(id)
                .map_err(|err| MutationConfigError::Handler(err.into()))?;
        }
    }
    debug!(deleted = ids.len(), "NODE_DELETE applied");
    Ok(())
}

fn range_add(
    proxy: &mut RecordSourceProxy<'_>,
    handler: &ConnectionHandler,
    parent_id: Option<&DataId>,
    connections: &[ConnectionInfo],
    edge_name: &str,
    root: RootFieldPayload<'_>,
    errors: &mut Vec<MutationConfigError>,
) -> Result<(), MutationConfigError> {
    let Some(record) = root.record else {
        return Err(MutationConfigError::MissingRootField("RANGE_ADD"));
    };
    let Some(server_edge) = proxy.linked_record(record.as_str(), edge_name, None) else {
        return Err(MutationConfigError::MissingEdge(edge_name.to_owned()));
    };
    let parent = parent_id.cloned().unwrap_or_else(DataId::root);
    for info in connections {
        let Some(connection) =
            handler.get_connection(proxy, &parent, &info.key, info.filters.as_ref())
        else {
            errors.push(
                HandlerError::UnknownConnection {
                    record: parent.clone(),
                    key: info.key.clone(),
                }
                .into(),
            );
            continue;
        };
        if info.range_behavior == RangeBehavior::Ignore {
            continue;
        }
        let node_key = &handler.interface().node;
        if let Some(node) = proxy.linked_record(server_edge.as_str(), node_key, None) {
            if handler.contains_node(proxy, &connection, &node) {
                debug!(connection = %connection, node = %node, "RANGE_ADD node already present");
                continue;
            }
        }
        let Some(edge) = handler.build_connection_edge(proxy, &connection, Some(&server_edge))?
        else {
            continue;
        };
        match info.range_behavior {
            RangeBehavior::Append => handler.insert_edge_after(proxy, &connection, &edge, None)?,
            RangeBehavior::Prepend => handler.insert_edge_before(proxy, &connection, &edge, None)?,
            RangeBehavior::Ignore => false,
        };
    }
    Ok(())
}

fn range_delete(
    proxy: &mut RecordSourceProxy<'_>,
    handler: &ConnectionHandler,
    parent_id: Option<&DataId>,
    connections: &[ConnectionInfo],
    path: &[String],
    ids: &[DataId],
    errors: &mut Vec<MutationConfigError>,
) -> Result<(), MutationConfigError> {
    if path.len() < 2 {
        return Err(MutationConfigError::InvalidPath(path.to_vec()));
    }
    let parent = parent_id.cloned().unwrap_or_else(DataId::root);
    if !proxy.exists(parent.as_str()) {
        return Err(HandlerError::MissingRecord(parent).into());
    }
    let mut holder = parent;
    for field in &path[1..path.len() - 1] {
        let Some(next) = proxy.linked_record(holder.as_str(), field, None) else {
            return Err(HandlerError::MissingRecord(holder).into());
        };
        holder = next;
    }
    for info in connections {
        let Some(connection) =
            handler.get_connection(proxy, &holder, &info.key, info.filters.as_ref())
        else {
            errors.push(
                HandlerError::UnknownConnection {
                    record: holder.clone(),
                    key: info.key.clone(),
                }
                .into(),
            );
            continue;
        };
        for id in ids {
            handler.delete_node(proxy, &connection, id)?;
        }
    }
    debug!(deleted = ids.len(), "RANGE_DELETE applied");
    Ok(())
}

/// Ids a `RANGE_DELETE` removes, extracted from the raw root field payload.
pub fn deleted_ids(payload: Option<&Value>, field: &DeletedIdField) -> Vec<DataId> {
    let Some(payload) = payload else {
        return Vec::new();
    };
    match field {
        DeletedIdField::Name(name) => match payload.get(name) {
            Some(Value::String(id)) => vec![DataId::new(id.as_str())],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(DataId::from)
                .collect(),
            _ => Vec::new(),
        },
        DeletedIdField::Path(path) => {
            let target = path
                .iter()
                .try_fold(payload, |value, segment| value.get(segment));
            let object_id = |value: &Value| value.get("id").and_then(Value::as_str).map(DataId::from);
            match target {
                Some(Value::Array(items)) => items.iter().filter_map(object_id).collect(),
                Some(value) => object_id(value).into_iter().collect(),
                None => Vec::new(),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn configs_parse_from_wire_format() {
        let raw = json!([
            {"type": "NODE_DELETE", "deletedIDFieldName": "deletedId"},
            {
                "type": "RANGE_ADD",
                "parentID": "user:1",
                "connectionInfo": [{"key": "Feed_items", "rangeBehavior": "append"}],
                "edgeName": "itemEdge"
            },
            {
                "type": "RANGE_DELETE",
                "connectionKeys": [
                    {"key": "Feed_items", "rangeBehavior": "ignore", "filters": {"kind": "all"}}
                ],
                "pathToConnection": ["viewer", "items"],
                "deletedIDFieldName": ["removed"]
            }
        ]);
        let configs: Vec<MutationConfig> = serde_json::from_value(raw).expect("parse");
        assert_eq!(
            configs.iter().map(MutationConfig::kind).collect::<Vec<_>>(),
            ["NODE_DELETE", "RANGE_ADD", "RANGE_DELETE"]
        );
        match &configs[2] {
            MutationConfig::RangeDelete {
                deleted_id_field_name,
                connection_keys,
                ..
            } => {
                assert_eq!(
                    deleted_id_field_name,
                    &DeletedIdField::Path(vec!["removed".into()])
                );
                assert_eq!(
                    connection_keys[0].filters.as_ref().and_then(|f| f.get("kind")),
                    Some(&json!("all"))
                );
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn deleted_ids_follow_name_or_path() {
        let payload = json!({
            "deletedIds": ["a", "b", 3],
            "removed": [{"id": "c"}, {"name": "no id"}, {"id": "d"}],
            "single": {"node": {"id": "e"}}
        });
        let ids = |field: DeletedIdField| -> Vec<String> {
            deleted_ids(Some(&payload), &field)
                .into_iter()
                .map(|id| id.to_string())
                .collect()
        };
        assert_eq!(ids(DeletedIdField::Name("deletedIds".into())), ["a", "b"]);
        assert_eq!(ids(DeletedIdField::Path(vec!["removed".into()])), ["c", "d"]);
        assert_eq!(
            ids(DeletedIdField::Path(vec!["single".into(), "node".into()])),
            ["e"]
        );
        assert!(ids(DeletedIdField::Name("missing".into())).is_empty());
    }
}
