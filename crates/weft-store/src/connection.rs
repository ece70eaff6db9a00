// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Connection handler: keeps a client-side edge list per paginated field.
//!
//! The server connection for each fetched page is normalized under the raw
//! field key. The handler mirrors it into a client connection stored under the
//! handle key and splices later pages into it:
//! - first fetch copies the server connection, rebuilding every edge as a
//!   client record `<connection>:edges:<n>`;
//! - `after == endCursor` appends, `before == startCursor` prepends, both
//!   skipping nodes already present;
//! - a page with neither cursor replaces the edges, reusing the client edge
//!   of every node that was already present.
//!
//! Client edges are numbered from the connection's
//! `__connection_next_edge_index` counter, which also marks a record as
//! handler-managed.
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Value};
use tracing::debug;
use weft_ir::{relay_handle_key, Variables};

use crate::config::ConnectionInterface;
use crate::handler::{FieldHandler, HandleFieldPayload, HandlerError};
use crate::ident::{generate_client_id, DataId};
use crate::proxy::RecordSourceProxy;
use crate::record::FieldValue;

/// Handle name the connection handler is registered under.
pub const CONNECTION_HANDLE: &str = "connection";

/// Counter field numbering client edges of a handler-managed connection.
pub const NEXT_EDGE_INDEX: &str = "__connection_next_edge_index";

/// Connection splicing operations over a transaction proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionHandler {
    interface: ConnectionInterface,
}

impl ConnectionHandler {
    /// Handler using `interface` field names.
    pub fn new(interface: ConnectionInterface) -> Self {
        Self { interface }
    }

    /// Field names in use.
    pub fn interface(&self) -> &ConnectionInterface {
        &self.interface
    }

    /// Client connection stored on `record` for connection `key`, narrowed
    /// by the handle's filter arguments.
    pub fn get_connection(
        &self,
        proxy: &RecordSourceProxy<'_>,
        record: &DataId,
        key: &str,
        filters: Option<&Variables>,
    ) -> Option<DataId> {
        let handle_key = relay_handle_key(CONNECTION_HANDLE, key, "");
        proxy
            .linked_record(record.as_str(), &handle_key, filters)
            .filter(|id| proxy.exists(id.as_str()))
    }

    /// Creates (or reuses) the client edge `client:<connection>:<node>`
    /// pointing at `node`.
    pub fn create_edge(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        connection: &DataId,
        node: &DataId,
        edge_type: &str,
    ) -> Result<DataId, HandlerError> {
        let edge = generate_client_id(connection, node.as_str(), None);
        proxy.get_or_create(&edge, edge_type);
        proxy.set_linked_record(&edge, &self.interface.node, None, node)?;
        if proxy.value(edge.as_str(), &self.interface.cursor, None).is_none() {
            proxy.set_value(&edge, &self.interface.cursor, None, Value::Null)?;
        }
        Ok(edge)
    }

    /// Copies a server edge into a new client edge of `connection`.
    pub fn build_connection_edge(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        connection: &DataId,
        edge: Option<&DataId>,
    ) -> Result<Option<DataId>, HandlerError> {
        let Some(edge) = edge else {
            return Ok(None);
        };
        let Some(edge_type) = proxy.type_name(edge.as_str()).map(str::to_owned) else {
            return Err(HandlerError::MissingRecord(edge.clone()));
        };
        let mut index = proxy
            .value(connection.as_str(), NEXT_EDGE_INDEX, None)
            .and_then(Value::as_u64)
            .and_then(|raw| usize::try_from(raw).ok())
            .unwrap_or(0);
        let mut client_edge = generate_client_id(connection, &self.interface.edges, Some(index));
        while proxy.exists(client_edge.as_str()) {
            index += 1;
            client_edge = generate_client_id(connection, &self.interface.edges, Some(index));
        }
        proxy.create(&client_edge, &edge_type)?;
        proxy.copy_fields(edge, &client_edge)?;
        proxy.set_value(connection, NEXT_EDGE_INDEX, None, json!(index + 1))?;
        Ok(Some(client_edge))
    }

    /// Inserts `edge` after the edge whose cursor is `cursor`, or at the tail.
    ///
    /// Returns `false` when the edge's node is already in the connection.
    pub fn insert_edge_after(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        connection: &DataId,
        edge: &DataId,
        cursor: Option<&str>,
    ) -> Result<bool, HandlerError> {
        self.insert_edge(proxy, connection, edge, cursor, Placement::After)
    }

    /// Inserts `edge` before the edge whose cursor is `cursor`, or at the head.
    ///
    /// Returns `false` when the edge's node is already in the connection.
    pub fn insert_edge_before(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        connection: &DataId,
        edge: &DataId,
        cursor: Option<&str>,
    ) -> Result<bool, HandlerError> {
        self.insert_edge(proxy, connection, edge, cursor, Placement::Before)
    }

    fn insert_edge(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        connection: &DataId,
        edge: &DataId,
        cursor: Option<&str>,
        placement: Placement,
    ) -> Result<bool, HandlerError> {
        if !proxy.exists(connection.as_str()) {
            return Err(HandlerError::MissingRecord(connection.clone()));
        }
        if let Some(node) = self.edge_node(proxy, edge) {
            if self.contains_node(proxy, connection, &node) {
                debug!(connection = %connection, node = %node, "node already in connection; insert ignored");
                return Ok(false);
            }
        }
        let edges_key = &self.interface.edges;
        let current = proxy.linked_records(connection.as_str(), edges_key, None);
        let new_edge = Some(edge.clone());
        let next = match (current, cursor) {
            (None, _) => vec![new_edge],
            (Some(mut edges), None) => {
                match placement {
                    Placement::After => edges.push(new_edge),
                    Placement::Before => edges.insert(0, new_edge),
                }
                edges
            }
            (Some(edges), Some(cursor)) => {
                let anchor = edges.iter().position(|existing| {
                    existing.as_ref().is_some_and(|id| {
                        proxy
                            .value(id.as_str(), &self.interface.cursor, None)
                            .and_then(Value::as_str)
                            == Some(cursor)
                    })
                });
                let mut edges = edges;
                match (anchor, placement) {
                    (Some(pos), Placement::After) => edges.insert(pos + 1, new_edge),
                    (Some(pos), Placement::Before) => edges.insert(pos, new_edge),
                    (None, Placement::After) => edges.push(new_edge),
                    (None, Placement::Before) => edges.insert(0, new_edge),
                }
                edges
            }
        };
        proxy.set_linked_records(connection, edges_key, None, next)?;
        self.sync_page_info(proxy, connection)?;
        Ok(true)
    }

    /// Removes every edge of `connection` whose node is `node`.
    ///
    /// Returns `true` when an edge was removed.
    pub fn delete_node(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        connection: &DataId,
        node: &DataId,
    ) -> Result<bool, HandlerError> {
        let Some(edges) = proxy.linked_records(connection.as_str(), &self.interface.edges, None)
        else {
            return Ok(false);
        };
        let before = edges.len();
        let next: Vec<Option<DataId>> = edges
            .into_iter()
            .filter(|edge| {
                edge.as_ref()
                    .and_then(|id| self.edge_node(proxy, id))
                    .as_ref()
                    != Some(node)
            })
            .collect();
        if next.len() == before {
            return Ok(false);
        }
        proxy.set_linked_records(connection, &self.interface.edges, None, next)?;
        self.sync_page_info(proxy, connection)?;
        Ok(true)
    }

    /// Whether some edge of `connection` points at `node`.
    pub fn contains_node(
        &self,
        proxy: &RecordSourceProxy<'_>,
        connection: &DataId,
        node: &DataId,
    ) -> bool {
        proxy
            .linked_records(connection.as_str(), &self.interface.edges, None)
            .unwrap_or_default()
            .iter()
            .flatten()
            .any(|edge| self.edge_node(proxy, edge).as_ref() == Some(node))
    }

    /// Every handler-managed connection visible to `proxy`.
    pub fn managed_connections(proxy: &RecordSourceProxy<'_>) -> Vec<DataId> {
        proxy
            .record_ids()
            .into_iter()
            .filter(|id| proxy.field(id.as_str(), NEXT_EDGE_INDEX).is_some())
            .collect()
    }

    fn edge_node(&self, proxy: &RecordSourceProxy<'_>, edge: &DataId) -> Option<DataId> {
        proxy.linked_record(edge.as_str(), &self.interface.node, None)
    }

    fn cursor_of(&self, proxy: &RecordSourceProxy<'_>, edge: Option<&DataId>) -> Option<String> {
        edge.and_then(|id| proxy.value(id.as_str(), &self.interface.cursor, None))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// Points the page info cursors at the boundary edges. A boundary edge
    /// without a string cursor, such as one made by [`Self::create_edge`],
    /// sets the cursor to `null`; so does an empty connection.
    fn sync_page_info(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        connection: &DataId,
    ) -> Result<(), HandlerError> {
        let Some(page_info) = proxy
            .linked_record(connection.as_str(), &self.interface.page_info, None)
            .filter(|id| proxy.exists(id.as_str()))
        else {
            return Ok(());
        };
        let edges: Vec<DataId> = proxy
            .linked_records(connection.as_str(), &self.interface.edges, None)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect();
        let i = &self.interface;
        let start = self.cursor_of(proxy, edges.first()).map_or(Value::Null, Value::String);
        let end = self.cursor_of(proxy, edges.last()).map_or(Value::Null, Value::String);
        proxy.set_value(&page_info, &i.start_cursor, None, start)?;
        proxy.set_value(&page_info, &i.end_cursor, None, end)?;
        Ok(())
    }

    fn merge_edges(
        &self,
        proxy: &RecordSourceProxy<'_>,
        source: &[Option<DataId>],
        target: &mut Vec<Option<DataId>>,
        seen: &mut FxHashSet<DataId>,
    ) {
        for edge in source.iter().flatten() {
            if let Some(node) = self.edge_node(proxy, edge) {
                if !seen.insert(node) {
                    continue;
                }
            }
            target.push(Some(edge.clone()));
        }
    }

    fn create_client_connection(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        payload: &HandleFieldPayload,
        server: &DataId,
        client: &DataId,
    ) -> Result<(), HandlerError> {
        let i = &self.interface;
        let Some(server_type) = proxy.type_name(server.as_str()).map(str::to_owned) else {
            return Err(HandlerError::MissingRecord(server.clone()));
        };
        proxy.create(client, &server_type)?;
        proxy.set_value(client, NEXT_EDGE_INDEX, None, json!(0))?;
        proxy.copy_fields(server, client)?;
        if let Some(server_edges) = proxy.linked_records(server.as_str(), &i.edges, None) {
            let built = self.build_edges(proxy, client, &server_edges)?;
            proxy.set_linked_records(client, &i.edges, None, built)?;
        }
        proxy.set_linked_record(&payload.data_id, &payload.handle_key, None, client)?;

        let page_info = generate_client_id(client, &i.page_info, None);
        proxy.get_or_create(&page_info, &i.page_info_type);
        proxy.set_value(&page_info, &i.has_next_page, None, json!(false))?;
        proxy.set_value(&page_info, &i.has_previous_page, None, json!(false))?;
        proxy.set_value(&page_info, &i.end_cursor, None, Value::Null)?;
        proxy.set_value(&page_info, &i.start_cursor, None, Value::Null)?;
        if let Some(server_page_info) = self.page_info_of(proxy, server) {
            proxy.copy_fields(&server_page_info, &page_info)?;
        }
        proxy.set_linked_record(client, &i.page_info, None, &page_info)?;
        debug!(connection = %client, "client connection created");
        Ok(())
    }

    fn build_edges(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        connection: &DataId,
        edges: &[Option<DataId>],
    ) -> Result<Vec<Option<DataId>>, HandlerError> {
        edges
            .iter()
            .map(|edge| self.build_connection_edge(proxy, connection, edge.as_ref()))
            .collect()
    }

    /// Client edges for a fetched page merged into `connection`.
    ///
    /// A server edge whose node already has a client edge in `prev` reuses
    /// that edge, refreshed from the server copy, so refetching an unchanged
    /// page writes no new records. With `keep_prev` the existing edge wins
    /// and the server edge is dropped instead.
    fn page_edges(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        connection: &DataId,
        prev: Option<&[Option<DataId>]>,
        server_edges: &[Option<DataId>],
        keep_prev: bool,
    ) -> Result<Vec<Option<DataId>>, HandlerError> {
        let mut existing: FxHashMap<DataId, DataId> = prev
            .unwrap_or_default()
            .iter()
            .flatten()
            .filter_map(|edge| self.edge_node(proxy, edge).map(|node| (node, edge.clone())))
            .collect();
        let mut edges = Vec::with_capacity(server_edges.len());
        for edge in server_edges {
            let reuse = match edge.as_ref().and_then(|id| self.edge_node(proxy, id)) {
                Some(node) if keep_prev => existing.get(&node).cloned(),
                Some(node) => existing.remove(&node),
                None => None,
            };
            match (edge, reuse) {
                (Some(_), Some(_)) if keep_prev => {}
                (Some(server_edge), Some(client_edge)) => {
                    proxy.copy_fields(server_edge, &client_edge)?;
                    edges.push(Some(client_edge));
                }
                (edge, _) => {
                    edges.push(self.build_connection_edge(proxy, connection, edge.as_ref())?);
                }
            }
        }
        Ok(edges)
    }

    fn page_info_of(&self, proxy: &RecordSourceProxy<'_>, connection: &DataId) -> Option<DataId> {
        proxy
            .linked_record(connection.as_str(), &self.interface.page_info, None)
            .filter(|id| proxy.exists(id.as_str()))
    }

    fn merge_client_connection(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        payload: &HandleFieldPayload,
        server: &DataId,
        client: &DataId,
    ) -> Result<(), HandlerError> {
        let i = &self.interface;
        let after = payload.args.get("after").filter(|v| !v.is_null()).cloned();
        let before = payload.args.get("before").filter(|v| !v.is_null()).cloned();
        let client_page_info = self.page_info_of(proxy, client);
        let server_page_info = self.page_info_of(proxy, server);
        let prev_edges = proxy.linked_records(client.as_str(), &i.edges, None);
        let raw_server_edges = proxy.linked_records(server.as_str(), &i.edges, None);

        if prev_edges.is_some() && raw_server_edges.is_some() {
            let boundary = match (&after, &before) {
                (Some(cursor), _) => Some(("after", &i.end_cursor, cursor)),
                (None, Some(cursor)) => Some(("before", &i.start_cursor, cursor)),
                (None, None) => None,
            };
            if let Some((direction, field, cursor)) = boundary {
                let stored = client_page_info
                    .as_ref()
                    .and_then(|pi| proxy.value(pi.as_str(), field, None));
                if stored != Some(cursor) {
                    return Err(HandlerError::CursorMismatch {
                        connection: client.clone(),
                        direction,
                        expected: stored.and_then(Value::as_str).map(str::to_owned),
                        found: cursor.as_str().map_or_else(|| cursor.to_string(), str::to_owned),
                    });
                }
            }
        }

        let server_edges = match &raw_server_edges {
            Some(edges) => Some(self.page_edges(
                proxy,
                client,
                prev_edges.as_deref(),
                edges,
                after.is_some(),
            )?),
            None => None,
        };
        let prev_page_info = proxy.linked_record(client.as_str(), &i.page_info, None);
        proxy.copy_fields(server, client)?;
        if let Some(prev) = &prev_edges {
            proxy.set_linked_records(client, &i.edges, None, prev.clone())?;
        }
        if let Some(prev) = &prev_page_info {
            proxy.set_linked_record(client, &i.page_info, None, prev)?;
        }

        let next_edges = match (&prev_edges, server_edges) {
            (Some(prev), Some(server_edges)) => {
                let mut merged = Vec::with_capacity(prev.len() + server_edges.len());
                let mut seen = FxHashSet::default();
                if after.is_some() {
                    self.merge_edges(proxy, prev, &mut merged, &mut seen);
                    self.merge_edges(proxy, &server_edges, &mut merged, &mut seen);
                    Some(merged)
                } else if before.is_some() {
                    self.merge_edges(proxy, &server_edges, &mut merged, &mut seen);
                    self.merge_edges(proxy, prev, &mut merged, &mut seen);
                    Some(merged)
                } else {
                    Some(server_edges)
                }
            }
            (_, Some(server_edges)) => Some(server_edges),
            (prev, None) => prev.clone(),
        };
        if let Some(next) = next_edges {
            if prev_edges.as_ref() != Some(&next) {
                proxy.set_linked_records(client, &i.edges, None, next)?;
            }
        }

        if let (Some(client_pi), Some(server_pi)) = (client_page_info, server_page_info) {
            if after.is_none() && before.is_none() {
                proxy.copy_fields(&server_pi, &client_pi)?;
            } else if before.is_some() {
                let has_previous = proxy
                    .value(server_pi.as_str(), &i.has_previous_page, None)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                proxy.set_value(&client_pi, &i.has_previous_page, None, json!(has_previous))?;
                if let Some(start) = proxy
                    .value(server_pi.as_str(), &i.start_cursor, None)
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                {
                    proxy.set_value(&client_pi, &i.start_cursor, None, Value::String(start))?;
                }
            } else {
                let has_next = proxy
                    .value(server_pi.as_str(), &i.has_next_page, None)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                proxy.set_value(&client_pi, &i.has_next_page, None, json!(has_next))?;
                if let Some(end) = proxy
                    .value(server_pi.as_str(), &i.end_cursor, None)
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                {
                    proxy.set_value(&client_pi, &i.end_cursor, None, Value::String(end))?;
                }
            }
        }
        debug!(connection = %client, "connection page merged");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    After,
    Before,
}

impl FieldHandler for ConnectionHandler {
    fn update(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        payload: &HandleFieldPayload,
    ) -> Result<(), HandlerError> {
        let record = &payload.data_id;
        if !proxy.exists(record.as_str()) {
            return Err(HandlerError::MissingRecord(record.clone()));
        }
        let Some(server) = proxy
            .linked_record(record.as_str(), &payload.field_key, None)
            .filter(|id| proxy.exists(id.as_str()))
        else {
            proxy.write_field(record, &payload.handle_key, Some(FieldValue::NULL))?;
            return Ok(());
        };
        let client_id = generate_client_id(record, &payload.handle_key, None);
        let client = proxy
            .linked_record(record.as_str(), &payload.handle_key, None)
            .filter(|id| proxy.exists(id.as_str()))
            .or_else(|| proxy.exists(client_id.as_str()).then(|| client_id.clone()));
        match client {
            None => self.create_client_connection(proxy, payload, &server, &client_id),
            Some(client) => self.merge_client_connection(proxy, payload, &server, &client),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::source::{ChangeSet, RecordSource};

    fn seed_connection(
        proxy: &mut RecordSourceProxy<'_>,
        handler: &ConnectionHandler,
        nodes: &[(&str, &str)],
    ) -> DataId {
        let conn = DataId::new("client:root:__Feed_items_connection");
        proxy.create(&conn, "ItemConnection").expect("connection");
        proxy
            .set_value(&conn, NEXT_EDGE_INDEX, None, json!(0))
            .expect("index");
        let page_info = DataId::new("client:root:__Feed_items_connection:pageInfo");
        proxy.create(&page_info, "PageInfo").expect("page info");
        proxy
            .set_linked_record(&conn, "pageInfo", None, &page_info)
            .expect("link page info");
        let mut edges = Vec::new();
        for (node, cursor) in nodes {
            let node = DataId::new(*node);
            proxy.get_or_create(&node, "Item");
            let edge = handler
                .create_edge(proxy, &conn, &node, "ItemEdge")
                .expect("edge");
            proxy
                .set_value(&edge, "cursor", None, json!(cursor))
                .expect("cursor");
            edges.push(Some(edge));
        }
        proxy
            .set_linked_records(&conn, "edges", None, edges)
            .expect("edges");
        conn
    }

    fn node_order(proxy: &RecordSourceProxy<'_>, conn: &DataId) -> Vec<String> {
        proxy
            .linked_records(conn.as_str(), "edges", None)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|edge| proxy.linked_record(edge.as_str(), "node", None))
            .map(|id| id.to_string())
            .collect()
    }

    #[test]
    fn create_edge_id_is_connection_scoped() {
        let base = RecordSource::default();
        let mut changes = ChangeSet::default();
        let mut proxy = RecordSourceProxy::new(&base, &mut changes);
        let handler = ConnectionHandler::default();
        let conn = seed_connection(&mut proxy, &handler, &[("a", "1")]);
        let edges = proxy.linked_records(conn.as_str(), "edges", None).expect("edges");
        assert_eq!(
            edges[0].as_ref().map(DataId::as_str),
            Some("client:root:__Feed_items_connection:a")
        );
    }

    #[test]
    fn insert_before_cursor_and_ignore_duplicates() {
        let base = RecordSource::default();
        let mut changes = ChangeSet::default();
        let mut proxy = RecordSourceProxy::new(&base, &mut changes);
        let handler = ConnectionHandler::default();
        let conn = seed_connection(&mut proxy, &handler, &[("A", "a"), ("B", "b")]);

        let c = DataId::new("C");
        proxy.get_or_create(&c, "Item");
        let edge = handler.create_edge(&mut proxy, &conn, &c, "ItemEdge").expect("edge");
        assert!(handler
            .insert_edge_before(&mut proxy, &conn, &edge, Some("b"))
            .expect("insert"));
        assert_eq!(node_order(&proxy, &conn), ["A", "C", "B"]);

        let again = handler.create_edge(&mut proxy, &conn, &c, "ItemEdge").expect("edge");
        assert!(!handler
            .insert_edge_after(&mut proxy, &conn, &again, None)
            .expect("insert"));
        assert_eq!(node_order(&proxy, &conn), ["A", "C", "B"]);
    }

    #[test]
    fn deleting_last_node_clears_cursors() {
        let base = RecordSource::default();
        let mut changes = ChangeSet::default();
        let mut proxy = RecordSourceProxy::new(&base, &mut changes);
        let handler = ConnectionHandler::default();
        let conn = seed_connection(&mut proxy, &handler, &[("A", "a")]);
        let page_info = "client:root:__Feed_items_connection:pageInfo";
        proxy
            .set_value(&DataId::new(page_info), "endCursor", None, json!("a"))
            .expect("seed cursor");

        assert!(handler
            .delete_node(&mut proxy, &conn, &DataId::new("A"))
            .expect("delete"));
        assert_eq!(proxy.value(page_info, "endCursor", None), Some(&Value::Null));
        assert_eq!(proxy.value(page_info, "startCursor", None), Some(&Value::Null));
        assert!(!handler
            .delete_node(&mut proxy, &conn, &DataId::new("A"))
            .expect("delete again"));
    }

    #[test]
    fn cursorless_boundary_edge_nulls_the_cursor() {
        let base = RecordSource::default();
        let mut changes = ChangeSet::default();
        let mut proxy = RecordSourceProxy::new(&base, &mut changes);
        let handler = ConnectionHandler::default();
        let conn = seed_connection(&mut proxy, &handler, &[("A", "a"), ("B", "b")]);
        let page_info = "client:root:__Feed_items_connection:pageInfo";

        let c = DataId::new("C");
        proxy.get_or_create(&c, "Item");
        let edge = handler.create_edge(&mut proxy, &conn, &c, "ItemEdge").expect("edge");
        assert!(handler
            .insert_edge_before(&mut proxy, &conn, &edge, None)
            .expect("insert"));
        assert_eq!(node_order(&proxy, &conn), ["C", "A", "B"]);
        assert_eq!(proxy.value(page_info, "startCursor", None), Some(&Value::Null));
        assert_eq!(proxy.value(page_info, "endCursor", None), Some(&json!("b")));
    }

    #[test]
    fn managed_connections_are_found_by_edge_counter() {
        let base = RecordSource::default();
        let mut changes = ChangeSet::default();
        let mut proxy = RecordSourceProxy::new(&base, &mut changes);
        let handler = ConnectionHandler::default();
        let conn = seed_connection(&mut proxy, &handler, &[]);
        assert_eq!(ConnectionHandler::managed_connections(&proxy), vec![conn]);
    }
}
