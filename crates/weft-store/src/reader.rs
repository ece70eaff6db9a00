// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Projects normalized records back into response-shaped JSON.
//!
//! The reader walks the same selection trees the normalizer consumes. Fields
//! that carry a sibling handle (e.g. `@connection`) are read from the handle's
//! storage slot instead of the raw server field.
use std::collections::BTreeSet;

use serde_json::{Map, Value};
use weft_ir::{
    handle_storage_key, operation_variables, storage_key, HandleField, LinkedField, MatchField,
    Operation, ScalarField, Selection, Variables,
};

use crate::ident::DataId;
use crate::record::{FieldValue, Record};
use crate::source::{RecordSource, RecordStatus};

/// Field written on records normalized through a `@match` field: the module
/// (component) reference for the runtime type.
pub const MATCH_COMPONENT_KEY: &str = "__match_component";
/// Field written on records normalized through a `@match` field: the fragment
/// name for the runtime type.
pub const MATCH_FRAGMENT_KEY: &str = "__match_fragment";

/// Record plus the selections to read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    /// Record the selections start at.
    pub data_id: DataId,
    /// Selections to project.
    pub selections: Vec<Selection>,
    /// Variables used to resolve arguments and conditions.
    pub variables: Variables,
}

impl Selector {
    /// Builds a selector.
    pub fn new(data_id: DataId, selections: Vec<Selection>, variables: Variables) -> Self {
        Self {
            data_id,
            selections,
            variables,
        }
    }

    /// Selector for a whole operation rooted at `client:root`, with declared
    /// defaults applied to `variables`.
    pub fn for_operation(operation: &Operation, variables: &Variables) -> Self {
        Self {
            data_id: DataId::root(),
            selections: operation.selections.clone(),
            variables: operation_variables(&operation.argument_definitions, variables),
        }
    }
}

/// Result of reading a selector.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderSnapshot {
    /// Selector that produced the snapshot.
    pub selector: Selector,
    /// Projected data; `null` when the starting record is absent.
    pub data: Value,
    /// Every record id the read touched, present or not.
    pub seen_records: BTreeSet<DataId>,
    /// `true` when some selected field has never been fetched.
    pub is_missing_data: bool,
}

/// Reads `selector` from `source`.
pub fn read(source: &RecordSource, selector: &Selector) -> ReaderSnapshot {
    let mut reader = Reader {
        source,
        variables: &selector.variables,
        seen: BTreeSet::new(),
        missing: false,
    };
    let data = reader.read_linked(&selector.data_id, &selector.selections, false);
    ReaderSnapshot {
        selector: selector.clone(),
        data,
        seen_records: reader.seen,
        is_missing_data: reader.missing,
    }
}

struct Reader<'a> {
    source: &'a RecordSource,
    variables: &'a Variables,
    seen: BTreeSet<DataId>,
    missing: bool,
}

impl Reader<'_> {
    fn read_linked(&mut self, id: &DataId, selections: &[Selection], client: bool) -> Value {
        self.seen.insert(id.clone());
        match self.source.status(id.as_str()) {
            RecordStatus::Existent => {}
            RecordStatus::Nonexistent => return Value::Null,
            RecordStatus::Unknown => {
                self.mark_missing(client);
                return Value::Null;
            }
        }
        let Some(record) = self.source.get(id.as_str()) else {
            return Value::Null;
        };
        let mut out = Map::new();
        self.traverse(record, selections, &mut out, client);
        Value::Object(out)
    }

    fn mark_missing(&mut self, client: bool) {
        if !client {
            self.missing = true;
        }
    }

    fn traverse(
        &mut self,
        record: &Record,
        selections: &[Selection],
        out: &mut Map<String, Value>,
        client: bool,
    ) {
        let handles: Vec<&HandleField> = selections
            .iter()
            .filter_map(|sel| match sel {
                Selection::ScalarHandle(handle) | Selection::LinkedHandle(handle) => Some(handle),
                _ => None,
            })
            .collect();
        for selection in selections {
            match selection {
                Selection::ScalarField(field) => {
                    self.read_scalar(record, field, &handles, out, client);
                }
                Selection::LinkedField(field) => {
                    self.read_linked_field(record, field, &handles, out, client);
                }
                Selection::MatchField(field) => self.read_match(record, field, out, client),
                Selection::InlineFragment(fragment) => {
                    if record.type_name() == fragment.type_name {
                        self.traverse(record, &fragment.selections, out, client);
                    }
                }
                Selection::Condition(condition) => {
                    let value = self.variables.get(&condition.condition);
                    if value.and_then(Value::as_bool) == Some(condition.passing_value) {
                        self.traverse(record, &condition.selections, out, client);
                    }
                }
                Selection::ClientExtension(ext) => {
                    self.traverse(record, &ext.selections, out, true);
                }
                Selection::Defer(defer) => self.traverse(record, &defer.selections, out, client),
                Selection::Stream(stream) => {
                    self.traverse(record, &stream.selections, out, client);
                }
                Selection::ScalarHandle(_) | Selection::LinkedHandle(_) => {}
            }
        }
    }

    fn key_for(
        &self,
        name: &str,
        alias: Option<&str>,
        fallback: String,
        handles: &[&HandleField],
    ) -> String {
        handles
            .iter()
            .find(|h| h.name == name && h.alias.as_deref() == alias)
            .map_or(fallback, |h| handle_storage_key(h, self.variables))
    }

    fn read_scalar(
        &mut self,
        record: &Record,
        field: &ScalarField,
        handles: &[&HandleField],
        out: &mut Map<String, Value>,
        client: bool,
    ) {
        let key = self.key_for(
            &field.name,
            field.alias.as_deref(),
            storage_key(field, self.variables),
            handles,
        );
        let value = match record.get(&key) {
            Some(FieldValue::Scalar(value)) => value.clone(),
            Some(FieldValue::Linked(_) | FieldValue::LinkedList(_)) => Value::Null,
            None if field.name == "__typename" => Value::String(record.type_name().to_owned()),
            None => {
                self.mark_missing(client);
                return;
            }
        };
        out.insert(field.response_key().to_owned(), value);
    }

    fn read_linked_field(
        &mut self,
        record: &Record,
        field: &LinkedField,
        handles: &[&HandleField],
        out: &mut Map<String, Value>,
        client: bool,
    ) {
        let key = self.key_for(
            &field.name,
            field.alias.as_deref(),
            storage_key(field, self.variables),
            handles,
        );
        let value = match record.get(&key) {
            Some(FieldValue::Linked(id)) => self.read_linked(id, &field.selections, client),
            Some(FieldValue::LinkedList(ids)) => Value::Array(
                ids.iter()
                    .map(|item| match item {
                        Some(id) => self.read_linked(id, &field.selections, client),
                        None => Value::Null,
                    })
                    .collect(),
            ),
            Some(FieldValue::Scalar(_)) => Value::Null,
            None => {
                self.mark_missing(client);
                return;
            }
        };
        out.insert(field.response_key().to_owned(), value);
    }

    fn read_match(
        &mut self,
        record: &Record,
        field: &MatchField,
        out: &mut Map<String, Value>,
        client: bool,
    ) {
        let value = match record.get(&storage_key(field, self.variables)) {
            Some(FieldValue::Linked(id)) => {
                self.seen.insert(id.clone());
                match self.source.get(id.as_str()) {
                    Some(linked) => {
                        let mut module = Map::new();
                        module.insert("__id".into(), Value::String(id.to_string()));
                        module.insert(
                            "__typename".into(),
                            Value::String(linked.type_name().to_owned()),
                        );
                        for key in [MATCH_COMPONENT_KEY, MATCH_FRAGMENT_KEY] {
                            if let Some(value) = linked.value(key) {
                                module.insert(key.to_owned(), value.clone());
                            }
                        }
                        Value::Object(module)
                    }
                    None => Value::Null,
                }
            }
            Some(_) => Value::Null,
            None => {
                self.mark_missing(client);
                return;
            }
        };
        out.insert(field.response_key().to_owned(), value);
    }
}
