// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Normalized record type.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ident::DataId;

/// Value stored under one storage key of a record.
///
/// An absent key means "undefined" (never fetched); `Scalar(Value::Null)` is
/// an explicit null.
///
/// On the wire references are `{"__ref": id}` and `{"__refs": [id | null]}`.
/// A scalar object that itself uses one of the reserved keys (`__ref`,
/// `__refs`, `__value`) is wrapped as `{"__value": object}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum FieldValue {
    /// Scalar or scalar list, stored verbatim.
    Scalar(Value),
    /// Reference to another record.
    Linked(DataId),
    /// Ordered references; `None` preserves a `null` list item.
    LinkedList(Vec<Option<DataId>>),
}

const REF_KEY: &str = "__ref";
const REFS_KEY: &str = "__refs";
const VALUE_KEY: &str = "__value";

impl FieldValue {
    /// Explicit null.
    pub const NULL: Self = Self::Scalar(Value::Null);

    /// Scalar payload, if this is a scalar.
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Linked(_) | Self::LinkedList(_) => None,
        }
    }

    /// Linked id, if this is a singular reference.
    pub fn as_linked(&self) -> Option<&DataId> {
        match self {
            Self::Linked(id) => Some(id),
            Self::Scalar(_) | Self::LinkedList(_) => None,
        }
    }

    /// Linked ids, if this is a plural reference.
    pub fn as_linked_list(&self) -> Option<&[Option<DataId>]> {
        match self {
            Self::LinkedList(ids) => Some(ids),
            Self::Scalar(_) | Self::Linked(_) => None,
        }
    }

    /// Returns `true` for an explicit null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Value::Null))
    }
}

fn decode_refs(items: &[Value]) -> Option<Vec<Option<DataId>>> {
    items
        .iter()
        .map(|item| match item {
            Value::Null => Some(None),
            Value::String(id) => Some(Some(DataId::new(id))),
            _ => None,
        })
        .collect()
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        if let Value::Object(map) = &value {
            match map.iter().next() {
                Some((key, Value::String(id))) if map.len() == 1 && key == REF_KEY => {
                    return Self::Linked(DataId::new(id));
                }
                Some((key, Value::Array(items))) if map.len() == 1 && key == REFS_KEY => {
                    if let Some(ids) = decode_refs(items) {
                        return Self::LinkedList(ids);
                    }
                }
                Some((key, inner)) if map.len() == 1 && key == VALUE_KEY => {
                    return Self::Scalar(inner.clone());
                }
                _ => {}
            }
        }
        Self::Scalar(value)
    }
}

fn tagged(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_owned(), value);
    Value::Object(map)
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Linked(id) => tagged(REF_KEY, Self::String(id.to_string())),
            FieldValue::LinkedList(ids) => tagged(
                REFS_KEY,
                Self::Array(
                    ids.into_iter()
                        .map(|id| id.map_or(Self::Null, |id| Self::String(id.to_string())))
                        .collect(),
                ),
            ),
            FieldValue::Scalar(Self::Object(map))
                if [REF_KEY, REFS_KEY, VALUE_KEY]
                    .iter()
                    .any(|key| map.contains_key(*key)) =>
            {
                tagged(VALUE_KEY, Self::Object(map))
            }
            FieldValue::Scalar(value) => value,
        }
    }
}

/// Materialised record for a single normalized object.
///
/// Invariants
/// - `id` is unique within a record source.
/// - `type_name` is the GraphQL `__typename` and never changes after creation.
/// - `fields` is keyed by storage key (see `weft_ir::storage_key`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "__id")]
    id: DataId,
    #[serde(rename = "__typename")]
    type_name: String,
    #[serde(flatten)]
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Creates an empty record.
    pub fn new(id: DataId, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Record identifier.
    pub fn id(&self) -> &DataId {
        &self.id
    }

    /// GraphQL type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Raw field value at `storage_key`.
    pub fn get(&self, storage_key: &str) -> Option<&FieldValue> {
        self.fields.get(storage_key)
    }

    /// Scalar value at `storage_key`.
    pub fn value(&self, storage_key: &str) -> Option<&Value> {
        self.get(storage_key).and_then(FieldValue::as_scalar)
    }

    /// Singular reference at `storage_key`.
    pub fn linked_id(&self, storage_key: &str) -> Option<&DataId> {
        self.get(storage_key).and_then(FieldValue::as_linked)
    }

    /// Plural reference at `storage_key`.
    pub fn linked_ids(&self, storage_key: &str) -> Option<&[Option<DataId>]> {
        self.get(storage_key).and_then(FieldValue::as_linked_list)
    }

    /// Iterates fields in storage-key order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Number of stored fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn set(&mut self, storage_key: String, value: FieldValue) {
        self.fields.insert(storage_key, value);
    }

    pub(crate) fn remove(&mut self, storage_key: &str) {
        self.fields.remove(storage_key);
    }

    /// Ids referenced by this record's linked fields, in storage-key order.
    pub(crate) fn references(&self) -> impl Iterator<Item = &DataId> {
        self.fields.values().flat_map(|value| {
            let (single, list): (Option<&DataId>, &[Option<DataId>]) = match value {
                FieldValue::Linked(id) => (Some(id), &[]),
                FieldValue::LinkedList(ids) => (None, ids.as_slice()),
                FieldValue::Scalar(_) => (None, &[]),
            };
            single.into_iter().chain(list.iter().flatten())
        })
    }
}
