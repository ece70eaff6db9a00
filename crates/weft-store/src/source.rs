// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Committed record tables and buffered change sets.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::ident::{DataId, ROOT_TYPE};
use crate::record::{FieldValue, Record};

/// Presence of a record in a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// The record exists.
    Existent,
    /// The record was explicitly deleted.
    Nonexistent,
    /// The record has never been seen.
    Unknown,
}

/// Flat table of committed records.
///
/// The root record lives outside the table so it always exists; every other
/// id maps to `Some(record)` or to `None` (a tombstone left by a delete).
/// Iteration is in ascending id order, root first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSource {
    root: Record,
    records: BTreeMap<DataId, Option<Record>>,
}

impl Default for RecordSource {
    fn default() -> Self {
        Self {
            root: Record::new(DataId::root(), ROOT_TYPE),
            records: BTreeMap::new(),
        }
    }
}

impl RecordSource {
    /// Returns the record when it exists.
    pub fn get(&self, id: &str) -> Option<&Record> {
        if id == self.root.id().as_str() {
            return Some(&self.root);
        }
        self.records.get(id).and_then(Option::as_ref)
    }

    /// Root record.
    pub fn root(&self) -> &Record {
        &self.root
    }

    /// Presence of `id`.
    pub fn status(&self, id: &str) -> RecordStatus {
        if id == self.root.id().as_str() {
            return RecordStatus::Existent;
        }
        match self.records.get(id) {
            Some(Some(_)) => RecordStatus::Existent,
            Some(None) => RecordStatus::Nonexistent,
            None => RecordStatus::Unknown,
        }
    }

    /// Iterates existing records (root first, then by ascending id).
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        std::iter::once(&self.root).chain(self.records.values().flatten())
    }

    /// Non-root entries in ascending id order; `None` marks a tombstone.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (&DataId, Option<&Record>)> {
        self.records.iter().map(|(id, state)| (id, state.as_ref()))
    }

    /// Iterates tombstoned ids.
    pub fn tombstones(&self) -> impl Iterator<Item = &DataId> {
        self.records
            .iter()
            .filter_map(|(id, state)| state.is_none().then_some(id))
    }

    /// Number of existing records, root included.
    pub fn len(&self) -> usize {
        1 + self.records.values().filter(|r| r.is_some()).count()
    }

    /// A source always holds at least the root record.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Applies a change set on top of this source.
    pub(crate) fn apply(&mut self, changes: &ChangeSet) {
        for (id, change) in &changes.changes {
            match change {
                RecordChange::Delete => {
                    if !id.is_root() {
                        self.records.insert(id.clone(), None);
                    }
                }
                RecordChange::Upsert(delta) => {
                    let record = if id.is_root() {
                        &mut self.root
                    } else {
                        let slot = self.records.entry(id.clone()).or_insert(None);
                        if delta.fresh {
                            *slot = None;
                        }
                        let type_name = delta.type_name.clone().unwrap_or_default();
                        slot.get_or_insert_with(|| Record::new(id.clone(), type_name))
                    };
                    for (key, value) in &delta.fields {
                        match value {
                            Some(value) => record.set(key.clone(), value.clone()),
                            None => record.remove(key),
                        }
                    }
                }
            }
        }
    }

    /// Drops every non-root entry for which `keep` returns `false`, tombstones
    /// included. Returns the removed ids.
    pub(crate) fn retain_ids(&mut self, mut keep: impl FnMut(&DataId) -> bool) -> Vec<DataId> {
        let mut removed = Vec::new();
        self.records.retain(|id, _| {
            let kept = keep(id);
            if !kept {
                removed.push(id.clone());
            }
            kept
        });
        removed
    }
}

/// Buffered writes to one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RecordDelta {
    /// Type name, set when the record is created in this change set.
    pub(crate) type_name: Option<String>,
    /// The record was (re)created here; the underlying source is ignored.
    pub(crate) fresh: bool,
    /// Written fields; `None` removes the field.
    pub(crate) fields: BTreeMap<String, Option<FieldValue>>,
}

/// Buffered change to one record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordChange {
    Upsert(RecordDelta),
    Delete,
}

/// Field-level writes buffered by a transaction.
///
/// Deltas only carry what the transaction wrote, so replaying a change set
/// over a newer source (optimistic layers over a fresh server base) keeps
/// every field the transaction did not touch.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ChangeSet {
    pub(crate) changes: BTreeMap<DataId, RecordChange>,
}

impl ChangeSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &DataId> {
        self.changes.keys()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upsert(fresh: bool, type_name: Option<&str>, fields: &[(&str, Option<FieldValue>)]) -> RecordChange {
        RecordChange::Upsert(RecordDelta {
            type_name: type_name.map(str::to_owned),
            fresh,
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        })
    }

    #[test]
    fn apply_merges_fields_and_tombstones_deletes() {
        let mut source = RecordSource::default();
        let mut changes = ChangeSet::default();
        changes.changes.insert(
            DataId::new("u1"),
            upsert(true, Some("User"), &[("name", Some(FieldValue::Scalar(json!("a"))))]),
        );
        source.apply(&changes);

        let mut second = ChangeSet::default();
        second.changes.insert(
            DataId::new("u1"),
            upsert(false, None, &[("age", Some(FieldValue::Scalar(json!(3))))]),
        );
        second.changes.insert(DataId::new("u2"), RecordChange::Delete);
        source.apply(&second);

        let user = source.get("u1").expect("u1 exists");
        assert_eq!(user.type_name(), "User");
        assert_eq!(user.value("name"), Some(&json!("a")));
        assert_eq!(user.value("age"), Some(&json!(3)));
        assert_eq!(source.status("u2"), RecordStatus::Nonexistent);
        assert_eq!(source.status("u3"), RecordStatus::Unknown);
    }

    #[test]
    fn root_cannot_be_deleted() {
        let mut source = RecordSource::default();
        let mut changes = ChangeSet::default();
        changes.changes.insert(DataId::root(), RecordChange::Delete);
        source.apply(&changes);
        assert_eq!(source.status(crate::ident::ROOT_ID), RecordStatus::Existent);
        assert_eq!(source.len(), 1);
    }
}
