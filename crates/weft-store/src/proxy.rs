// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transactional record access.
//!
//! A [`RecordSourceProxy`] overlays a transaction's [`ChangeSet`] on a
//! committed [`RecordSource`]: reads consult the buffered writes first and fall
//! back to the source, writes only ever touch the change set. Nothing becomes
//! visible to other readers until the owning transaction commits.
use std::collections::BTreeMap;

use serde_json::Value;
use weft_ir::{format_storage_key, Variables};

use crate::ident::{DataId, ROOT_ID};
use crate::record::{FieldValue, Record};
use crate::source::{ChangeSet, RecordChange, RecordDelta, RecordSource, RecordStatus};
use crate::store::StoreError;

/// Storage key for `name` with optional arguments.
pub(crate) fn field_key(name: &str, args: Option<&Variables>) -> String {
    match args {
        Some(args) => format_storage_key(name, args),
        None => name.to_owned(),
    }
}

/// Mutable view over a record source for the duration of one transaction.
#[derive(Debug)]
pub struct RecordSourceProxy<'s> {
    base: &'s RecordSource,
    changes: &'s mut ChangeSet,
}

impl<'s> RecordSourceProxy<'s> {
    pub(crate) fn new(base: &'s RecordSource, changes: &'s mut ChangeSet) -> Self {
        Self { base, changes }
    }

    /// Presence of `id` as seen by this transaction.
    pub fn status(&self, id: &str) -> RecordStatus {
        match self.changes.changes.get(id) {
            Some(RecordChange::Delete) => RecordStatus::Nonexistent,
            Some(RecordChange::Upsert(_)) => RecordStatus::Existent,
            None => self.base.status(id),
        }
    }

    /// Returns `true` when `id` exists.
    pub fn exists(&self, id: &str) -> bool {
        self.status(id) == RecordStatus::Existent
    }

    /// Type name of `id`, if it exists.
    pub fn type_name(&self, id: &str) -> Option<&str> {
        match self.changes.changes.get(id) {
            Some(RecordChange::Delete) => None,
            Some(RecordChange::Upsert(delta)) => delta
                .type_name
                .as_deref()
                .or_else(|| self.base.get(id).map(Record::type_name)),
            None => self.base.get(id).map(Record::type_name),
        }
    }

    /// Raw field at `storage_key`.
    pub fn field(&self, id: &str, storage_key: &str) -> Option<&FieldValue> {
        match self.changes.changes.get(id) {
            Some(RecordChange::Delete) => None,
            Some(RecordChange::Upsert(delta)) => match delta.fields.get(storage_key) {
                Some(written) => written.as_ref(),
                None if delta.fresh => None,
                None => self.base.get(id).and_then(|r| r.get(storage_key)),
            },
            None => self.base.get(id).and_then(|r| r.get(storage_key)),
        }
    }

    /// Materialises `id` with every buffered write applied.
    pub fn record(&self, id: &str) -> Option<Record> {
        let type_name = self.type_name(id)?;
        let mut record = Record::new(DataId::new(id), type_name);
        let base_fields = match self.changes.changes.get(id) {
            Some(RecordChange::Upsert(delta)) if delta.fresh => None,
            _ => self.base.get(id),
        };
        if let Some(base) = base_fields {
            for (key, value) in base.fields() {
                record.set(key.clone(), value.clone());
            }
        }
        if let Some(RecordChange::Upsert(delta)) = self.changes.changes.get(id) {
            for (key, value) in &delta.fields {
                match value {
                    Some(value) => record.set(key.clone(), value.clone()),
                    None => record.remove(key),
                }
            }
        }
        Some(record)
    }

    /// Handle on an existing record.
    pub fn get(&mut self, id: &str) -> Option<RecordProxy<'_, 's>> {
        if !self.exists(id) {
            return None;
        }
        Some(RecordProxy {
            id: DataId::new(id),
            source: self,
        })
    }

    /// Handle on the root record.
    pub fn root(&mut self) -> RecordProxy<'_, 's> {
        RecordProxy {
            id: DataId::root(),
            source: self,
        }
    }

    /// Creates an empty record.
    ///
    /// # Errors
    /// [`StoreError::RecordExists`] when `id` already exists.
    pub fn create(
        &mut self,
        id: &DataId,
        type_name: &str,
    ) -> Result<RecordProxy<'_, 's>, StoreError> {
        if self.exists(id.as_str()) {
            return Err(StoreError::RecordExists(id.clone()));
        }
        self.insert_fresh(id, type_name);
        Ok(RecordProxy {
            id: id.clone(),
            source: self,
        })
    }

    /// Returns the existing record or creates it with `type_name`.
    pub fn get_or_create(&mut self, id: &DataId, type_name: &str) -> RecordProxy<'_, 's> {
        if !self.exists(id.as_str()) {
            self.insert_fresh(id, type_name);
        }
        RecordProxy {
            id: id.clone(),
            source: self,
        }
    }

    fn insert_fresh(&mut self, id: &DataId, type_name: &str) {
        self.changes.changes.insert(
            id.clone(),
            RecordChange::Upsert(RecordDelta {
                type_name: Some(type_name.to_owned()),
                fresh: true,
                fields: BTreeMap::new(),
            }),
        );
    }

    /// Deletes `id`, leaving a tombstone.
    ///
    /// # Errors
    /// [`StoreError::RootDeletion`] for the root record.
    pub fn delete(&mut self, id: &DataId) -> Result<(), StoreError> {
        if id.is_root() {
            return Err(StoreError::RootDeletion);
        }
        self.changes.changes.insert(id.clone(), RecordChange::Delete);
        Ok(())
    }

    /// Writes (`Some`) or clears (`None`) the raw field at `storage_key`.
    ///
    /// # Errors
    /// [`StoreError::MissingRecord`] when `id` does not exist.
    pub fn write_field(
        &mut self,
        id: &DataId,
        storage_key: &str,
        value: Option<FieldValue>,
    ) -> Result<(), StoreError> {
        if !self.exists(id.as_str()) {
            return Err(StoreError::MissingRecord(id.clone()));
        }
        let current_type = self.type_name(id.as_str()).map(str::to_owned);
        let change = self
            .changes
            .changes
            .entry(id.clone())
            .or_insert_with(|| {
                RecordChange::Upsert(RecordDelta {
                    type_name: current_type,
                    fresh: false,
                    fields: BTreeMap::new(),
                })
            });
        if let RecordChange::Upsert(delta) = change {
            delta.fields.insert(storage_key.to_owned(), value);
        }
        Ok(())
    }

    /// Scalar value of `name(args)` on `id`.
    pub fn value(&self, id: &str, name: &str, args: Option<&Variables>) -> Option<&Value> {
        self.field(id, &field_key(name, args))
            .and_then(FieldValue::as_scalar)
    }

    /// Writes a scalar value.
    ///
    /// # Errors
    /// [`StoreError::MissingRecord`] when `id` does not exist.
    pub fn set_value(
        &mut self,
        id: &DataId,
        name: &str,
        args: Option<&Variables>,
        value: Value,
    ) -> Result<(), StoreError> {
        self.write_field(id, &field_key(name, args), Some(FieldValue::Scalar(value)))
    }

    /// Linked record id of `name(args)` on `id`.
    pub fn linked_record(&self, id: &str, name: &str, args: Option<&Variables>) -> Option<DataId> {
        self.field(id, &field_key(name, args))
            .and_then(FieldValue::as_linked)
            .cloned()
    }

    /// Points `name(args)` on `id` at `target`.
    ///
    /// # Errors
    /// [`StoreError::MissingRecord`] when `id` does not exist.
    pub fn set_linked_record(
        &mut self,
        id: &DataId,
        name: &str,
        args: Option<&Variables>,
        target: &DataId,
    ) -> Result<(), StoreError> {
        self.write_field(
            id,
            &field_key(name, args),
            Some(FieldValue::Linked(target.clone())),
        )
    }

    /// Linked record ids of plural `name(args)` on `id`.
    pub fn linked_records(
        &self,
        id: &str,
        name: &str,
        args: Option<&Variables>,
    ) -> Option<Vec<Option<DataId>>> {
        self.field(id, &field_key(name, args))
            .and_then(FieldValue::as_linked_list)
            .map(<[Option<DataId>]>::to_vec)
    }

    /// Replaces plural `name(args)` on `id`.
    ///
    /// # Errors
    /// [`StoreError::MissingRecord`] when `id` does not exist.
    pub fn set_linked_records(
        &mut self,
        id: &DataId,
        name: &str,
        args: Option<&Variables>,
        targets: Vec<Option<DataId>>,
    ) -> Result<(), StoreError> {
        self.write_field(
            id,
            &field_key(name, args),
            Some(FieldValue::LinkedList(targets)),
        )
    }

    /// Copies every field of `source` onto `sink`, overwriting equal keys.
    ///
    /// # Errors
    /// [`StoreError::MissingRecord`] when either record does not exist.
    pub fn copy_fields(&mut self, source: &DataId, sink: &DataId) -> Result<(), StoreError> {
        let Some(record) = self.record(source.as_str()) else {
            return Err(StoreError::MissingRecord(source.clone()));
        };
        for (key, value) in record.fields() {
            self.write_field(sink, key, Some(value.clone()))?;
        }
        Ok(())
    }

    /// Ids of every existing record, in ascending order.
    pub fn record_ids(&self) -> Vec<DataId> {
        let mut ids: std::collections::BTreeSet<DataId> =
            self.base.records().map(|r| r.id().clone()).collect();
        ids.extend(self.changes.ids().cloned());
        ids.into_iter()
            .filter(|id| self.exists(id.as_str()))
            .collect()
    }

    /// Ids touched by this transaction so far.
    pub fn touched_ids(&self) -> impl Iterator<Item = &DataId> {
        self.changes.ids()
    }

    /// Identifier of the root record.
    pub fn root_id(&self) -> DataId {
        DataId::new(ROOT_ID)
    }
}

/// Handle on one record inside a transaction.
#[derive(Debug)]
pub struct RecordProxy<'p, 's> {
    id: DataId,
    source: &'p mut RecordSourceProxy<'s>,
}

impl<'s> RecordProxy<'_, 's> {
    /// Record identifier.
    pub fn id(&self) -> &DataId {
        &self.id
    }

    /// Type name of the record.
    pub fn type_name(&self) -> Option<&str> {
        self.source.type_name(self.id.as_str())
    }

    /// Scalar value of `name(args)`.
    pub fn value(&self, name: &str, args: Option<&Variables>) -> Option<&Value> {
        self.source.value(self.id.as_str(), name, args)
    }

    /// Writes a scalar value.
    ///
    /// # Errors
    /// [`StoreError::MissingRecord`] when the record was deleted.
    pub fn set_value(
        &mut self,
        name: &str,
        args: Option<&Variables>,
        value: Value,
    ) -> Result<&mut Self, StoreError> {
        self.source.set_value(&self.id, name, args, value)?;
        Ok(self)
    }

    /// Linked record id of `name(args)`.
    pub fn linked_record(&self, name: &str, args: Option<&Variables>) -> Option<DataId> {
        self.source.linked_record(self.id.as_str(), name, args)
    }

    /// Points `name(args)` at `target`.
    ///
    /// # Errors
    /// [`StoreError::MissingRecord`] when the record was deleted.
    pub fn set_linked_record(
        &mut self,
        name: &str,
        args: Option<&Variables>,
        target: &DataId,
    ) -> Result<&mut Self, StoreError> {
        self.source.set_linked_record(&self.id, name, args, target)?;
        Ok(self)
    }

    /// Linked record ids of plural `name(args)`.
    pub fn linked_records(
        &self,
        name: &str,
        args: Option<&Variables>,
    ) -> Option<Vec<Option<DataId>>> {
        self.source.linked_records(self.id.as_str(), name, args)
    }

    /// Replaces plural `name(args)`.
    ///
    /// # Errors
    /// [`StoreError::MissingRecord`] when the record was deleted.
    pub fn set_linked_records(
        &mut self,
        name: &str,
        args: Option<&Variables>,
        targets: Vec<Option<DataId>>,
    ) -> Result<&mut Self, StoreError> {
        self.source
            .set_linked_records(&self.id, name, args, targets)?;
        Ok(self)
    }

    /// Returns the record linked at `name(args)`, creating a client record of
    /// `type_name` and linking it when the field is empty.
    ///
    /// # Errors
    /// [`StoreError::MissingRecord`] when the record was deleted.
    pub fn get_or_create_linked_record(
        &mut self,
        name: &str,
        type_name: &str,
        args: Option<&Variables>,
    ) -> Result<DataId, StoreError> {
        if let Some(existing) = self.linked_record(name, args) {
            if self.source.exists(existing.as_str()) {
                return Ok(existing);
            }
        }
        let child = crate::ident::generate_client_id(&self.id, &field_key(name, args), None);
        self.source.get_or_create(&child, type_name);
        self.source.set_linked_record(&self.id, name, args, &child)?;
        Ok(child)
    }

    /// Copies every field of `source` onto this record.
    ///
    /// # Errors
    /// [`StoreError::MissingRecord`] when `source` does not exist.
    pub fn copy_fields_from(&mut self, source: &DataId) -> Result<&mut Self, StoreError> {
        self.source.copy_fields(source, &self.id)?;
        Ok(self)
    }

    /// Underlying source proxy, for navigating to other records.
    pub fn source(&mut self) -> &mut RecordSourceProxy<'s> {
        self.source
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_see_buffered_writes_but_base_is_untouched() {
        let base = RecordSource::default();
        let mut changes = ChangeSet::default();
        {
            let mut proxy = RecordSourceProxy::new(&base, &mut changes);
            let id = DataId::new("user:1");
            proxy
                .create(&id, "User")
                .expect("create")
                .set_value("name", None, json!("Ada"))
                .expect("set name");
            proxy
                .root()
                .set_linked_record("me", None, &id)
                .expect("link");
            assert_eq!(proxy.value("user:1", "name", None), Some(&json!("Ada")));
            assert_eq!(proxy.linked_record(ROOT_ID, "me", None), Some(id));
        }
        assert!(base.get("user:1").is_none());
        assert!(!changes.is_empty());
    }

    #[test]
    fn create_existing_record_fails_and_root_cannot_be_deleted() {
        let base = RecordSource::default();
        let mut changes = ChangeSet::default();
        let mut proxy = RecordSourceProxy::new(&base, &mut changes);
        let id = DataId::new("a");
        proxy.create(&id, "T").expect("first create");
        assert!(matches!(proxy.create(&id, "T"), Err(StoreError::RecordExists(_))));
        assert!(matches!(
            proxy.delete(&DataId::root()),
            Err(StoreError::RootDeletion)
        ));
    }

    #[test]
    fn recreate_after_delete_starts_empty() {
        let mut base = RecordSource::default();
        let mut seed = ChangeSet::default();
        {
            let mut proxy = RecordSourceProxy::new(&base, &mut seed);
            proxy
                .create(&DataId::new("a"), "T")
                .expect("create")
                .set_value("x", None, json!(1))
                .expect("set");
        }
        base.apply(&seed);

        let mut changes = ChangeSet::default();
        let mut proxy = RecordSourceProxy::new(&base, &mut changes);
        proxy.delete(&DataId::new("a")).expect("delete");
        assert_eq!(proxy.status("a"), RecordStatus::Nonexistent);
        proxy.create(&DataId::new("a"), "T").expect("recreate");
        assert_eq!(proxy.value("a", "x", None), None);
    }

    #[test]
    fn argument_keys_match_storage_key_format() {
        let base = RecordSource::default();
        let mut changes = ChangeSet::default();
        let mut proxy = RecordSourceProxy::new(&base, &mut changes);
        let mut args = Variables::new();
        args.insert("size".into(), json!(32));
        proxy
            .root()
            .set_value("avatar", Some(&args), json!("u.png"))
            .expect("set");
        assert!(proxy.field(ROOT_ID, "avatar(size:32)").is_some());
    }

    #[test]
    fn get_or_create_linked_record_synthesizes_client_id() {
        let base = RecordSource::default();
        let mut changes = ChangeSet::default();
        let mut proxy = RecordSourceProxy::new(&base, &mut changes);
        let child = proxy
            .root()
            .get_or_create_linked_record("settings", "Settings", None)
            .expect("create");
        assert_eq!(child.as_str(), "client:root:settings");
        assert_eq!(proxy.type_name(child.as_str()), Some("Settings"));
        let again = proxy
            .root()
            .get_or_create_linked_record("settings", "Settings", None)
            .expect("reuse");
        assert_eq!(again, child);
    }
}
