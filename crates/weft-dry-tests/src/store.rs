// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Store builder for seeding records in tests.

use serde_json::Value;
use weft_store::{DataId, FieldValue, Store, StoreConfig, StoreError, Strictness};

/// Builds a [`Store`] whose base already holds the given records.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use weft_dry_tests::StoreTestBuilder;
///
/// let store = StoreTestBuilder::new()
///     .with_record("item:1", "Item")
///     .with_value("item:1", "title", json!("first"))
///     .with_link("client:root", "featured", "item:1")
///     .build()
///     .expect("seed store");
/// assert!(store.get("item:1").is_some());
/// ```
#[derive(Debug, Default)]
pub struct StoreTestBuilder {
    config: StoreConfig,
    records: Vec<(DataId, String)>,
    fields: Vec<(DataId, String, FieldValue)>,
}

impl StoreTestBuilder {
    /// Builder with the default config and no records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `config` for the store.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the normalization strictness.
    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.config.strictness = strictness;
        self
    }

    /// Adds a record of `type_name`.
    pub fn with_record(mut self, id: &str, type_name: &str) -> Self {
        self.records.push((DataId::new(id), type_name.to_owned()));
        self
    }

    /// Sets a scalar field.
    pub fn with_value(self, id: &str, key: &str, value: Value) -> Self {
        self.with_field(id, key, FieldValue::Scalar(value))
    }

    /// Links `key` on `id` to `target`.
    pub fn with_link(self, id: &str, key: &str, target: &str) -> Self {
        self.with_field(id, key, FieldValue::Linked(DataId::new(target)))
    }

    /// Links plural `key` on `id` to `targets`.
    pub fn with_links(self, id: &str, key: &str, targets: &[Option<&str>]) -> Self {
        let ids = targets.iter().map(|t| t.map(DataId::new)).collect();
        self.with_field(id, key, FieldValue::LinkedList(ids))
    }

    fn with_field(mut self, id: &str, key: &str, value: FieldValue) -> Self {
        self.fields.push((DataId::new(id), key.to_owned(), value));
        self
    }

    /// Builds the store, committing the seed records in one transaction.
    pub fn build(self) -> Result<Store, StoreError> {
        let mut store = Store::new(self.config);
        if self.records.is_empty() && self.fields.is_empty() {
            return Ok(store);
        }
        let Self {
            records, fields, ..
        } = self;
        store.update(|proxy| {
            for (id, type_name) in &records {
                proxy.get_or_create(id, type_name);
            }
            for (id, key, value) in fields {
                proxy.write_field(&id, &key, Some(value))?;
            }
            Ok::<_, StoreError>(())
        })?;
        Ok(store)
    }
}
