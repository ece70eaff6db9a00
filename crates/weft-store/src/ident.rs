// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Record identifiers.
use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix carried by every identifier the store synthesizes.
pub const CLIENT_ID_PREFIX: &str = "client:";

/// Identifier of the query root record.
pub const ROOT_ID: &str = "client:root";

/// Type name of the query root record.
pub const ROOT_TYPE: &str = "__Root";

/// Stable identifier of a normalized record.
///
/// Server objects use their global `id`; objects without one receive a
/// client id derived from the parent record and the field's storage key (see
/// [`generate_client_id`]). Client ids always start with [`CLIENT_ID_PREFIX`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataId(String);

impl DataId {
    /// Wraps a raw identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Identifier of the root record.
    pub fn root() -> Self {
        Self(ROOT_ID.to_owned())
    }

    /// Raw identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for identifiers synthesized by the store.
    pub fn is_client_id(&self) -> bool {
        self.0.starts_with(CLIENT_ID_PREFIX)
    }

    /// Returns `true` for the root record's identifier.
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }
}

impl Borrow<str> for DataId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DataId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DataId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for DataId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Synthesizes the id of a record that has no global identifier.
///
/// The result is `<parent>:<storage_key>` (plus `:<index>` for list items),
/// prefixed with [`CLIENT_ID_PREFIX`] unless the parent already is a client id.
/// The same parent, key, and index always produce the same id, which keeps
/// repeated normalization of one payload idempotent.
pub fn generate_client_id(parent: &DataId, storage_key: &str, index: Option<usize>) -> DataId {
    let mut key = format!("{}:{storage_key}", parent.as_str());
    if let Some(index) = index {
        key.push(':');
        key.push_str(&index.to_string());
    }
    if !key.starts_with(CLIENT_ID_PREFIX) {
        key.insert_str(0, CLIENT_ID_PREFIX);
    }
    DataId(key)
}
