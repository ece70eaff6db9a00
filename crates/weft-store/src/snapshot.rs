// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Snapshot type and state hash computation.
//!
//! Determinism contract
//! - The state hash is a BLAKE3 digest over a canonical byte stream encoding
//!   every visible record and tombstone.
//! - The root record is encoded first, then all other entries in ascending
//!   id order (byte-wise over the UTF-8 id). Fields follow in ascending
//!   storage-key order.
//! - Strings are encoded as an 8-byte little-endian length followed by the
//!   UTF-8 bytes. Counts use the same 8-byte little-endian form.
//! - Entry tags: `0` = tombstone (id only), `1` = record.
//! - Field value tags: `0` = scalar (canonical JSON with sorted object keys),
//!   `1` = link (id), `2` = link list (count, then per item `0` for null or
//!   `1` + id).
//!
//! Changing any of these rules changes every snapshot hash and must be
//! treated as a breaking change.
use blake3::Hasher;
use weft_ir::stable_copy;

use crate::ident::DataId;
use crate::record::{FieldValue, Record};
use crate::source::RecordSource;
use crate::tx::TxId;

/// 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Snapshot returned after a successful commit.
///
/// `hash` depends only on visible record state, so two stores holding the
/// same records report the same hash regardless of how they got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Hash of the visible state.
    pub hash: Hash,
    /// Hash of the state before the commit that produced this snapshot.
    pub parent: Option<Hash>,
    /// Transaction that produced this snapshot; `None` for the initial state.
    pub tx: Option<TxId>,
}

impl Snapshot {
    /// Identifier of the root record the snapshot is anchored at.
    pub fn root(&self) -> DataId {
        DataId::root()
    }

    /// Lower-case hex form of [`Snapshot::hash`].
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Computes the canonical state hash of `source`.
pub fn compute_state_hash(source: &RecordSource) -> Hash {
    let mut hasher = Hasher::new();
    encode_record(&mut hasher, source.root());
    for (id, entry) in source.entries() {
        match entry {
            Some(record) => encode_record(&mut hasher, record),
            None => {
                hasher.update(&[0]);
                encode_str(&mut hasher, id.as_str());
            }
        }
    }
    hasher.finalize().into()
}

fn encode_record(hasher: &mut Hasher, record: &Record) {
    hasher.update(&[1]);
    encode_str(hasher, record.id().as_str());
    encode_str(hasher, record.type_name());
    encode_len(hasher, record.field_count());
    for (key, value) in record.fields() {
        encode_str(hasher, key);
        match value {
            FieldValue::Scalar(json) => {
                hasher.update(&[0]);
                encode_str(hasher, &stable_copy(json).to_string());
            }
            FieldValue::Linked(id) => {
                hasher.update(&[1]);
                encode_str(hasher, id.as_str());
            }
            FieldValue::LinkedList(ids) => {
                hasher.update(&[2]);
                encode_len(hasher, ids.len());
                for item in ids {
                    match item {
                        Some(id) => {
                            hasher.update(&[1]);
                            encode_str(hasher, id.as_str());
                        }
                        None => {
                            hasher.update(&[0]);
                        }
                    }
                }
            }
        }
    }
}

fn encode_len(hasher: &mut Hasher, len: usize) {
    hasher.update(&(len as u64).to_le_bytes());
}

fn encode_str(hasher: &mut Hasher, value: &str) {
    encode_len(hasher, value.len());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::source::{ChangeSet, RecordChange, RecordDelta};
    use serde_json::json;

    fn with_field(value: FieldValue) -> RecordSource {
        let mut source = RecordSource::default();
        let mut changes = ChangeSet::default();
        changes.changes.insert(
            DataId::new("a"),
            RecordChange::Upsert(RecordDelta {
                type_name: Some("T".into()),
                fresh: true,
                fields: [("f".to_owned(), Some(value))].into_iter().collect(),
            }),
        );
        source.apply(&changes);
        source
    }

    #[test]
    fn scalar_and_link_with_same_text_hash_differently() {
        let scalar = with_field(FieldValue::Scalar(json!("b")));
        let link = with_field(FieldValue::Linked(DataId::new("b")));
        assert_ne!(compute_state_hash(&scalar), compute_state_hash(&link));
    }

    #[test]
    fn object_key_order_does_not_affect_hash() {
        let a = with_field(FieldValue::Scalar(json!({"x": 1, "y": 2})));
        let b = with_field(FieldValue::Scalar(json!({"y": 2, "x": 1})));
        assert_eq!(compute_state_hash(&a), compute_state_hash(&b));
    }

    #[test]
    fn tombstones_are_part_of_the_state() {
        let empty = RecordSource::default();
        let mut deleted = RecordSource::default();
        let mut changes = ChangeSet::default();
        changes.changes.insert(DataId::new("gone"), RecordChange::Delete);
        deleted.apply(&changes);
        assert_ne!(compute_state_hash(&empty), compute_state_hash(&deleted));
    }

    #[test]
    fn hash_hex_is_lowercase_and_full_width() {
        let snapshot = Snapshot {
            hash: [0xab; 32],
            parent: None,
            tx: None,
        };
        let rendered = snapshot.hash_hex();
        assert_eq!(rendered.len(), 64);
        assert!(rendered.starts_with("abab"));
    }
}
