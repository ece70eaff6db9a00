// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Store configuration (strictness + connection field names).

use serde::{Deserialize, Serialize};

/// How the normalizer treats malformed payload data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Any payload error rejects the whole pass; the store is left untouched.
    #[default]
    Strict,
    /// Well-formed parts are kept; errors are reported alongside the commit.
    Lenient,
}

/// Field and type names used by connection handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionInterface {
    /// Edge cursor field.
    pub cursor: String,
    /// Connection edge list field.
    pub edges: String,
    /// Page info end cursor field.
    pub end_cursor: String,
    /// Page info forward flag.
    pub has_next_page: String,
    /// Page info backward flag.
    pub has_previous_page: String,
    /// Edge node field.
    pub node: String,
    /// Connection page info field.
    pub page_info: String,
    /// Type name of page info records.
    pub page_info_type: String,
    /// Page info start cursor field.
    pub start_cursor: String,
    /// Mutation input/output correlation field.
    pub client_mutation_id: String,
}

impl Default for ConnectionInterface {
    fn default() -> Self {
        Self {
            cursor: "cursor".into(),
            edges: "edges".into(),
            end_cursor: "endCursor".into(),
            has_next_page: "hasNextPage".into(),
            has_previous_page: "hasPreviousPage".into(),
            node: "node".into(),
            page_info: "pageInfo".into(),
            page_info_type: "PageInfo".into(),
            start_cursor: "startCursor".into(),
            client_mutation_id: "clientMutationId".into(),
        }
    }
}

/// Store-wide settings, loadable as a config blob.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Normalization strictness.
    pub strictness: Strictness,
    /// Connection field names.
    pub connection: ConnectionInterface,
}

impl StoreConfig {
    /// Default config with the given strictness.
    pub fn with_strictness(strictness: Strictness) -> Self {
        Self {
            strictness,
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_blob_fills_defaults() {
        let cfg: StoreConfig = serde_json::from_str(
            r#"{"strictness":"lenient","connection":{"edges":"items"}}"#,
        )
        .expect("decode config");
        assert_eq!(cfg.strictness, Strictness::Lenient);
        assert_eq!(cfg.connection.edges, "items");
        assert_eq!(cfg.connection.page_info, "pageInfo");
    }

    #[test]
    fn empty_blob_is_strict() {
        let cfg: StoreConfig = serde_json::from_str("{}").expect("decode config");
        assert_eq!(cfg, StoreConfig::default());
        assert_eq!(cfg.strictness, Strictness::Strict);
    }
}
