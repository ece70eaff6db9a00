// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for weft crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`fixtures`] - Feed query, item mutations, and their payloads
//! - [`store`] - Store builder seeding records

pub mod config;
pub mod fixtures;
pub mod store;

// Re-export commonly used items at crate root for convenience
pub use config::InMemoryConfigStore;
pub use fixtures::{
    add_item_mutation, add_item_response, commit_feed_page, feed_connection_id, feed_cursors,
    feed_node_ids, feed_page, feed_query, feed_range_add, feed_range_delete, item_edge_field,
    node_delete, remove_item_mutation, remove_item_response, variables, PageFlags,
    FEED_CONNECTION_KEY, VIEWER_ID,
};
pub use store::StoreTestBuilder;
