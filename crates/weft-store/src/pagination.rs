// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pagination helpers over committed connections.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use weft_ir::Variables;

use crate::config::ConnectionInterface;
use crate::source::RecordSource;

/// Paging direction of a connection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// `first`/`after` paging.
    Forward,
    /// `last`/`before` paging.
    Backward,
}

/// Where a paginated connection lives and which variables page it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetadata {
    /// Response path from the fragment root to the connection field.
    pub path: Vec<String>,
    /// Paging direction.
    pub direction: Direction,
    /// Variable holding the cursor.
    pub cursor: String,
    /// Variable holding the page size.
    pub count: String,
}

/// Page info of a connection as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    /// More edges exist after `end_cursor`.
    pub has_next_page: bool,
    /// More edges exist before `start_cursor`.
    pub has_previous_page: bool,
    /// Cursor of the first edge.
    pub start_cursor: Option<String>,
    /// Cursor of the last edge.
    pub end_cursor: Option<String>,
}

impl PageInfo {
    /// Reads the page info linked from `connection`, if any.
    pub fn read(
        source: &RecordSource,
        connection: &str,
        interface: &ConnectionInterface,
    ) -> Option<Self> {
        let page_info_id = source
            .get(connection)?
            .linked_id(&interface.page_info)?
            .clone();
        let record = source.get(page_info_id.as_str())?;
        let flag = |key: &str| record.value(key).and_then(Value::as_bool).unwrap_or(false);
        let cursor = |key: &str| record.value(key).and_then(Value::as_str).map(str::to_owned);
        Some(Self {
            has_next_page: flag(&interface.has_next_page),
            has_previous_page: flag(&interface.has_previous_page),
            start_cursor: cursor(&interface.start_cursor),
            end_cursor: cursor(&interface.end_cursor),
        })
    }

    /// Whether another page exists in `direction`.
    pub fn has_more(&self, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.has_next_page && self.end_cursor.is_some(),
            Direction::Backward => self.has_previous_page && self.start_cursor.is_some(),
        }
    }
}

impl ConnectionMetadata {
    /// Variables fetching the next `page_size` edges after (or before) the
    /// loaded range, or `None` when the connection is exhausted.
    pub fn next_page_variables(
        &self,
        page_info: &PageInfo,
        variables: &Variables,
        page_size: usize,
    ) -> Option<Variables> {
        if !page_info.has_more(self.direction) {
            return None;
        }
        let cursor = match self.direction {
            Direction::Forward => page_info.end_cursor.clone(),
            Direction::Backward => page_info.start_cursor.clone(),
        }?;
        let mut next = variables.clone();
        next.insert(self.count.clone(), json!(page_size));
        next.insert(self.cursor.clone(), Value::String(cursor));
        Some(next)
    }
}
