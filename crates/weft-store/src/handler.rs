// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Field handler seam.
//!
//! The normalizer records a [`HandleFieldPayload`] for every handle selection;
//! after normalization the payloads are dispatched, in encounter order, to the
//! [`FieldHandler`] registered under the payload's handle name.
use std::collections::BTreeMap;

use thiserror::Error;
use tracing::warn;
use weft_ir::Variables;

use crate::config::ConnectionInterface;
use crate::connection::{ConnectionHandler, CONNECTION_HANDLE};
use crate::ident::DataId;
use crate::proxy::RecordSourceProxy;
use crate::store::StoreError;

/// Deferred work for one handle selection.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleFieldPayload {
    /// Resolved arguments of the annotated field.
    pub args: Variables,
    /// Record holding the field.
    pub data_id: DataId,
    /// Storage key of the raw server field.
    pub field_key: String,
    /// Handler name.
    pub handle: String,
    /// Storage key the handler writes to.
    pub handle_key: String,
}

/// Errors reported by field handlers. None of them abort a commit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// No handler is registered under this name.
    #[error("no handler registered for `{0}`")]
    UnknownHandle(String),
    /// The expected connection record is absent.
    #[error("unknown connection `{key}` on {record}")]
    UnknownConnection {
        /// Record the connection hangs off.
        record: DataId,
        /// Connection key.
        key: String,
    },
    /// A page was fetched from a cursor that is not the connection boundary.
    #[error("unexpected {direction} cursor {found:?} on {connection}, expected {expected:?}")]
    CursorMismatch {
        /// Client connection record.
        connection: DataId,
        /// `after` or `before`.
        direction: &'static str,
        /// Boundary cursor currently stored.
        expected: Option<String>,
        /// Cursor the page was fetched with.
        found: String,
    },
    /// A record the handler needs does not exist.
    #[error("record does not exist: {0}")]
    MissingRecord(DataId),
    /// A store write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Post-processes a field after normalization.
pub trait FieldHandler {
    /// Applies `payload` inside the current transaction.
    fn update(
        &self,
        proxy: &mut RecordSourceProxy<'_>,
        payload: &HandleFieldPayload,
    ) -> Result<(), HandlerError>;
}

/// Looks up field handlers by handle name.
pub trait HandlerProvider {
    /// Handler registered for `handle`.
    fn handler(&self, handle: &str) -> Option<&dyn FieldHandler>;
}

/// Name-keyed handler table.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Box<dyn FieldHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handles", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the connection handler under `connection`.
    pub fn with_connection(interface: ConnectionInterface) -> Self {
        let mut registry = Self::new();
        registry.register(CONNECTION_HANDLE, ConnectionHandler::new(interface));
        registry
    }

    /// Registers (or replaces) the handler for `handle`.
    pub fn register(&mut self, handle: impl Into<String>, handler: impl FieldHandler + 'static) {
        self.handlers.insert(handle.into(), Box::new(handler));
    }
}

impl HandlerProvider for HandlerRegistry {
    fn handler(&self, handle: &str) -> Option<&dyn FieldHandler> {
        self.handlers.get(handle).map(AsRef::as_ref)
    }
}

/// Dispatches every payload to its handler and returns the errors.
pub fn apply_field_payloads(
    proxy: &mut RecordSourceProxy<'_>,
    provider: &dyn HandlerProvider,
    payloads: &[HandleFieldPayload],
) -> Vec<HandlerError> {
    let mut errors = Vec::new();
    for payload in payloads {
        let result = match provider.handler(&payload.handle) {
            Some(handler) => handler.update(proxy, payload),
            None => Err(HandlerError::UnknownHandle(payload.handle.clone())),
        };
        if let Err(err) = result {
            warn!(handle = %payload.handle, key = %payload.handle_key, error = %err, "field handler failed");
            errors.push(err);
        }
    }
    errors
}
