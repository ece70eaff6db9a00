// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Payload commit pipeline.
//!
//! One call runs, inside a single transaction:
//! 1. normalization of the response (plus split operations for `@match`);
//! 2. field handlers for every handle payload;
//! 3. declarative mutation configs;
//! 4. the caller's updater.
//!
//! Strict normalization failures and updater errors abort the transaction.
//! Handler and config failures are collected in the [`CommitReport`].
use std::collections::VecDeque;
use std::error::Error as StdError;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use weft_ir::{storage_key, LinkedField, Operation, Selection, SplitOperation, Variables};

use crate::connection::ConnectionHandler;
use crate::handler::{apply_field_payloads, HandlerError, HandlerProvider, HandlerRegistry};
use crate::ident::{DataId, ROOT_ID};
use crate::mutation_config::{
    apply_mutation_configs, MutationConfig, MutationConfigError, RootFieldPayload,
};
use crate::normalizer::{
    normalize, normalize_split_operation, IncrementalPlaceholder, ModuleImportPayload,
    NormalizationOutcome, NormalizeError, NormalizeOptions, PayloadError,
};
use crate::proxy::RecordSourceProxy;
use crate::reader::Selector;
use crate::record::FieldValue;
use crate::store::{CommitReceipt, Store, StoreError};

/// Error type updaters may return.
pub type UpdaterError = Box<dyn StdError + Send + Sync>;

/// Caller-supplied store edit run last in the transaction, with the response.
pub type Updater<'a> =
    Box<dyn FnOnce(&mut RecordSourceProxy<'_>, &Value) -> Result<(), UpdaterError> + 'a>;

/// Fatal commit failure; the transaction was aborted.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The store refused the transaction.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The payload did not normalize.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    /// The updater failed.
    #[error("updater failed: {0}")]
    Updater(#[source] UpdaterError),
}

/// One payload to commit.
pub struct CommitRequest<'a> {
    selector: Selector,
    root_field: Option<&'a LinkedField>,
    response: &'a Value,
    configs: &'a [MutationConfig],
    split_operations: &'a [SplitOperation],
    handlers: Option<&'a dyn HandlerProvider>,
    updater: Option<Updater<'a>>,
}

impl std::fmt::Debug for CommitRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitRequest")
            .field("selector", &self.selector)
            .field("configs", &self.configs.len())
            .field("split_operations", &self.split_operations.len())
            .field("updater", &self.updater.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> CommitRequest<'a> {
    /// Response `data` for `operation` executed with `variables`.
    pub fn new(operation: &'a Operation, variables: &Variables, response: &'a Value) -> Self {
        Self {
            selector: Selector::for_operation(operation, variables),
            root_field: root_linked_field(operation),
            response,
            configs: &[],
            split_operations: &[],
            handlers: None,
            updater: None,
        }
    }

    /// Payload for an arbitrary selector, such as a deferred block.
    pub fn for_selector(selector: Selector, response: &'a Value) -> Self {
        Self {
            selector,
            root_field: None,
            response,
            configs: &[],
            split_operations: &[],
            handlers: None,
            updater: None,
        }
    }

    /// Declarative configs to run after the handlers.
    #[must_use]
    pub fn with_configs(mut self, configs: &'a [MutationConfig]) -> Self {
        self.configs = configs;
        self
    }

    /// Split operations available for `@match` imports.
    #[must_use]
    pub fn with_split_operations(mut self, splits: &'a [SplitOperation]) -> Self {
        self.split_operations = splits;
        self
    }

    /// Field handlers; the connection handler alone when unset.
    #[must_use]
    pub fn with_handlers(mut self, handlers: &'a dyn HandlerProvider) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Updater run last in the transaction.
    #[must_use]
    pub fn with_updater(
        mut self,
        updater: impl FnOnce(&mut RecordSourceProxy<'_>, &Value) -> Result<(), UpdaterError> + 'a,
    ) -> Self {
        self.updater = Some(Box::new(updater));
        self
    }
}

/// Result of a committed payload.
#[derive(Debug)]
pub struct CommitReport {
    /// Store receipt.
    pub receipt: CommitReceipt,
    /// Payload errors tolerated in lenient mode.
    pub payload_errors: Vec<PayloadError>,
    /// Field handler failures.
    pub handler_errors: Vec<HandlerError>,
    /// Mutation config failures.
    pub config_errors: Vec<MutationConfigError>,
    /// Deferred and streamed blocks still to arrive.
    pub incremental_placeholders: Vec<IncrementalPlaceholder>,
    /// `@match` imports without a matching split operation.
    pub module_imports: Vec<ModuleImportPayload>,
}

impl CommitReport {
    /// Whether every stage completed without reported errors.
    pub fn is_clean(&self) -> bool {
        self.payload_errors.is_empty()
            && self.handler_errors.is_empty()
            && self.config_errors.is_empty()
    }
}

struct Stages {
    outcome: NormalizationOutcome,
    handler_errors: Vec<HandlerError>,
    config_errors: Vec<MutationConfigError>,
}

/// Commits a server payload.
///
/// # Errors
/// [`CommitError`] when the transaction could not start, the payload was
/// rejected, or the updater failed. The store is untouched in every case.
#[instrument(level = "debug", skip_all, fields(data_id = %request.selector.data_id))]
pub fn commit_payload(
    store: &mut Store,
    request: CommitRequest<'_>,
) -> Result<CommitReport, CommitError> {
    run(store, request, false)
}

/// Applies a payload as an optimistic layer; revert it with
/// [`Store::revert_optimistic`] using `receipt.optimistic`.
///
/// # Errors
/// As [`commit_payload`].
#[instrument(level = "debug", skip_all, fields(data_id = %request.selector.data_id))]
pub fn apply_optimistic_payload(
    store: &mut Store,
    request: CommitRequest<'_>,
) -> Result<CommitReport, CommitError> {
    run(store, request, true)
}

fn run(
    store: &mut Store,
    request: CommitRequest<'_>,
    optimistic: bool,
) -> Result<CommitReport, CommitError> {
    let options = NormalizeOptions {
        strictness: store.config().strictness,
    };
    let interface = store.config().connection.clone();
    let connection = ConnectionHandler::new(interface.clone());
    let default_handlers = HandlerRegistry::with_connection(interface);
    let CommitRequest {
        selector,
        root_field,
        response,
        configs,
        split_operations,
        handlers,
        updater,
    } = request;
    let handlers: &dyn HandlerProvider = handlers.unwrap_or(&default_handlers);

    let body = |proxy: &mut RecordSourceProxy<'_>| -> Result<Stages, CommitError> {
        let mut outcome = normalize(proxy, &selector, response, options)?;
        resolve_module_imports(proxy, &mut outcome, split_operations, options)?;
        let handler_errors = apply_field_payloads(proxy, handlers, &outcome.field_payloads);

        let root_record =
            root_field.and_then(|field| root_field_record(proxy, field, &selector.variables));
        let root = RootFieldPayload {
            record: root_record.as_ref(),
            data: root_field.and_then(|field| response.get(field.response_key())),
        };
        let config_errors = apply_mutation_configs(proxy, &connection, configs, root);

        if let Some(updater) = updater {
            updater(proxy, response).map_err(CommitError::Updater)?;
        }
        Ok(Stages {
            outcome,
            handler_errors,
            config_errors,
        })
    };
    let (stages, receipt) = if optimistic {
        store.apply_optimistic_update(body)?
    } else {
        store.update(body)?
    };
    debug!(
        updated = receipt.updated_ids.len(),
        handler_errors = stages.handler_errors.len(),
        config_errors = stages.config_errors.len(),
        "payload committed"
    );
    Ok(CommitReport {
        receipt,
        payload_errors: stages.outcome.errors,
        handler_errors: stages.handler_errors,
        config_errors: stages.config_errors,
        incremental_placeholders: stages.outcome.incremental_placeholders,
        module_imports: stages.outcome.module_imports,
    })
}

fn resolve_module_imports(
    proxy: &mut RecordSourceProxy<'_>,
    outcome: &mut NormalizationOutcome,
    splits: &[SplitOperation],
    options: NormalizeOptions,
) -> Result<(), NormalizeError> {
    let mut queue: VecDeque<ModuleImportPayload> = outcome.module_imports.drain(..).collect();
    while let Some(import) = queue.pop_front() {
        let Some(split) = splits.iter().find(|split| split.name == import.fragment_name) else {
            outcome.module_imports.push(import);
            continue;
        };
        let mut nested = normalize_split_operation(proxy, split, &import, options)?;
        queue.extend(nested.module_imports.drain(..));
        outcome.extend(nested);
    }
    Ok(())
}

/// First linked field selected at the operation root.
pub fn root_linked_field(operation: &Operation) -> Option<&LinkedField> {
    operation.selections.iter().find_map(|selection| match selection {
        Selection::LinkedField(field) => Some(field),
        _ => None,
    })
}

/// Record the root field normalized into, if it is a singular link.
pub fn root_field_record(
    proxy: &RecordSourceProxy<'_>,
    field: &LinkedField,
    variables: &Variables,
) -> Option<DataId> {
    let key = storage_key(field, variables);
    proxy
        .field(ROOT_ID, &key)
        .and_then(FieldValue::as_linked)
        .cloned()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::{StoreConfig, Strictness};
    use serde_json::json;
    use weft_ir::ScalarField;

    fn operation() -> Operation {
        Operation::new(
            "ViewerQuery",
            vec![Selection::LinkedField(LinkedField::new(
                "viewer",
                vec![
                    Selection::ScalarField(ScalarField::new("id")),
                    Selection::ScalarField(ScalarField::new("name")),
                ],
            ))],
        )
    }

    #[test]
    fn updater_error_aborts_everything() {
        let mut store = Store::default();
        let before = store.snapshot();
        let op = operation();
        let data = json!({"viewer": {"id": "u1", "__typename": "User", "name": "ada"}});
        let request = CommitRequest::new(&op, &Variables::new(), &data)
            .with_updater(|_, _| Err("nope".into()));
        let err = commit_payload(&mut store, request).expect_err("updater fails");
        assert!(matches!(err, CommitError::Updater(_)));
        assert_eq!(store.snapshot(), before);
        assert!(store.get("u1").is_none());
    }

    #[test]
    fn updater_sees_normalized_root_field() {
        let mut store = Store::default();
        let op = operation();
        let data = json!({"viewer": {"id": "u1", "__typename": "User", "name": "ada"}});
        let request = CommitRequest::new(&op, &Variables::new(), &data).with_updater(
            |proxy, response| {
                assert_eq!(response["viewer"]["name"], json!("ada"));
                let viewer = proxy
                    .linked_record(ROOT_ID, "viewer", None)
                    .ok_or("viewer missing")?;
                proxy.set_value(&viewer, "seen", None, json!(true))?;
                Ok(())
            },
        );
        let report = commit_payload(&mut store, request).expect("commit");
        assert!(report.is_clean());
        assert_eq!(
            store.get("u1").and_then(|r| r.value("seen")),
            Some(&json!(true))
        );
    }

    #[test]
    fn lenient_commit_reports_payload_errors() {
        let mut store = Store::new(StoreConfig::with_strictness(Strictness::Lenient));
        let op = operation();
        let data = json!({"viewer": {"__typename": "User", "name": "ada"}});
        let report =
            commit_payload(&mut store, CommitRequest::new(&op, &Variables::new(), &data))
                .expect("lenient commit");
        assert_eq!(report.payload_errors.len(), 1);
        assert!(!report.is_clean());
    }
}
