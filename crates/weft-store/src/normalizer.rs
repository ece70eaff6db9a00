// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Response normalizer: flattens a server payload into records.
//!
//! The walk follows selections in declaration order and writes through a
//! [`RecordSourceProxy`], so every write lands in the caller's transaction.
//! Malformed data is reported per path; sibling subtrees keep normalizing.
//! Whether any error rejects the pass is decided by [`Strictness`].
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use weft_ir::{
    argument_values, format_storage_key, handle_storage_key, storage_key, Defer, HandleField,
    LinkedField, MatchField, Selection, SplitOperation, Stream, Variables,
};

use crate::config::Strictness;
use crate::handler::HandleFieldPayload;
use crate::ident::{generate_client_id, DataId};
use crate::proxy::RecordSourceProxy;
use crate::reader::{Selector, MATCH_COMPONENT_KEY, MATCH_FRAGMENT_KEY};
use crate::record::FieldValue;
use crate::store::StoreError;

/// Response key of the identifier field.
pub const ID_KEY: &str = "id";
/// Response key of the type name field.
pub const TYPENAME_KEY: &str = "__typename";

/// What went wrong at one payload path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadErrorKind {
    /// A linked field's value was not an object.
    #[error("expected an object")]
    ExpectedObject,
    /// A plural linked field's value was not a list.
    #[error("expected a list")]
    ExpectedList,
    /// The selection selects `id` but the object carries none.
    #[error("missing identifier")]
    MissingIdentifier,
    /// The identifier is neither a string nor a number.
    #[error("identifier must be a string or number, got {0}")]
    InvalidIdentifier(String),
    /// Neither `concreteType` nor `__typename` names the object's type.
    #[error("missing __typename")]
    MissingTypeName,
    /// The payload type disagrees with the record or the selection.
    #[error("type mismatch for {id}: expected {expected}, got {found}")]
    TypeMismatch {
        /// Record being normalized.
        id: DataId,
        /// Type already on record (or declared by the selection).
        expected: String,
        /// Type found in the payload.
        found: String,
    },
    /// A `Condition` variable is missing or not a boolean.
    #[error("condition variable ${0} is not a boolean")]
    InvalidCondition(String),
    /// A store write failed.
    #[error("store write failed: {0}")]
    Store(StoreError),
}

/// Payload error with the response path it occurred at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadError {
    /// Response keys and list indices from the payload root.
    pub path: Vec<String>,
    /// Failure.
    pub kind: PayloadErrorKind,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.kind)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.kind)
        }
    }
}

/// Normalization failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// The payload violated its selections (strict mode).
    #[error("malformed payload ({} error(s)){}", .0.len(), first_error(.0))]
    Malformed(Vec<PayloadError>),
    /// The pass could not start.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A split operation was applied to a module import for another fragment.
    #[error("split operation {found} does not normalize fragment {expected}")]
    SplitMismatch {
        /// Fragment named by the import.
        expected: String,
        /// Split operation supplied.
        found: String,
    },
}

fn first_error(errors: &[PayloadError]) -> String {
    errors
        .first()
        .map(|err| format!(": {err}"))
        .unwrap_or_default()
}

/// Normalization settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Error policy.
    pub strictness: Strictness,
}

/// Incremental block kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementalKind {
    /// `@defer`: the block arrives later as a whole.
    Defer,
    /// `@stream`: later list items arrive one by one.
    Stream,
}

/// Position where an incremental payload will be normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementalPlaceholder {
    /// Block kind.
    pub kind: IncrementalKind,
    /// Block label.
    pub label: String,
    /// Response path of the parent object.
    pub path: Vec<String>,
    /// Record the block's selections apply to.
    pub data_id: DataId,
    /// Variables in effect.
    pub variables: Variables,
}

/// Data for a `@match` field awaiting its split operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleImportPayload {
    /// Payload object of the matched field.
    pub data: Value,
    /// Record created for the matched object.
    pub data_id: DataId,
    /// Fragment (and split operation) name.
    pub fragment_name: String,
    /// Prop the fragment is exposed under.
    pub fragment_prop_name: String,
    /// Runtime type that selected the fragment.
    pub type_name: String,
    /// Response path of the matched field.
    pub path: Vec<String>,
    /// Variables in effect.
    pub variables: Variables,
}

/// Follow-up work and diagnostics from one normalization pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizationOutcome {
    /// Handle payloads for field handlers, in encounter order.
    pub field_payloads: Vec<HandleFieldPayload>,
    /// Deferred and streamed blocks.
    pub incremental_placeholders: Vec<IncrementalPlaceholder>,
    /// `@match` fields awaiting split operations.
    pub module_imports: Vec<ModuleImportPayload>,
    /// Errors tolerated in lenient mode.
    pub errors: Vec<PayloadError>,
}

impl NormalizationOutcome {
    /// Appends another pass's results.
    pub fn extend(&mut self, other: Self) {
        self.field_payloads.extend(other.field_payloads);
        self.incremental_placeholders
            .extend(other.incremental_placeholders);
        self.module_imports.extend(other.module_imports);
        self.errors.extend(other.errors);
    }
}

/// Normalizes `payload` against `selector` into `proxy`.
///
/// # Errors
/// [`NormalizeError::Malformed`] in strict mode when any payload error
/// occurred (the caller must abort the transaction);
/// [`NormalizeError::Store`] when `selector.data_id` does not exist.
pub fn normalize(
    proxy: &mut RecordSourceProxy<'_>,
    selector: &Selector,
    payload: &Value,
    options: NormalizeOptions,
) -> Result<NormalizationOutcome, NormalizeError> {
    if !proxy.exists(selector.data_id.as_str()) {
        return Err(StoreError::MissingRecord(selector.data_id.clone()).into());
    }
    let mut walker = Normalizer {
        proxy,
        variables: &selector.variables,
        path: Vec::new(),
        outcome: NormalizationOutcome::default(),
    };
    match payload {
        Value::Object(data) => walker.traverse(&selector.selections, &selector.data_id, data),
        _ => walker.error(PayloadErrorKind::ExpectedObject),
    }
    let outcome = walker.outcome;
    debug!(
        handles = outcome.field_payloads.len(),
        placeholders = outcome.incremental_placeholders.len(),
        imports = outcome.module_imports.len(),
        errors = outcome.errors.len(),
        "normalized"
    );
    if outcome.errors.is_empty() {
        return Ok(outcome);
    }
    match options.strictness {
        Strictness::Strict => Err(NormalizeError::Malformed(outcome.errors)),
        Strictness::Lenient => {
            for err in &outcome.errors {
                warn!(error = %err, "payload error tolerated");
            }
            Ok(outcome)
        }
    }
}

/// Normalizes a module import with the split operation of its fragment.
///
/// # Errors
/// As [`normalize`], plus [`NormalizeError::SplitMismatch`] when `split` is
/// not the import's fragment.
pub fn normalize_split_operation(
    proxy: &mut RecordSourceProxy<'_>,
    split: &SplitOperation,
    import: &ModuleImportPayload,
    options: NormalizeOptions,
) -> Result<NormalizationOutcome, NormalizeError> {
    if split.name != import.fragment_name {
        return Err(NormalizeError::SplitMismatch {
            expected: import.fragment_name.clone(),
            found: split.name.clone(),
        });
    }
    let selector = Selector::new(
        import.data_id.clone(),
        split.selections.clone(),
        import.variables.clone(),
    );
    normalize(proxy, &selector, &import.data, options)
}

struct Normalizer<'p, 's> {
    proxy: &'p mut RecordSourceProxy<'s>,
    variables: &'p Variables,
    path: Vec<String>,
    outcome: NormalizationOutcome,
}

impl Normalizer<'_, '_> {
    fn error(&mut self, kind: PayloadErrorKind) {
        self.outcome.errors.push(PayloadError {
            path: self.path.clone(),
            kind,
        });
    }

    fn write(&mut self, id: &DataId, key: &str, value: FieldValue) {
        if let Err(err) = self.proxy.write_field(id, key, Some(value)) {
            self.error(PayloadErrorKind::Store(err));
        }
    }

    fn traverse(&mut self, selections: &[Selection], id: &DataId, data: &Map<String, Value>) {
        for selection in selections {
            match selection {
                Selection::ScalarField(field) => {
                    if field.name == TYPENAME_KEY {
                        continue;
                    }
                    if let Some(value) = data.get(field.response_key()) {
                        let key = storage_key(field, self.variables);
                        self.write(id, &key, FieldValue::Scalar(value.clone()));
                    }
                }
                Selection::LinkedField(field) => {
                    let Some(value) = data.get(field.response_key()) else {
                        continue;
                    };
                    self.path.push(field.response_key().to_owned());
                    self.normalize_linked(field, id, value);
                    self.path.pop();
                }
                Selection::MatchField(field) => {
                    let Some(value) = data.get(field.response_key()) else {
                        continue;
                    };
                    self.path.push(field.response_key().to_owned());
                    self.normalize_match(field, id, value);
                    self.path.pop();
                }
                Selection::InlineFragment(fragment) => {
                    if self.proxy.type_name(id.as_str()) == Some(fragment.type_name.as_str()) {
                        self.traverse(&fragment.selections, id, data);
                    }
                }
                Selection::Condition(condition) => {
                    match self.variables.get(&condition.condition).and_then(Value::as_bool) {
                        Some(value) if value == condition.passing_value => {
                            self.traverse(&condition.selections, id, data);
                        }
                        Some(_) => {}
                        None => self.error(PayloadErrorKind::InvalidCondition(
                            condition.condition.clone(),
                        )),
                    }
                }
                Selection::ClientExtension(ext) => self.traverse(&ext.selections, id, data),
                Selection::Defer(defer) => self.normalize_defer(defer, id, data),
                Selection::Stream(stream) => self.normalize_stream(stream, id, data),
                Selection::ScalarHandle(handle) | Selection::LinkedHandle(handle) => {
                    self.record_handle(handle, id);
                }
            }
        }
    }

    fn is_enabled(&self, if_condition: Option<&str>) -> bool {
        if_condition
            .is_none_or(|var| self.variables.get(var).and_then(Value::as_bool) != Some(false))
    }

    fn normalize_defer(&mut self, defer: &Defer, id: &DataId, data: &Map<String, Value>) {
        if self.is_enabled(defer.if_condition.as_deref()) {
            self.outcome
                .incremental_placeholders
                .push(IncrementalPlaceholder {
                    kind: IncrementalKind::Defer,
                    label: defer.label.clone(),
                    path: self.path.clone(),
                    data_id: id.clone(),
                    variables: self.variables.clone(),
                });
        } else {
            self.traverse(&defer.selections, id, data);
        }
    }

    fn normalize_stream(&mut self, stream: &Stream, id: &DataId, data: &Map<String, Value>) {
        self.traverse(&stream.selections, id, data);
        if self.is_enabled(stream.if_condition.as_deref()) {
            self.outcome
                .incremental_placeholders
                .push(IncrementalPlaceholder {
                    kind: IncrementalKind::Stream,
                    label: stream.label.clone(),
                    path: self.path.clone(),
                    data_id: id.clone(),
                    variables: self.variables.clone(),
                });
        }
    }

    fn record_handle(&mut self, handle: &HandleField, id: &DataId) {
        let args = argument_values(&handle.args, self.variables);
        let field_key = format_storage_key(&handle.name, &args);
        let handle_key = handle_storage_key(handle, self.variables);
        self.outcome.field_payloads.push(HandleFieldPayload {
            args,
            data_id: id.clone(),
            field_key,
            handle: handle.handle.clone(),
            handle_key,
        });
    }

    fn normalize_linked(&mut self, field: &LinkedField, parent: &DataId, value: &Value) {
        let key = storage_key(field, self.variables);
        if value.is_null() {
            self.write(parent, &key, FieldValue::NULL);
            return;
        }
        if field.plural {
            self.normalize_plural(field, parent, &key, value);
            return;
        }
        let Value::Object(object) = value else {
            self.error(PayloadErrorKind::ExpectedObject);
            return;
        };
        let previous = self
            .proxy
            .linked_record(parent.as_str(), &key, None)
            .filter(|prev| self.proxy.exists(prev.as_str()));
        let Some(next) = self.resolve_record(field, parent, &key, None, previous, object) else {
            return;
        };
        self.traverse(&field.selections, &next, object);
        self.write(parent, &key, FieldValue::Linked(next));
    }

    fn normalize_plural(&mut self, field: &LinkedField, parent: &DataId, key: &str, value: &Value) {
        let Value::Array(items) = value else {
            self.error(PayloadErrorKind::ExpectedList);
            return;
        };
        let previous = self
            .proxy
            .linked_records(parent.as_str(), key, None)
            .unwrap_or_default();
        let mut ids = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            self.path.push(index.to_string());
            let resolved = match item {
                Value::Null => None,
                Value::Object(object) => {
                    let prev = previous.get(index).cloned().flatten();
                    let next =
                        self.resolve_record(field, parent, key, Some(index), prev, object);
                    if let Some(next) = &next {
                        self.traverse(&field.selections, next, object);
                    }
                    next
                }
                _ => {
                    self.error(PayloadErrorKind::ExpectedObject);
                    None
                }
            };
            ids.push(resolved);
            self.path.pop();
        }
        self.write(parent, key, FieldValue::LinkedList(ids));
    }

    /// Picks the id and type of a linked object and makes sure its record
    /// exists with that type. Errors are recorded and yield `None`.
    fn resolve_record(
        &mut self,
        field: &LinkedField,
        parent: &DataId,
        key: &str,
        index: Option<usize>,
        previous: Option<DataId>,
        object: &Map<String, Value>,
    ) -> Option<DataId> {
        let id = match payload_id(object) {
            Ok(Some(id)) => id,
            Ok(None) if field.selects_id() => {
                self.error(PayloadErrorKind::MissingIdentifier);
                return None;
            }
            Ok(None) => previous.unwrap_or_else(|| generate_client_id(parent, key, index)),
            Err(kind) => {
                self.error(kind);
                return None;
            }
        };
        let payload_type = object.get(TYPENAME_KEY).and_then(Value::as_str);
        let type_name = match (field.concrete_type.as_deref(), payload_type) {
            (Some(concrete), Some(found)) if concrete != found => {
                self.error(PayloadErrorKind::TypeMismatch {
                    id,
                    expected: concrete.to_owned(),
                    found: found.to_owned(),
                });
                return None;
            }
            (Some(concrete), _) => concrete,
            (None, Some(found)) => found,
            (None, None) => {
                self.error(PayloadErrorKind::MissingTypeName);
                return None;
            }
        };
        self.ensure_record(&id, type_name).then_some(id)
    }

    fn ensure_record(&mut self, id: &DataId, type_name: &str) -> bool {
        match self.proxy.type_name(id.as_str()) {
            Some(existing) if existing != type_name => {
                let expected = existing.to_owned();
                self.error(PayloadErrorKind::TypeMismatch {
                    id: id.clone(),
                    expected,
                    found: type_name.to_owned(),
                });
                false
            }
            Some(_) => true,
            None => {
                self.proxy.get_or_create(id, type_name);
                true
            }
        }
    }

    fn normalize_match(&mut self, field: &MatchField, parent: &DataId, value: &Value) {
        let key = storage_key(field, self.variables);
        let Value::Object(object) = value else {
            if value.is_null() {
                self.write(parent, &key, FieldValue::NULL);
            } else {
                self.error(PayloadErrorKind::ExpectedObject);
            }
            return;
        };
        let Some(type_name) = object.get(TYPENAME_KEY).and_then(Value::as_str) else {
            self.error(PayloadErrorKind::MissingTypeName);
            return;
        };
        let Some(entry) = field.matches_by_type.get(type_name) else {
            debug!(field = %field.name, type_name, "no match for runtime type");
            self.write(parent, &key, FieldValue::NULL);
            return;
        };
        let id = match payload_id(object) {
            Ok(Some(id)) => id,
            Ok(None) => self
                .proxy
                .linked_record(parent.as_str(), &key, None)
                .filter(|prev| self.proxy.exists(prev.as_str()))
                .unwrap_or_else(|| generate_client_id(parent, &key, None)),
            Err(kind) => {
                self.error(kind);
                return;
            }
        };
        if !self.ensure_record(&id, type_name) {
            return;
        }
        self.write(
            &id,
            MATCH_COMPONENT_KEY,
            FieldValue::Scalar(Value::String(entry.fragment_prop_name.clone())),
        );
        self.write(
            &id,
            MATCH_FRAGMENT_KEY,
            FieldValue::Scalar(Value::String(entry.fragment_name.clone())),
        );
        self.outcome.module_imports.push(ModuleImportPayload {
            data: value.clone(),
            data_id: id.clone(),
            fragment_name: entry.fragment_name.clone(),
            fragment_prop_name: entry.fragment_prop_name.clone(),
            type_name: type_name.to_owned(),
            path: self.path.clone(),
            variables: self.variables.clone(),
        });
        self.write(parent, &key, FieldValue::Linked(id));
    }
}

/// Identifier carried by a payload object.
fn payload_id(object: &Map<String, Value>) -> Result<Option<DataId>, PayloadErrorKind> {
    match object.get(ID_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(DataId::new(id.as_str()))),
        Some(Value::Number(id)) => Ok(Some(DataId::new(id.to_string()))),
        Some(other) => Err(PayloadErrorKind::InvalidIdentifier(other.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::source::{ChangeSet, RecordSource};
    use serde_json::json;
    use weft_ir::{Argument, InlineFragment, LinkedField, ScalarField};

    fn scalar(name: &str) -> Selection {
        Selection::ScalarField(ScalarField::new(name))
    }

    fn run(
        selections: Vec<Selection>,
        payload: &Value,
        strictness: Strictness,
    ) -> (RecordSource, Result<NormalizationOutcome, NormalizeError>) {
        let mut source = RecordSource::default();
        let mut changes = ChangeSet::default();
        let result = {
            let mut proxy = RecordSourceProxy::new(&source, &mut changes);
            let selector = Selector::new(DataId::root(), selections, Variables::new());
            normalize(&mut proxy, &selector, payload, NormalizeOptions { strictness })
        };
        if result.is_ok() {
            source.apply(&changes);
        }
        (source, result)
    }

    #[test]
    fn objects_without_id_get_client_ids() {
        let sels = vec![Selection::LinkedField(
            LinkedField::new("viewer", vec![scalar("name")]).with_concrete_type("Viewer"),
        )];
        let (source, result) = run(sels, &json!({"viewer": {"name": "v"}}), Strictness::Strict);
        result.expect("normalize");
        let viewer = source.get("client:root:viewer").expect("viewer record");
        assert_eq!(viewer.type_name(), "Viewer");
        assert_eq!(viewer.value("name"), Some(&json!("v")));
    }

    #[test]
    fn plural_preserves_order_and_nulls() {
        let sels = vec![Selection::LinkedField(
            LinkedField::plural("nodes", vec![scalar("id")])
                .with_args(vec![Argument::literal("ids", json!(["a", "b"]))]),
        )];
        let payload = json!({"nodes": [
            {"id": "a", "__typename": "User"}, null, {"id": "b", "__typename": "Page"}
        ]});
        let (source, result) = run(sels, &payload, Strictness::Strict);
        result.expect("normalize");
        let ids = source
            .root()
            .linked_ids(r#"nodes(ids:["a","b"])"#)
            .expect("plural link");
        assert_eq!(
            ids,
            &[Some(DataId::new("a")), None, Some(DataId::new("b"))]
        );
        assert_eq!(source.get("b").map(|r| r.type_name()), Some("Page"));
    }

    #[test]
    fn missing_id_is_malformed_when_selected() {
        let sels = vec![Selection::LinkedField(
            LinkedField::new("me", vec![scalar("id")]).with_concrete_type("User"),
        )];
        let (_, result) = run(sels, &json!({"me": {"name": "x"}}), Strictness::Strict);
        let Err(NormalizeError::Malformed(errors)) = result else {
            panic!("expected malformed payload");
        };
        assert_eq!(errors[0].path, vec!["me".to_owned()]);
        assert_eq!(errors[0].kind, PayloadErrorKind::MissingIdentifier);
    }

    #[test]
    fn lenient_keeps_siblings() {
        let sels = vec![
            Selection::LinkedField(LinkedField::new("me", vec![scalar("id")])),
            scalar("motd"),
        ];
        let (source, result) = run(
            sels,
            &json!({"me": "not an object", "motd": "hi"}),
            Strictness::Lenient,
        );
        let outcome = result.expect("lenient normalize");
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(source.root().value("motd"), Some(&json!("hi")));
        assert!(source.root().get("me").is_none());
    }

    #[test]
    fn inline_fragments_apply_by_record_type() {
        let sels = vec![Selection::LinkedField(LinkedField::new(
            "node",
            vec![
                scalar("id"),
                Selection::InlineFragment(InlineFragment {
                    type_name: "User".into(),
                    selections: vec![scalar("name")],
                }),
                Selection::InlineFragment(InlineFragment {
                    type_name: "Page".into(),
                    selections: vec![scalar("title")],
                }),
            ],
        ))];
        let payload =
            json!({"node": {"id": "u", "__typename": "User", "name": "n", "title": "t"}});
        let (source, result) = run(sels, &payload, Strictness::Strict);
        result.expect("normalize");
        let user = source.get("u").expect("user");
        assert_eq!(user.value("name"), Some(&json!("n")));
        assert!(user.value("title").is_none());
    }

    #[test]
    fn deferred_blocks_leave_placeholders() {
        let sels = vec![Selection::Defer(Defer {
            if_condition: None,
            label: "Q$defer$extra".into(),
            metadata: None,
            selections: vec![scalar("extra")],
        })];
        let (source, result) = run(sels, &json!({"extra": 1}), Strictness::Strict);
        let outcome = result.expect("normalize");
        assert_eq!(outcome.incremental_placeholders.len(), 1);
        assert_eq!(outcome.incremental_placeholders[0].kind, IncrementalKind::Defer);
        assert!(source.root().value("extra").is_none());
    }

    #[test]
    fn match_field_records_module_import() {
        let sels = vec![Selection::MatchField(
            MatchField::new("renderer").with_match(
                "MarkdownRenderer",
                "markdown",
                "MarkdownRenderer_data",
            ),
        )];
        let payload = json!({"renderer": {"__typename": "MarkdownRenderer", "markdown": "# hi"}});
        let (source, result) = run(sels, &payload, Strictness::Strict);
        let outcome = result.expect("normalize");
        assert_eq!(outcome.module_imports.len(), 1);
        let import = &outcome.module_imports[0];
        assert_eq!(import.data_id.as_str(), "client:root:renderer");
        let record = source.get("client:root:renderer").expect("renderer");
        assert_eq!(
            record.value(MATCH_FRAGMENT_KEY),
            Some(&json!("MarkdownRenderer_data"))
        );
    }

    #[test]
    fn store_write_failures_keep_their_path_when_collected() {
        let err = PayloadError {
            path: vec!["viewer".into(), "friends".into(), "0".into()],
            kind: PayloadErrorKind::Store(StoreError::RecordExists(DataId::new("user:1"))),
        };
        let collected = vec![err.clone(), err];
        assert_eq!(collected[0], collected[1]);
        assert_eq!(
            collected[0].to_string(),
            "viewer.friends.0: store write failed: record already exists: user:1"
        );
    }
}
