// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Selection tree node types.
//!
//! The tree is a closed sum type: one [`Selection`] variant per compiler
//! `kind`. Consumers match exhaustively instead of dispatching on strings, so
//! adding a node kind is a compile error everywhere it must be handled.
//!
//! Serialized form mirrors compiler output: every node is a JSON object with a
//! `kind` tag and camelCase fields. Nullable lists (`args`, `filters`) decode
//! to empty vectors / `None` respectively.
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::argument::{Argument, ArgumentDefinition};
use crate::storage_key::static_storage_key;

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of a selection set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Selection {
    /// Leaf field holding a scalar (or scalar list) value.
    ScalarField(ScalarField),
    /// Field referencing one or more nested records.
    LinkedField(LinkedField),
    /// Field whose concrete type selects a fragment to load (`@match`).
    MatchField(MatchField),
    /// Type-conditioned group of selections applied to the current record.
    InlineFragment(InlineFragment),
    /// Selections included only when a boolean variable has a given value.
    Condition(Condition),
    /// Client-only schema extension; fields may be absent from server payloads.
    ClientExtension(ClientExtension),
    /// Handle attached to a scalar field.
    ScalarHandle(HandleField),
    /// Handle attached to a linked field (e.g. `@connection`).
    LinkedHandle(HandleField),
    /// Deferred selections (`@defer`).
    Defer(Defer),
    /// Streamed selections (`@stream`).
    Stream(Stream),
}

impl Selection {
    /// Nested selections for container nodes; empty for leaves.
    pub fn selections(&self) -> &[Selection] {
        match self {
            Self::LinkedField(field) => &field.selections,
            Self::InlineFragment(fragment) => &fragment.selections,
            Self::Condition(condition) => &condition.selections,
            Self::ClientExtension(ext) => &ext.selections,
            Self::Defer(defer) => &defer.selections,
            Self::Stream(stream) => &stream.selections,
            Self::ScalarField(_)
            | Self::MatchField(_)
            | Self::ScalarHandle(_)
            | Self::LinkedHandle(_) => &[],
        }
    }

    /// Mutable access to nested selections; `None` for leaves.
    pub fn selections_mut(&mut self) -> Option<&mut Vec<Selection>> {
        match self {
            Self::LinkedField(field) => Some(&mut field.selections),
            Self::InlineFragment(fragment) => Some(&mut fragment.selections),
            Self::Condition(condition) => Some(&mut condition.selections),
            Self::ClientExtension(ext) => Some(&mut ext.selections),
            Self::Defer(defer) => Some(&mut defer.selections),
            Self::Stream(stream) => Some(&mut stream.selections),
            Self::ScalarField(_)
            | Self::MatchField(_)
            | Self::ScalarHandle(_)
            | Self::LinkedHandle(_) => None,
        }
    }
}

/// Accessors shared by every node that stores a value under a storage key.
pub trait StorageField {
    /// Schema field name.
    fn name(&self) -> &str;
    /// Declared arguments.
    fn args(&self) -> &[Argument];
    /// Storage key precomputed by the compiler, when arguments are static.
    fn static_storage_key(&self) -> Option<&str>;
}

macro_rules! impl_storage_field {
    ($ty:ty) => {
        impl StorageField for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn args(&self) -> &[Argument] {
                &self.args
            }

            fn static_storage_key(&self) -> Option<&str> {
                self.storage_key.as_deref()
            }
        }

        impl $ty {
            /// Key under which the field appears in a response payload.
            pub fn response_key(&self) -> &str {
                self.alias.as_deref().unwrap_or(&self.name)
            }

            /// Sets the response alias.
            #[must_use]
            pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
                self.alias = Some(alias.into());
                self
            }

            /// Replaces the argument list and refreshes the static storage key.
            #[must_use]
            pub fn with_args(mut self, args: Vec<Argument>) -> Self {
                self.storage_key = static_storage_key(&self.name, &args);
                self.args = args;
                self
            }
        }
    };
}

/// Scalar leaf field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarField {
    /// Response alias, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Schema field name.
    pub name: String,
    /// Field arguments.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub args: Vec<Argument>,
    /// Precomputed storage key (static arguments only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
}

impl ScalarField {
    /// Builds an argument-less scalar field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            args: Vec::new(),
            storage_key: None,
        }
    }
}

impl_storage_field!(ScalarField);

/// Field linking to nested records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedField {
    /// Response alias, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Schema field name.
    pub name: String,
    /// Precomputed storage key (static arguments only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    /// Field arguments.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub args: Vec<Argument>,
    /// Concrete type when the field's type is not abstract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concrete_type: Option<String>,
    /// Whether the field returns a list.
    #[serde(default)]
    pub plural: bool,
    /// Selections applied to each linked record.
    #[serde(default)]
    pub selections: Vec<Selection>,
}

impl LinkedField {
    /// Builds a singular linked field.
    pub fn new(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            storage_key: None,
            args: Vec::new(),
            concrete_type: None,
            plural: false,
            selections,
        }
    }

    /// Builds a plural linked field.
    pub fn plural(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Self {
            plural: true,
            ..Self::new(name, selections)
        }
    }

    /// Sets the concrete type of linked records.
    #[must_use]
    pub fn with_concrete_type(mut self, type_name: impl Into<String>) -> Self {
        self.concrete_type = Some(type_name.into());
        self
    }

    /// Returns `true` when the nested selections request the `id` field,
    /// meaning linked records are expected to carry a global identifier.
    pub fn selects_id(&self) -> bool {
        self.selections.iter().any(|sel| match sel {
            Selection::ScalarField(field) => field.name == "id",
            _ => false,
        })
    }
}

impl_storage_field!(LinkedField);

/// Fragment chosen for one concrete type of a [`MatchField`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEntry {
    /// Prop name the fragment is exposed under.
    pub fragment_prop_name: String,
    /// Name of the fragment (and its split operation).
    pub fragment_name: String,
}

/// `@match` field: the runtime type picks which fragment normalizes the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchField {
    /// Response alias, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Schema field name.
    pub name: String,
    /// Precomputed storage key (static arguments only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    /// Field arguments.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub args: Vec<Argument>,
    /// Fragment per concrete type name.
    #[serde(default)]
    pub matches_by_type: BTreeMap<String, MatchEntry>,
}

impl MatchField {
    /// Builds a match field with no type entries.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            storage_key: None,
            args: Vec::new(),
            matches_by_type: BTreeMap::new(),
        }
    }

    /// Registers the fragment used for `type_name`.
    #[must_use]
    pub fn with_match(
        mut self,
        type_name: impl Into<String>,
        fragment_prop_name: impl Into<String>,
        fragment_name: impl Into<String>,
    ) -> Self {
        self.matches_by_type.insert(
            type_name.into(),
            MatchEntry {
                fragment_prop_name: fragment_prop_name.into(),
                fragment_name: fragment_name.into(),
            },
        );
        self
    }
}

impl_storage_field!(MatchField);

/// Inline fragment: selections applied when the record's type equals `type_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineFragment {
    /// Type condition.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Guarded selections.
    #[serde(default)]
    pub selections: Vec<Selection>,
}

/// `@include` / `@skip` guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Value the variable must equal for the selections to apply.
    pub passing_value: bool,
    /// Name of the boolean variable.
    pub condition: String,
    /// Guarded selections.
    #[serde(default)]
    pub selections: Vec<Selection>,
}

/// Client schema extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientExtension {
    /// Client-only selections.
    #[serde(default)]
    pub selections: Vec<Selection>,
}

/// Handle annotation: the named field handler post-processes the field's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleField {
    /// Response alias of the annotated field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Name of the annotated field.
    pub name: String,
    /// Arguments of the annotated field.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub args: Vec<Argument>,
    /// Handler name (e.g. `connection`).
    pub handle: String,
    /// Handler key (e.g. `Feed_friends`); empty means "use the field name".
    #[serde(default)]
    pub key: String,
    /// Argument names that participate in the handle storage key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<String>>,
}

impl HandleField {
    /// Builds a handle for `name` processed by `handle` under `key`.
    pub fn new(name: impl Into<String>, handle: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            args: Vec::new(),
            handle: handle.into(),
            key: key.into(),
            filters: None,
        }
    }

    /// Sets the annotated field's arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<Argument>) -> Self {
        self.args = args;
        self
    }

    /// Sets the filter argument names.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// `@defer` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defer {
    /// Boolean variable controlling deferral; `None` means always deferred.
    #[serde(rename = "if", default)]
    pub if_condition: Option<String>,
    /// Label identifying the incremental payload.
    pub label: String,
    /// Opaque compiler metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Deferred selections.
    #[serde(default)]
    pub selections: Vec<Selection>,
}

/// `@stream` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    /// Boolean variable controlling streaming; `None` means always streamed.
    #[serde(rename = "if", default)]
    pub if_condition: Option<String>,
    /// Label identifying the incremental payloads.
    pub label: String,
    /// Opaque compiler metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Streamed selections.
    #[serde(default)]
    pub selections: Vec<Selection>,
}

/// Normalization root for a query, mutation, or subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation name.
    pub name: String,
    /// Declared variables.
    #[serde(default)]
    pub argument_definitions: Vec<ArgumentDefinition>,
    /// Root selections.
    #[serde(default)]
    pub selections: Vec<Selection>,
}

impl Operation {
    /// Builds an operation without declared variables.
    pub fn new(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Self {
            name: name.into(),
            argument_definitions: Vec::new(),
            selections,
        }
    }

    /// Sets the declared variables.
    #[must_use]
    pub fn with_argument_definitions(mut self, defs: Vec<ArgumentDefinition>) -> Self {
        self.argument_definitions = defs;
        self
    }

    /// Name of the first root linked field, the payload root of a mutation
    /// or subscription.
    pub fn root_field_name(&self) -> Option<&str> {
        match self.selections.first() {
            Some(Selection::LinkedField(field)) => Some(&field.name),
            _ => None,
        }
    }

    /// First root linked field named `name`.
    pub fn root_field(&self, name: &str) -> Option<&LinkedField> {
        self.selections.iter().find_map(|sel| match sel {
            Selection::LinkedField(field) if field.name == name => Some(field),
            _ => None,
        })
    }
}

/// Separately loaded normalization artifact for a `@match` fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitOperation {
    /// Fragment name the split operation normalizes.
    pub name: String,
    /// Opaque compiler metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Selections applied to the matched record.
    #[serde(default)]
    pub selections: Vec<Selection>,
}

/// Any node that can start a normalization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SelectableNode {
    /// Full operation.
    Operation(Operation),
    /// Split operation for a `@match` fragment.
    SplitOperation(SplitOperation),
    /// Deferred block delivered as an incremental payload.
    Defer(Defer),
    /// Streamed block delivered as incremental payloads.
    Stream(Stream),
}

impl SelectableNode {
    /// Root selections of the node.
    pub fn selections(&self) -> &[Selection] {
        match self {
            Self::Operation(op) => &op.selections,
            Self::SplitOperation(split) => &split.selections,
            Self::Defer(defer) => &defer.selections,
            Self::Stream(stream) => &stream.selections,
        }
    }

    /// Node name (label for incremental blocks).
    pub fn name(&self) -> &str {
        match self {
            Self::Operation(op) => &op.name,
            Self::SplitOperation(split) => &split.name,
            Self::Defer(defer) => &defer.label,
            Self::Stream(stream) => &stream.label,
        }
    }
}
