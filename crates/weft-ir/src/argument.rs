// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Field arguments and operation argument definitions.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Argument passed to a field: either a literal baked in by the compiler or a
/// reference to an operation variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Argument {
    /// Compile-time constant value.
    Literal(LiteralArgument),
    /// Value resolved from the operation's variables at normalization time.
    Variable(VariableArgument),
}

impl Argument {
    /// Builds a literal argument.
    pub fn literal(name: impl Into<String>, value: Value) -> Self {
        Self::Literal(LiteralArgument {
            name: name.into(),
            type_name: None,
            value,
        })
    }

    /// Builds an argument bound to the operation variable `variable_name`.
    pub fn variable(name: impl Into<String>, variable_name: impl Into<String>) -> Self {
        Self::Variable(VariableArgument {
            name: name.into(),
            type_name: None,
            variable_name: variable_name.into(),
        })
    }

    /// Argument name as declared on the field.
    pub fn name(&self) -> &str {
        match self {
            Self::Literal(lit) => &lit.name,
            Self::Variable(var) => &var.name,
        }
    }

    /// Returns `true` when the value does not depend on variables.
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

/// Literal argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteralArgument {
    /// Argument name.
    pub name: String,
    /// Declared GraphQL input type, when the compiler emitted it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Literal value.
    #[serde(default)]
    pub value: Value,
}

/// Variable-bound argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableArgument {
    /// Argument name.
    pub name: String,
    /// Declared GraphQL input type, when the compiler emitted it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Name of the operation variable supplying the value.
    pub variable_name: String,
}

/// Variable declaration on an operation or fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ArgumentDefinition {
    /// Variable declared locally, with a default used when the caller omits it.
    LocalArgument(LocalArgument),
    /// Variable inherited from the root operation.
    RootArgument(RootArgument),
}

impl ArgumentDefinition {
    /// Declared variable name.
    pub fn name(&self) -> &str {
        match self {
            Self::LocalArgument(arg) => &arg.name,
            Self::RootArgument(arg) => &arg.name,
        }
    }
}

/// Locally declared variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalArgument {
    /// Variable name.
    pub name: String,
    /// Declared GraphQL input type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Default applied when the caller does not provide a non-null value.
    #[serde(default)]
    pub default_value: Value,
}

/// Variable taken from the enclosing root operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootArgument {
    /// Variable name.
    pub name: String,
    /// Declared GraphQL input type, if known.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}
