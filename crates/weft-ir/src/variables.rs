// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Variable maps and argument resolution.
use serde_json::{Map, Value};

use crate::argument::{Argument, ArgumentDefinition};

/// Operation variables keyed by name.
pub type Variables = Map<String, Value>;

/// Resolves field arguments against `variables`.
///
/// Literals are copied; variable arguments take the variable's value. A
/// variable that is not present in `variables` is omitted from the result, so
/// it behaves like an argument the caller never passed.
pub fn argument_values(args: &[Argument], variables: &Variables) -> Variables {
    let mut values = Variables::new();
    for arg in args {
        match arg {
            Argument::Literal(lit) => {
                values.insert(lit.name.clone(), lit.value.clone());
            }
            Argument::Variable(var) => {
                if let Some(value) = variables.get(&var.variable_name) {
                    values.insert(var.name.clone(), value.clone());
                }
            }
        }
    }
    values
}

/// Computes the effective variables of an operation.
///
/// Each declared variable takes the supplied value when it is present and
/// non-null, otherwise the declaration's default. Undeclared variables are
/// dropped.
pub fn operation_variables(definitions: &[ArgumentDefinition], supplied: &Variables) -> Variables {
    let mut out = Variables::new();
    for def in definitions {
        let supplied_value = supplied.get(def.name()).filter(|v| !v.is_null());
        let value = match (def, supplied_value) {
            (_, Some(v)) => v.clone(),
            (ArgumentDefinition::LocalArgument(local), None) => local.default_value.clone(),
            (ArgumentDefinition::RootArgument(_), None) => Value::Null,
        };
        out.insert(def.name().to_owned(), value);
    }
    out
}
