// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Storage key derivation.
//!
//! Format contract
//! - A field without non-null arguments is stored under its bare name.
//! - Otherwise the key is `name(a:<json>,b:<json>)`: arguments sorted by name,
//!   each value rendered as compact JSON after [`stable_copy`] (object keys
//!   sorted recursively). Null values are omitted.
//! - Handle keys start from `__<key>_<handle>` (or `__<field>_<handle>` when
//!   the key is empty) and include only the arguments listed in `filters`.
//!
//! Changing any of these rules changes record layout and invalidates stored
//! data and snapshot hashes.
use std::fmt::Write as _;

use serde_json::{Map, Value};

use crate::argument::Argument;
use crate::node::{HandleField, Selection, StorageField};
use crate::variables::{argument_values, Variables};

/// Returns a copy of `value` with every object's keys in ascending order.
pub fn stable_copy(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                if let Some(inner) = map.get(key) {
                    out.insert(key.clone(), stable_copy(inner));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(stable_copy).collect()),
        other => other.clone(),
    }
}

/// Formats `name` with resolved argument values.
pub fn format_storage_key(name: &str, values: &Variables) -> String {
    let mut entries: Vec<(&String, &Value)> =
        values.iter().filter(|(_, value)| !value.is_null()).collect();
    if entries.is_empty() {
        return name.to_owned();
    }
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut key = String::with_capacity(name.len() + 16 * entries.len());
    key.push_str(name);
    key.push('(');
    for (idx, (arg, value)) in entries.into_iter().enumerate() {
        if idx > 0 {
            key.push(',');
        }
        // Writing into a String cannot fail.
        let _ = write!(key, "{arg}:{}", stable_copy(value));
    }
    key.push(')');
    key
}

/// Storage key for `field`, preferring the compiler's precomputed key.
pub fn storage_key<F>(field: &F, variables: &Variables) -> String
where
    F: StorageField + ?Sized,
{
    if let Some(key) = field.static_storage_key() {
        return key.to_owned();
    }
    let args = field.args();
    if args.is_empty() {
        return field.name().to_owned();
    }
    format_storage_key(field.name(), &argument_values(args, variables))
}

/// Storage key computable without variables, or `None` when any argument is a
/// variable or there are no arguments.
pub fn static_storage_key(name: &str, args: &[Argument]) -> Option<String> {
    if args.is_empty() || !args.iter().all(Argument::is_static) {
        return None;
    }
    Some(format_storage_key(name, &argument_values(args, &Variables::new())))
}

/// Base name of a handle's storage slot.
pub fn relay_handle_key(handle: &str, key: &str, field_name: &str) -> String {
    if key.is_empty() {
        format!("__{field_name}_{handle}")
    } else {
        format!("__{key}_{handle}")
    }
}

/// Full storage key of a handle, including filter arguments.
pub fn handle_storage_key(handle: &HandleField, variables: &Variables) -> String {
    let base = relay_handle_key(&handle.handle, &handle.key, &handle.name);
    let Some(filters) = handle.filters.as_ref() else {
        return base;
    };
    if handle.args.is_empty() {
        return base;
    }
    let filtered: Vec<Argument> = handle
        .args
        .iter()
        .filter(|arg| filters.iter().any(|f| f == arg.name()))
        .cloned()
        .collect();
    format_storage_key(&base, &argument_values(&filtered, variables))
}

/// Fills in the storage key of every field whose arguments are all literals.
///
/// Compiler output normally carries these already; trees assembled by hand or
/// produced by older tooling may not.
pub fn precompute_storage_keys(selections: &mut [Selection]) {
    for selection in selections.iter_mut() {
        match selection {
            Selection::ScalarField(field) => {
                if field.storage_key.is_none() {
                    field.storage_key = static_storage_key(&field.name, &field.args);
                }
            }
            Selection::LinkedField(field) => {
                if field.storage_key.is_none() {
                    field.storage_key = static_storage_key(&field.name, &field.args);
                }
            }
            Selection::MatchField(field) => {
                if field.storage_key.is_none() {
                    field.storage_key = static_storage_key(&field.name, &field.args);
                }
            }
            Selection::InlineFragment(_)
            | Selection::Condition(_)
            | Selection::ClientExtension(_)
            | Selection::ScalarHandle(_)
            | Selection::LinkedHandle(_)
            | Selection::Defer(_)
            | Selection::Stream(_) => {}
        }
        if let Some(children) = selection.selections_mut() {
            precompute_storage_keys(children);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::node::{LinkedField, ScalarField};
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        match value {
            Value::Object(map) => map,
            _ => Variables::new(),
        }
    }

    #[test]
    fn bare_name_without_arguments() {
        assert_eq!(format_storage_key("name", &Variables::new()), "name");
    }

    #[test]
    fn arguments_sorted_and_nulls_dropped() {
        let values = vars(json!({"orderBy": "name", "first": 10, "after": null}));
        assert_eq!(
            format_storage_key("friends", &values),
            r#"friends(first:10,orderBy:"name")"#
        );
    }

    #[test]
    fn nested_objects_are_key_sorted() {
        let values = vars(json!({"filter": {"z": 1, "a": [ {"y": true, "b": false} ]}}));
        assert_eq!(
            format_storage_key("items", &values),
            r#"items(filter:{"a":[{"b":false,"y":true}],"z":1})"#
        );
    }

    #[test]
    fn variable_arguments_resolve_at_runtime() {
        let field = LinkedField::new("friends", vec![])
            .with_args(vec![Argument::variable("first", "count")]);
        assert!(field.storage_key.is_none());
        let key = storage_key(&field, &vars(json!({"count": 3})));
        assert_eq!(key, "friends(first:3)");
    }

    #[test]
    fn handle_key_uses_only_filters() {
        let handle = HandleField::new("friends", "connection", "Feed_friends")
            .with_args(vec![
                Argument::variable("first", "count"),
                Argument::literal("orderBy", json!("date")),
            ])
            .with_filters(vec!["orderBy".into()]);
        let key = handle_storage_key(&handle, &vars(json!({"count": 10})));
        assert_eq!(key, r#"__Feed_friends_connection(orderBy:"date")"#);
    }

    #[test]
    fn handle_key_falls_back_to_field_name() {
        let handle = HandleField::new("friends", "connection", "");
        assert_eq!(handle_storage_key(&handle, &Variables::new()), "__friends_connection");
    }

    #[test]
    fn precompute_walks_nested_selections() {
        let mut sels = vec![Selection::LinkedField(LinkedField::new(
            "viewer",
            vec![Selection::ScalarField(ScalarField {
                alias: None,
                name: "avatar".into(),
                args: vec![Argument::literal("size", json!(64))],
                storage_key: None,
            })],
        ))];
        precompute_storage_keys(&mut sels);
        let Selection::LinkedField(viewer) = &sels[0] else {
            panic!("expected linked field");
        };
        let Selection::ScalarField(avatar) = &viewer.selections[0] else {
            panic!("expected scalar field");
        };
        assert_eq!(avatar.storage_key.as_deref(), Some("avatar(size:64)"));
    }
}
