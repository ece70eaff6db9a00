// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! weft-ir: normalization selection trees for the weft record store.
//!
//! A selection tree is immutable compiler output describing what an operation
//! selects. The store walks it to normalize payloads and to read data back;
//! this crate owns the node types and the storage-key rules both sides share.
#![forbid(unsafe_code)]

mod argument;
mod node;
mod storage_key;
mod variables;

/// Field arguments and variable declarations.
pub use argument::{
    Argument, ArgumentDefinition, LiteralArgument, LocalArgument, RootArgument, VariableArgument,
};
/// Selection tree node types.
pub use node::{
    ClientExtension, Condition, Defer, HandleField, InlineFragment, LinkedField, MatchEntry,
    MatchField, Operation, ScalarField, SelectableNode, Selection, SplitOperation, StorageField,
    Stream,
};
/// Storage key formatting.
pub use storage_key::{
    format_storage_key, handle_storage_key, precompute_storage_keys, relay_handle_key,
    stable_copy, static_storage_key, storage_key,
};
/// Variable maps and argument resolution.
pub use variables::{argument_values, operation_variables, Variables};
