// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for weft tools (config port, store settings).
//! Keeps CLI and host adapters thin.
#![forbid(unsafe_code)]

pub mod config;
pub mod settings;
