// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! weft developer CLI.
//!
//! Normalizes response payloads into a scratch record store, projects
//! operations back out of it, and computes field storage keys.
//!
//! # Usage
//! ```text
//! weft [--config <file>] [--config-dir <dir>] <command> [options]
//! ```
//!
//! The CLI exits with code `0` on success and non-zero on error. Output goes
//! to stdout; logs go to stderr.
#![forbid(unsafe_code)]

mod files;
mod render;

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use weft_ir::{handle_storage_key, storage_key, Operation, Selection, Variables};
use weft_store::{commit_payload, CommitRequest, DataId, Selector, Store, StoreConfig, Strictness};

use crate::render::Format;

#[derive(Parser, Debug)]
#[command(name = "weft", author, version, about = "weft record store developer CLI")]
struct Cli {
    /// Store config JSON; replaces the saved `weft_store` settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory of saved settings (defaults to the platform config dir).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize a payload and dump the resulting records.
    Normalize {
        #[command(flatten)]
        input: PayloadArgs,
        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Normalize a payload, then read the operation back out as JSON.
    Read {
        #[command(flatten)]
        input: PayloadArgs,
    },
    /// Print the storage key of a field or handle node.
    StorageKey {
        /// Selection node JSON.
        #[arg(long)]
        field: PathBuf,
        /// Variables JSON object.
        #[arg(long)]
        variables: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct PayloadArgs {
    /// Operation JSON as emitted by the compiler.
    #[arg(long)]
    operation: PathBuf,
    /// Response `data` JSON.
    #[arg(long)]
    payload: PathBuf,
    /// Variables JSON object.
    #[arg(long)]
    variables: Option<PathBuf>,
    /// Reject malformed payloads.
    #[arg(long, conflicts_with = "lenient")]
    strict: bool,
    /// Keep the well-formed parts of malformed payloads.
    #[arg(long)]
    lenient: bool,
}

impl PayloadArgs {
    fn strictness(&self) -> Option<Strictness> {
        if self.lenient {
            Some(Strictness::Lenient)
        } else if self.strict {
            Some(Strictness::Strict)
        } else {
            None
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadOutput<'a> {
    data: &'a Value,
    missing_data: bool,
    seen_records: &'a BTreeSet<DataId>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(io::stderr)
        .init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(cli, &mut out)?;
    out.flush()?;
    Ok(())
}

fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    match cli.command {
        Command::Normalize { input, format } => {
            let config = files::store_config(
                cli.config.as_deref(),
                cli.config_dir.as_deref(),
                input.strictness(),
            )?;
            let (store, _, _) = normalize(&input, config)?;
            render::write_records(out, store.source(), format)
        }
        Command::Read { input } => {
            let config = files::store_config(
                cli.config.as_deref(),
                cli.config_dir.as_deref(),
                input.strictness(),
            )?;
            let (store, operation, variables) = normalize(&input, config)?;
            let snapshot = store.lookup(&Selector::for_operation(&operation, &variables));
            let output = ReadOutput {
                data: &snapshot.data,
                missing_data: snapshot.is_missing_data,
                seen_records: &snapshot.seen_records,
            };
            serde_json::to_writer_pretty(&mut *out, &output)?;
            writeln!(out)?;
            Ok(())
        }
        Command::StorageKey {
            field: path,
            variables,
        } => {
            let node: Selection = files::read_json(&path)?;
            let variables = files::read_variables(variables.as_deref())?;
            let key = match &node {
                Selection::ScalarField(field) => storage_key(field, &variables),
                Selection::LinkedField(field) => storage_key(field, &variables),
                Selection::MatchField(field) => storage_key(field, &variables),
                Selection::ScalarHandle(handle) | Selection::LinkedHandle(handle) => {
                    handle_storage_key(handle, &variables)
                }
                Selection::InlineFragment(_)
                | Selection::Condition(_)
                | Selection::ClientExtension(_)
                | Selection::Defer(_)
                | Selection::Stream(_) => {
                    bail!("{} is not a field node", path.display())
                }
            };
            writeln!(out, "{key}")?;
            Ok(())
        }
    }
}

fn normalize(input: &PayloadArgs, config: StoreConfig) -> Result<(Store, Operation, Variables)> {
    let operation: Operation = files::read_json(&input.operation)?;
    let payload: Value = files::read_json(&input.payload)?;
    let variables = files::read_variables(input.variables.as_deref())?;

    let mut store = Store::new(config);
    let report = commit_payload(
        &mut store,
        CommitRequest::new(&operation, &variables, &payload),
    )
    .with_context(|| format!("normalizing {}", input.payload.display()))?;
    for err in &report.payload_errors {
        warn!(error = %err, "payload error");
    }
    for err in &report.handler_errors {
        warn!(error = %err, "handler error");
    }
    info!(
        operation = %operation.name,
        records = store.source().len(),
        hash = %report.receipt.snapshot.hash_hex(),
        "payload normalized"
    );
    Ok((store, operation, variables))
}
