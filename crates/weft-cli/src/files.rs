// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON inputs and store settings.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::warn;
use weft_app_core::config::ConfigService;
use weft_app_core::settings::{load_store_config, parse_store_config};
use weft_config_fs::FsConfigStore;
use weft_ir::Variables;
use weft_store::{StoreConfig, Strictness};

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

pub fn read_variables(path: Option<&Path>) -> Result<Variables> {
    path.map_or_else(|| Ok(Variables::new()), read_json)
}

/// Resolves store settings: an explicit file wins over the saved blob, and a
/// strictness flag wins over both.
pub fn store_config(
    file: Option<&Path>,
    config_dir: Option<&Path>,
    strictness: Option<Strictness>,
) -> Result<StoreConfig> {
    let mut config = match file {
        Some(path) => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            parse_store_config(&bytes)
                .with_context(|| format!("parsing store config {}", path.display()))?
        }
        None => saved_config(config_dir),
    };
    if let Some(strictness) = strictness {
        config.strictness = strictness;
    }
    Ok(config)
}

fn saved_config(config_dir: Option<&Path>) -> StoreConfig {
    let store = match config_dir {
        Some(dir) => FsConfigStore::at(dir),
        None => FsConfigStore::new(),
    };
    match store {
        Ok(store) => load_store_config(&ConfigService::new(store)),
        Err(err) => {
            warn!(error = %err, "config dir unavailable; using default store config");
            StoreConfig::default()
        }
    }
}
