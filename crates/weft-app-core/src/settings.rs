// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted record store settings.

use tracing::{debug, warn};
use weft_store::StoreConfig;

use crate::config::{ConfigError, ConfigService, ConfigStore};

/// Config key the store settings live under.
pub const STORE_CONFIG_KEY: &str = "weft_store";

/// Loads the store settings, falling back to defaults when the blob is
/// missing, unreadable, or malformed.
pub fn load_store_config<S: ConfigStore>(service: &ConfigService<S>) -> StoreConfig {
    match service.load::<StoreConfig>(STORE_CONFIG_KEY) {
        Ok(Some(config)) => {
            debug!(strictness = ?config.strictness, "store config loaded");
            config
        }
        Ok(None) => StoreConfig::default(),
        Err(err) => {
            warn!(error = %err, "ignoring unreadable store config");
            StoreConfig::default()
        }
    }
}

/// Persists the store settings.
pub fn save_store_config<S: ConfigStore>(
    service: &ConfigService<S>,
    config: &StoreConfig,
) -> Result<(), ConfigError> {
    service.save(STORE_CONFIG_KEY, config)
}

/// Parses store settings from a standalone JSON document (`--config <file>`).
pub fn parse_store_config(bytes: &[u8]) -> Result<StoreConfig, ConfigError> {
    Ok(serde_json::from_slice(bytes)?)
}
