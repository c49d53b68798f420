// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./courier.toml` > `~/.config/courier/courier.toml` > `/etc/courier/courier.toml`
//! with environment variable overrides via `COURIER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CourierConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/courier/courier.toml";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "courier.toml";

/// Path of the per-user config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("courier/courier.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/courier/courier.toml` (system-wide)
/// 3. `~/.config/courier/courier.toml` (user XDG config)
/// 4. `./courier.toml` (local directory)
/// 5. `COURIER_*` environment variables
pub fn load_config() -> Result<CourierConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")`: `COURIER_BATCH_BATCH_SIZE` must
/// map to `batch.batch_size`, not `batch.batch.size`.
fn env_provider() -> Env {
    Env::prefixed("COURIER_").map(|key| {
        let key_str = key.as_str();
        let mapped = if let Some(rest) = key_str.strip_prefix("batch_") {
            format!("batch.{rest}")
        } else if let Some(rest) = key_str.strip_prefix("channels_") {
            format!("channels.{rest}")
        } else if let Some(rest) = key_str.strip_prefix("optimistic_") {
            format!("optimistic.{rest}")
        } else if let Some(rest) = key_str.strip_prefix("cache_") {
            format!("cache.{rest}")
        } else if let Some(rest) = key_str.strip_prefix("telemetry_") {
            format!("telemetry.{rest}")
        } else {
            key_str.to_string()
        };
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_vars_map_to_sections() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("COURIER_BATCH_BATCH_SIZE", "12");
            jail.set_env("COURIER_CHANNELS_TYPING_TIMEOUT_MS", "1500");
            jail.set_env("COURIER_TELEMETRY_LOG_LEVEL", "debug");

            let config: CourierConfig = Figment::new()
                .merge(Serialized::defaults(CourierConfig::default()))
                .merge(env_provider())
                .extract()?;

            assert_eq!(config.batch.batch_size, 12);
            assert_eq!(config.channels.typing_timeout_ms, 1500);
            assert_eq!(config.telemetry.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn local_file_is_picked_up() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                LOCAL_CONFIG_FILE,
                r#"
[batch]
batch_timeout_ms = 40
"#,
            )?;

            let config = load_config()?;
            assert_eq!(config.batch.batch_timeout_ms, 40);
            assert_eq!(config.batch.batch_size, 5);
            Ok(())
        });
    }
}
