// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-zero batch sizes and ordered retry delays.

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.batch.batch_size == 0 {
        fail("batch.batch_size must be at least 1".to_string());
    }

    if config.batch.batch_timeout_ms == 0 {
        fail("batch.batch_timeout_ms must be greater than 0".to_string());
    }

    if config.channels.typing_timeout_ms == 0 {
        fail("channels.typing_timeout_ms must be greater than 0".to_string());
    }

    if config.channels.channel_prefix.trim().is_empty() {
        fail("channels.channel_prefix must not be empty".to_string());
    } else if config.channels.channel_prefix.contains(':') {
        fail(format!(
            "channels.channel_prefix `{}` must not contain `:`",
            config.channels.channel_prefix
        ));
    }

    if config.channels.inbound_buffer == 0 {
        fail("channels.inbound_buffer must be at least 1".to_string());
    }

    if config.optimistic.base_delay_ms == 0 {
        fail("optimistic.base_delay_ms must be greater than 0".to_string());
    }

    if config.optimistic.base_delay_ms > config.optimistic.max_delay_ms {
        fail(format!(
            "optimistic.base_delay_ms ({}) must not exceed optimistic.max_delay_ms ({})",
            config.optimistic.base_delay_ms, config.optimistic.max_delay_ms
        ));
    }

    if config.cache.metrics_window == 0 {
        fail("cache.metrics_window must be at least 1".to_string());
    }

    let level = config.telemetry.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        fail(format!(
            "telemetry.log_level `{}` is not one of {}",
            config.telemetry.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &CourierConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        let config = CourierConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let mut config = CourierConfig::default();
        config.batch.batch_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("batch_size"))));
    }

    #[test]
    fn inverted_backoff_bounds_fail_validation() {
        let mut config = CourierConfig::default();
        config.optimistic.base_delay_ms = 60_000;
        let errors = messages(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("max_delay_ms"));
    }

    #[test]
    fn collects_every_error() {
        let mut config = CourierConfig::default();
        config.batch.batch_timeout_ms = 0;
        config.channels.channel_prefix = "a:b".to_string();
        config.cache.metrics_window = 0;
        config.telemetry.log_level = "loud".to_string();
        assert_eq!(messages(&config).len(), 4);
    }

    #[test]
    fn log_level_is_case_insensitive() {
        let mut config = CourierConfig::default();
        config.telemetry.log_level = "DEBUG".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
