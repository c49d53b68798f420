// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Courier configuration system.

use courier_config::diagnostic::ConfigError;
use courier_config::model::CourierConfig;
use courier_config::{load_and_validate_str, load_config_from_path, load_config_from_str};

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_courier_config() {
    let toml = r#"
[batch]
batch_size = 10
batch_timeout_ms = 50
max_retries = 5

[channels]
typing_timeout_ms = 2000
channel_prefix = "inbox"
inbound_buffer = 64

[optimistic]
max_retries = 4
base_delay_ms = 500
max_delay_ms = 10000

[cache]
default_ttl_secs = 30
metrics_window = 50
latency_target_ms = 50

[telemetry]
log_level = "debug"
prometheus = true
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.batch.batch_size, 10);
    assert_eq!(config.batch.batch_timeout().as_millis(), 50);
    assert_eq!(config.batch.max_retries, 5);
    assert_eq!(config.channels.typing_timeout().as_secs(), 2);
    assert_eq!(config.channels.channel_prefix, "inbox");
    assert_eq!(config.channels.inbound_buffer, 64);
    assert_eq!(config.optimistic.max_retries, 4);
    assert_eq!(config.optimistic.base_delay_ms, 500);
    assert_eq!(config.optimistic.max_delay_ms, 10_000);
    assert_eq!(config.cache.default_ttl().as_secs(), 30);
    assert_eq!(config.cache.metrics_window, 50);
    assert_eq!(config.telemetry.log_level, "debug");
    assert!(config.telemetry.prometheus);
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config, CourierConfig::default());
    assert_eq!(config.batch.batch_size, 5);
    assert_eq!(config.batch.batch_timeout_ms, 25);
    assert_eq!(config.batch.max_retries, 3);
    assert_eq!(config.channels.typing_timeout_ms, 3000);
    assert_eq!(config.channels.channel_prefix, "conversation");
    assert_eq!(config.optimistic.base_delay_ms, 1000);
    assert_eq!(config.optimistic.max_delay_ms, 30_000);
    assert_eq!(config.cache.metrics_window, 100);
    assert_eq!(config.telemetry.log_level, "info");
    assert!(!config.telemetry.prometheus);
}

/// Unknown keys are rejected and mapped to a suggestion.
#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[batch]
batch_szie = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "batch_szie");
            assert_eq!(suggestion.as_deref(), Some("batch_size"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// Wrong value types are reported with the dotted key.
#[test]
fn invalid_type_reports_key_path() {
    let toml = r#"
[batch]
batch_size = "five"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject string batch size");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("batch_size"))
    ));
}

/// Values that parse but break semantic rules surface as validation errors.
#[test]
fn semantic_errors_surface_after_parse() {
    let toml = r#"
[batch]
batch_size = 0

[optimistic]
base_delay_ms = 5000
max_delay_ms = 1000
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| matches!(e, ConfigError::Validation { .. })));
}

/// Defaults round-trip through JSON unchanged.
#[test]
fn defaults_serialize_round_trip() {
    let config = CourierConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: CourierConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, parsed);
}

/// A config file on disk loads, and `COURIER_*` variables win over it.
#[test]
fn file_values_load_and_env_overrides_them() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courier.toml");
    std::fs::write(
        &path,
        "[batch]\nbatch_size = 10\nbatch_timeout_ms = 40\n\n[channels]\ntyping_timeout_ms = 5000\n",
    )
    .unwrap();

    figment::Jail::expect_with(|jail| {
        jail.set_env("COURIER_BATCH_BATCH_SIZE", "8");
        let config = load_config_from_path(&path)?;
        assert_eq!(config.batch.batch_size, 8);
        assert_eq!(config.batch.batch_timeout_ms, 40);
        assert_eq!(config.channels.typing_timeout_ms, 5000);
        assert_eq!(config.optimistic.max_retries, 3);
        Ok(())
    });
}
