// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier sync engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Outbound message batching.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Pub/sub channel management.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Optimistic update retry policy.
    #[serde(default)]
    pub optimistic: OptimisticConfig,

    /// Read-through query cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging and metrics export.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Batch processor configuration.
///
/// The defaults (5 messages or 25ms, whichever comes first) target
/// sub-100ms end-to-end delivery.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Flush as soon as this many messages are queued.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush this long after the oldest unflushed message arrived.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Store write attempts per message before a terminal failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl BatchConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_timeout_ms() -> u64 {
    25
}

fn default_max_retries() -> u32 {
    3
}

/// Channel manager configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelsConfig {
    /// Inactivity after which a typing indicator clears itself.
    #[serde(default = "default_typing_timeout_ms")]
    pub typing_timeout_ms: u64,

    /// Prefix of transport topic names (`{prefix}:{org}:{conversation}`).
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// Capacity of each channel's inbound event buffer.
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            typing_timeout_ms: default_typing_timeout_ms(),
            channel_prefix: default_channel_prefix(),
            inbound_buffer: default_inbound_buffer(),
        }
    }
}

impl ChannelsConfig {
    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }
}

fn default_typing_timeout_ms() -> u64 {
    3000
}

fn default_channel_prefix() -> String {
    "conversation".to_string()
}

fn default_inbound_buffer() -> usize {
    256
}

/// Optimistic coordinator retry policy.
///
/// Delay before retry `n` is `min(base_delay_ms * 2^n, max_delay_ms)`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OptimisticConfig {
    /// Attempts after the first failure before the entity turns `error`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for OptimisticConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Query cache configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL applied when a read does not pass its own.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Latency samples kept per query type.
    #[serde(default = "default_metrics_window")]
    pub metrics_window: usize,

    /// p95 read latency above which a warning is logged.
    #[serde(default = "default_latency_target_ms")]
    pub latency_target_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            metrics_window: default_metrics_window(),
            latency_target_ms: default_latency_target_ms(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn latency_target(&self) -> Duration {
        Duration::from_millis(self.latency_target_ms)
    }
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_metrics_window() -> usize {
    100
}

fn default_latency_target_ms() -> u64 {
    100
}

/// Logging and metrics export configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Install the Prometheus recorder at engine startup.
    #[serde(default)]
    pub prometheus: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
