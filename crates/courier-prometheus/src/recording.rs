// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use std::time::Duration;

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Courier metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "courier_messages_persisted_total",
        "Messages written to the store by the batch processor"
    );
    describe_counter!(
        "courier_batch_failures_total",
        "Batch flushes rejected by the store"
    );
    describe_counter!(
        "courier_messages_failed_total",
        "Messages that exhausted their retry budget"
    );
    describe_histogram!("courier_batch_size", "Messages per flushed batch");
    describe_histogram!(
        "courier_batch_duration_seconds",
        "Wall time of one batch flush"
    );
    describe_counter!(
        "courier_cache_reads_total",
        "Query cache reads by query type and outcome"
    );
    describe_histogram!(
        "courier_cache_read_seconds",
        "Query cache read latency including backing fetches"
    );
    describe_gauge!("courier_live_channels", "Channels with a live transport subscription");
    describe_gauge!(
        "courier_pending_operations",
        "Optimistic operations awaiting confirmation"
    );
}

/// Record a flush attempt.
pub fn record_flush(size: usize, elapsed: Duration, succeeded: bool) {
    metrics::histogram!("courier_batch_size").record(size as f64);
    metrics::histogram!("courier_batch_duration_seconds").record(elapsed.as_secs_f64());
    if succeeded {
        metrics::counter!("courier_messages_persisted_total").increment(size as u64);
    } else {
        metrics::counter!("courier_batch_failures_total").increment(1);
    }
}

/// Record messages resolved with a terminal failure.
pub fn record_terminal_failures(count: usize) {
    metrics::counter!("courier_messages_failed_total").increment(count as u64);
}

/// Record a cache read.
pub fn record_cache_read(query_type: &str, hit: bool, elapsed: Duration) {
    let outcome = if hit { "hit" } else { "miss" };
    metrics::counter!(
        "courier_cache_reads_total",
        "query_type" => query_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("courier_cache_read_seconds", "query_type" => query_type.to_string())
        .record(elapsed.as_secs_f64());
}

/// Set the number of live channels.
pub fn set_live_channels(count: usize) {
    metrics::gauge!("courier_live_channels").set(count as f64);
}

/// Set the number of optimistic operations awaiting confirmation.
pub fn set_pending_operations(count: usize) {
    metrics::gauge!("courier_pending_operations").set(count as f64);
}
