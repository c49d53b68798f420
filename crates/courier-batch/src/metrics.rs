// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cumulative batch processor statistics.

use std::time::Duration;

/// Snapshot of a processor's counters since it was spawned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchMetrics {
    /// Messages persisted successfully.
    pub messages_processed: u64,
    /// Successful flushes.
    pub batches_processed: u64,
    /// Running mean of successful flush durations.
    pub average_batch_time: Duration,
    /// Running mean of enqueue-to-persist time per message.
    pub average_message_time: Duration,
    /// Failed flushes (each failed attempt counts once).
    pub failures: u64,
    /// Messages resolved with a terminal error.
    pub terminal_failures: u64,
    pub last_batch_size: usize,
    /// Messages currently waiting in the queue.
    pub queue_depth: usize,
}

impl BatchMetrics {
    pub(crate) fn record_success(&mut self, size: usize, elapsed: Duration, waited: Duration) {
        let prior_batches = self.batches_processed;
        let prior_messages = self.messages_processed;

        self.batches_processed += 1;
        self.messages_processed += size as u64;
        self.last_batch_size = size;
        self.average_batch_time = running_mean(self.average_batch_time, prior_batches, elapsed, 1);
        self.average_message_time =
            running_mean(self.average_message_time, prior_messages, waited, size as u64);
    }

    pub(crate) fn record_failure(&mut self, size: usize) {
        self.failures += 1;
        self.last_batch_size = size;
    }
}

/// Folds `n` new samples whose sum is `total` into a mean over `count` samples.
fn running_mean(mean: Duration, count: u64, total: Duration, n: u64) -> Duration {
    let new_count = count + n;
    if new_count == 0 {
        return Duration::ZERO;
    }
    let sum = mean.as_nanos() * u128::from(count) + total.as_nanos();
    Duration::from_nanos((sum / u128::from(new_count)) as u64)
}
