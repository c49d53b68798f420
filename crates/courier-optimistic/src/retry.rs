// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff and cancellable retry timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use courier_config::OptimisticConfig;
use courier_core::OperationId;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// `min(base * 2^retry_count, max)`, for at most `max_retries` retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &OptimisticConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before the retry that follows `retry_count` earlier retries.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OptimisticConfig::default())
    }
}

/// What to do after an operation attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`; this will be retry number `attempt`.
    Retry { delay: Duration, attempt: u32 },
    /// The budget is spent or the error is not transient.
    Terminal,
}

/// Pending backoff timers keyed by operation.
#[derive(Debug, Default)]
pub struct RetryScheduler {
    timers: DashMap<OperationId, (u64, CancellationToken)>,
    generation: AtomicU64,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` unless cancelled first. Returns whether the full
    /// delay elapsed. A new wait for the same operation cancels the old one.
    pub async fn wait(&self, id: &OperationId, delay: Duration) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        if let Some((_, previous)) = self.timers.insert(id.clone(), (generation, token.clone())) {
            previous.cancel();
        }

        let elapsed = tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        };

        self.timers.remove_if(id, |_, (current, _)| *current == generation);
        elapsed
    }

    /// Cancels the timer for `id`. Safe to call any number of times.
    pub fn cancel(&self, id: &OperationId) -> bool {
        match self.timers.remove(id) {
            Some((_, (_, token))) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every pending timer.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.timers.retain(|_, (_, token)| {
            token.cancel();
            cancelled += 1;
            false
        });
        cancelled
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
