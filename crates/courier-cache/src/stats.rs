// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-query-type latency and hit-rate statistics over a rolling window.

use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct Sample {
    latency: Duration,
    hit: bool,
}

/// Rolling statistics for one query type.
///
/// Only the last `window` samples are kept; `count` is cumulative.
#[derive(Debug, Clone)]
pub struct QueryStats {
    count: u64,
    window: usize,
    samples: VecDeque<Sample>,
}

impl QueryStats {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            count: 0,
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn record(&mut self, latency: Duration, hit: bool) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { latency, hit });
        self.count += 1;
    }

    pub fn summary(&self, query_type: &str) -> QueryStatsSummary {
        let mut latencies: Vec<Duration> = self.samples.iter().map(|s| s.latency).collect();
        latencies.sort_unstable();

        let n = latencies.len();
        let total: Duration = latencies.iter().sum();
        let hits = self.samples.iter().filter(|s| s.hit).count();

        QueryStatsSummary {
            query_type: query_type.to_string(),
            count: self.count,
            min: latencies.first().copied().unwrap_or_default(),
            max: latencies.last().copied().unwrap_or_default(),
            avg: if n == 0 { Duration::ZERO } else { total / n as u32 },
            p95: percentile(&latencies, 0.95),
            hit_rate: if n == 0 { 0.0 } else { hits as f64 / n as f64 },
        }
    }
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Point-in-time view of a query type's statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStatsSummary {
    pub query_type: String,
    /// Reads recorded since startup.
    pub count: u64,
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
    pub p95: Duration,
    /// Fraction of windowed reads served from cache.
    pub hit_rate: f64,
}
