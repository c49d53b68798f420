// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-through query cache in front of the persistent store.
//!
//! [`QueryCache`] keeps `{data, timestamp, ttl}` entries keyed by query
//! signature and records per-query-type latency and hit-rate statistics.
//! [`CachedStore`] wires it into the [`courier_core::MessageStore`] contract:
//! reads go through the cache, writes bypass it and invalidate.

pub mod cache;
pub mod stats;
pub mod store;

pub use cache::{CacheEntry, QueryCache};
pub use stats::{QueryStats, QueryStatsSummary};
pub use store::CachedStore;
