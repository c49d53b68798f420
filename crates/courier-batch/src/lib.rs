// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batched, prioritized message persistence for the Courier sync engine.
//!
//! [`BatchProcessor::enqueue`] hands back a [`Completion`] that resolves once
//! the message is durably stored, or with an explicit terminal error after
//! the retry budget is spent. Messages are never dropped silently.

pub mod metrics;
pub mod processor;
pub mod queue;

pub use metrics::BatchMetrics;
pub use processor::BatchProcessor;
pub use queue::{Completion, PendingMessage, PendingQueue};
