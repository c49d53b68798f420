// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock message store for deterministic testing.
//!
//! `MockStore` implements `MessageStore` over an in-memory table, records
//! every insert call with its (tokio) timestamp, and can be told to fail or
//! stall upcoming calls.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use courier_core::{
    AdapterType, CourierError, HealthStatus, MessageQuery, MessageRecord, MessageStore,
    PluginAdapter,
};

/// One call to `insert_messages`.
#[derive(Debug, Clone)]
pub struct InsertCall {
    pub at: Instant,
    pub rows: Vec<MessageRecord>,
    pub succeeded: bool,
}

impl InsertCall {
    pub fn contents(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.content.clone()).collect()
    }
}

/// An in-memory message store.
pub struct MockStore {
    rows: Mutex<Vec<MessageRecord>>,
    inserts: Mutex<Vec<InsertCall>>,
    failing_inserts: AtomicUsize,
    failing_selects: AtomicUsize,
    selects: AtomicUsize,
    latency: Mutex<Duration>,
    down_until: Mutex<Option<Instant>>,
    echo_rows: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            inserts: Mutex::new(Vec::new()),
            failing_inserts: AtomicUsize::new(0),
            failing_selects: AtomicUsize::new(0),
            selects: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
            down_until: Mutex::new(None),
            echo_rows: AtomicBool::new(true),
        }
    }

    /// Make the next `n` insert calls fail with a transient store error.
    pub fn fail_next_inserts(&self, n: usize) {
        self.failing_inserts.store(n, Ordering::SeqCst);
    }

    /// Make every insert call fail until [`MockStore::fail_next_inserts`] resets it.
    pub fn fail_all_inserts(&self) {
        self.failing_inserts.store(usize::MAX, Ordering::SeqCst);
    }

    /// Fail every insert that starts before `deadline` (tokio time).
    pub fn fail_inserts_until(&self, deadline: Instant) {
        *self.down_until.lock().unwrap() = Some(deadline);
    }

    /// When off, successful inserts persist but return no rows.
    pub fn set_echo_rows(&self, echo: bool) {
        self.echo_rows.store(echo, Ordering::SeqCst);
    }

    /// Make the next `n` select calls fail with a transient store error.
    pub fn fail_next_selects(&self, n: usize) {
        self.failing_selects.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `latency` (tokio time, so paused clocks apply).
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Every insert call so far, including failed ones.
    pub fn insert_calls(&self) -> Vec<InsertCall> {
        self.inserts.lock().unwrap().clone()
    }

    /// Contents of each successful batch, in flush order.
    pub fn committed_batches(&self) -> Vec<Vec<String>> {
        self.insert_calls()
            .into_iter()
            .filter(|c| c.succeeded)
            .map(|c| c.contents())
            .collect()
    }

    /// Every persisted row.
    pub fn rows(&self) -> Vec<MessageRecord> {
        self.rows.lock().unwrap().clone()
    }

    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockStore {
    fn name(&self) -> &str {
        "mock-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MockStore {
    async fn insert_messages(
        &self,
        rows: Vec<MessageRecord>,
    ) -> Result<Vec<MessageRecord>, CourierError> {
        self.delay().await;

        let down = self
            .down_until
            .lock()
            .unwrap()
            .is_some_and(|until| Instant::now() < until);
        let failed = down || Self::take_failure(&self.failing_inserts);
        self.inserts.lock().unwrap().push(InsertCall {
            at: Instant::now(),
            rows: rows.clone(),
            succeeded: !failed,
        });

        if failed {
            return Err(CourierError::store("mock insert failure"));
        }

        self.rows.lock().unwrap().extend(rows.iter().cloned());
        if self.echo_rows.load(Ordering::SeqCst) {
            Ok(rows)
        } else {
            Ok(Vec::new())
        }
    }

    async fn select_messages(
        &self,
        query: &MessageQuery,
    ) -> Result<Vec<MessageRecord>, CourierError> {
        self.delay().await;
        self.selects.fetch_add(1, Ordering::SeqCst);

        if Self::take_failure(&self.failing_selects) {
            return Err(CourierError::store("mock select failure"));
        }

        let mut matched: Vec<MessageRecord> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.created_at);
        if let Some(limit) = query.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        Ok(matched)
    }
}
