// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The batch processor and its flush worker.
//!
//! Callers enqueue over an unbounded channel; a single worker task owns the
//! queue, so at most one flush is ever in flight. A flush fires when the
//! queue reaches `batch_size` or when `batch_timeout` has passed since the
//! oldest unflushed message arrived, whichever comes first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use courier_config::BatchConfig;
use courier_core::{CourierError, MessageRecord, MessageStore, NewMessage, Priority};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::BatchMetrics;
use crate::queue::{Completion, PendingMessage, PendingQueue};

/// Accumulates message writes into bounded batches and persists each batch
/// with one multi-row insert.
pub struct BatchProcessor {
    tx: mpsc::UnboundedSender<PendingMessage>,
    shutdown: CancellationToken,
    metrics: Arc<RwLock<BatchMetrics>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BatchProcessor {
    /// Starts the flush worker on the current tokio runtime.
    pub fn spawn(config: &BatchConfig, store: Arc<dyn MessageStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let metrics = Arc::new(RwLock::new(BatchMetrics::default()));

        let worker = FlushWorker {
            rx,
            store,
            queue: PendingQueue::new(),
            deadline: None,
            retry_not_before: None,
            batch_size: config.batch_size.max(1),
            batch_timeout: config.batch_timeout(),
            max_retries: config.max_retries,
            metrics: Arc::clone(&metrics),
            shutdown: shutdown.clone(),
        };
        let handle = tokio::spawn(worker.run());

        info!(
            batch_size = config.batch_size,
            batch_timeout_ms = config.batch_timeout_ms,
            max_retries = config.max_retries,
            "batch processor started"
        );

        Self {
            tx,
            shutdown,
            metrics,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queues `message` for the next flush.
    ///
    /// The returned [`Completion`] resolves exactly once, with the persisted
    /// row or a terminal error. Fails with [`CourierError::Shutdown`] once
    /// the processor is shutting down.
    pub fn enqueue(
        &self,
        message: NewMessage,
        priority: Priority,
    ) -> Result<Completion, CourierError> {
        if self.shutdown.is_cancelled() {
            return Err(CourierError::Shutdown);
        }
        let (pending, completion) = PendingMessage::new(message, priority);
        self.tx
            .send(pending)
            .map_err(|_| CourierError::Shutdown)?;
        Ok(completion)
    }

    pub fn metrics(&self) -> BatchMetrics {
        self.metrics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Flushes everything still queued, then stops the worker.
    ///
    /// Messages enqueued after this call are rejected. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(error = %e, "batch worker panicked");
        }
    }
}

impl Drop for BatchProcessor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct FlushWorker {
    rx: mpsc::UnboundedReceiver<PendingMessage>,
    store: Arc<dyn MessageStore>,
    queue: PendingQueue,
    /// When the next timeout-driven flush is due, if anything is queued.
    deadline: Option<Instant>,
    /// Set by a failed flush; size-triggered flushes wait until it passes.
    retry_not_before: Option<Instant>,
    batch_size: usize,
    batch_timeout: Duration,
    max_retries: u32,
    metrics: Arc<RwLock<BatchMetrics>>,
    shutdown: CancellationToken,
}

impl FlushWorker {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                received = self.rx.recv() => match received {
                    Some(message) => {
                        self.accept(message);
                        while let Ok(message) = self.rx.try_recv() {
                            self.accept(message);
                        }
                        while self.queue.len() >= self.batch_size && !self.backing_off() {
                            if !self.flush().await {
                                break;
                            }
                        }
                    }
                    None => break,
                },
                _ = timer => {
                    self.flush().await;
                }
            }
        }

        self.drain().await;
    }

    fn backing_off(&self) -> bool {
        self.retry_not_before.is_some_and(|at| Instant::now() < at)
    }

    fn accept(&mut self, message: PendingMessage) {
        if self.queue.is_empty() {
            self.deadline = Some(message.enqueued_at + self.batch_timeout);
        }
        self.queue.push(message);
        self.publish_depth();
    }

    /// Writes one batch. Returns whether the store accepted it.
    async fn flush(&mut self) -> bool {
        let batch = self.queue.take_batch(self.batch_size);
        if batch.is_empty() {
            self.deadline = None;
            return true;
        }

        let size = batch.len();
        let rows: Vec<MessageRecord> = batch.iter().map(PendingMessage::to_record).collect();
        let started = Instant::now();
        let result = self.store.insert_messages(rows.clone()).await;
        let elapsed = started.elapsed();

        #[cfg(feature = "prometheus")]
        courier_prometheus::record_flush(size, elapsed, result.is_ok());

        let succeeded = match result {
            Ok(persisted) => {
                debug!(batch_size = size, elapsed_ms = elapsed.as_millis() as u64, "batch flushed");
                self.complete(batch, rows, persisted, elapsed);
                self.retry_not_before = None;
                self.deadline = self.queue.oldest_enqueued().map(|t| t + self.batch_timeout);
                true
            }
            Err(e) => {
                warn!(batch_size = size, error = %e, "batch flush failed");
                self.fail(batch, &e);
                let retry_at = Instant::now() + self.batch_timeout;
                self.retry_not_before = Some(retry_at);
                self.deadline = (!self.queue.is_empty()).then_some(retry_at);
                false
            }
        };
        self.publish_depth();
        succeeded
    }

    fn complete(
        &mut self,
        batch: Vec<PendingMessage>,
        sent: Vec<MessageRecord>,
        persisted: Vec<MessageRecord>,
        elapsed: Duration,
    ) {
        let now = Instant::now();
        let size = batch.len();
        let waited: Duration = batch.iter().map(|m| now - m.enqueued_at).sum();

        let mut by_id: HashMap<_, _> = persisted.into_iter().map(|r| (r.id.clone(), r)).collect();
        for (message, fallback) in batch.into_iter().zip(sent) {
            // An atomic insert either stored every row or none; a store that
            // echoes fewer rows still persisted what was sent.
            let row = by_id.remove(&message.id).unwrap_or(fallback);
            message.resolve(Ok(row));
        }

        self.metrics
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .record_success(size, elapsed, waited);
    }

    fn fail(&mut self, batch: Vec<PendingMessage>, cause: &CourierError) {
        let size = batch.len();
        let mut retry = Vec::with_capacity(size);
        let mut terminal = 0usize;

        for mut message in batch {
            message.retry_count += 1;
            if message.retry_count >= self.max_retries {
                error!(
                    message_id = %message.id,
                    conversation_id = %message.message.conversation_id,
                    attempts = message.retry_count,
                    error = %cause,
                    "message write failed permanently"
                );
                let attempts = message.retry_count;
                message.resolve(Err(CourierError::RetriesExhausted {
                    attempts,
                    last_error: cause.to_string(),
                }));
                terminal += 1;
            } else {
                retry.push(message);
            }
        }
        self.queue.requeue_front(retry);

        #[cfg(feature = "prometheus")]
        courier_prometheus::record_terminal_failures(terminal);

        let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        metrics.record_failure(size);
        metrics.terminal_failures += terminal as u64;
    }

    /// Flushes until the queue is empty or the store fails, then resolves
    /// anything left with [`CourierError::Shutdown`].
    async fn drain(&mut self) {
        self.rx.close();
        while let Ok(message) = self.rx.try_recv() {
            self.accept(message);
        }

        if !self.queue.is_empty() {
            info!(queued = self.queue.len(), "flushing queued messages before shutdown");
        }
        while !self.queue.is_empty() {
            if !self.flush().await {
                break;
            }
        }

        for message in self.queue.drain_all() {
            message.resolve(Err(CourierError::Shutdown));
        }
        self.deadline = None;
        self.publish_depth();
        debug!("batch worker stopped");
    }

    fn publish_depth(&self) {
        self.metrics
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .queue_depth = self.queue.len();
    }
}
