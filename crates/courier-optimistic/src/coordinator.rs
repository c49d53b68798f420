// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The optimistic update coordinator.
//!
//! Visible state is an immutable [`InboxState`] behind an `ArcSwap`: readers
//! take a snapshot without locking, writers clone, mutate and swap while
//! holding the ledger lock. There is only ever one writer, so an operation's
//! state change and its ledger entry move together.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use courier_config::OptimisticConfig;
use courier_core::{Conversation, CourierError, MessageRecord, OperationId};
use tracing::{debug, info, warn};

use crate::operation::{Operation, OptimisticEntity, RollbackData, ServerEntity};
use crate::reducer;
use crate::retry::{RetryDecision, RetryPolicy, RetryScheduler};
use crate::state::{InboxState, OptimisticMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// Awaiting confirmation, possibly between retries.
    Pending,
    /// Out of retries; waiting for the user to retry or dismiss.
    Failed,
}

/// A staged operation with the snapshot that undoes it.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub operation: Operation,
    pub rollback: RollbackData,
    pub status: OperationStatus,
}

type Ledger = HashMap<OperationId, PendingOperation>;

fn not_found(id: &OperationId) -> CourierError {
    CourierError::OperationNotFound { id: id.to_string() }
}

pub struct OptimisticCoordinator {
    state: ArcSwap<InboxState>,
    ledger: Mutex<Ledger>,
    policy: RetryPolicy,
    scheduler: RetryScheduler,
}

impl OptimisticCoordinator {
    pub fn new(config: &OptimisticConfig) -> Self {
        Self::with_state(config, InboxState::default())
    }

    /// Starts from previously loaded state.
    pub fn with_state(config: &OptimisticConfig, state: InboxState) -> Self {
        Self {
            state: ArcSwap::from_pointee(state),
            ledger: Mutex::new(HashMap::new()),
            policy: RetryPolicy::from_config(config),
            scheduler: RetryScheduler::new(),
        }
    }

    /// The current visible state. Never blocks.
    pub fn snapshot(&self) -> Arc<InboxState> {
        self.state.load_full()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `f` against a private copy of the state and publishes the copy
    /// only if `f` succeeds.
    fn write<R>(
        &self,
        f: impl FnOnce(&mut Ledger, &mut InboxState) -> Result<R, CourierError>,
    ) -> Result<R, CourierError> {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = InboxState::clone(&self.state.load());
        let out = f(&mut ledger, &mut next)?;
        self.state.store(Arc::new(next));

        #[cfg(feature = "prometheus")]
        courier_prometheus::set_pending_operations(ledger.len());

        Ok(out)
    }

    /// Makes `operation` visible immediately and records how to undo it.
    pub fn stage(&self, operation: Operation) -> Result<OptimisticEntity, CourierError> {
        self.write(|ledger, state| {
            if ledger.contains_key(&operation.id) {
                return Err(CourierError::InvalidOperation(format!(
                    "operation {} is already staged",
                    operation.id
                )));
            }
            let (entity, rollback) = reducer::apply(&operation, state)?;
            debug!(
                operation_id = %operation.id,
                operation_type = %operation.operation_type(),
                action = %operation.action(),
                "operation staged"
            );
            ledger.insert(
                operation.id.clone(),
                PendingOperation {
                    operation,
                    rollback,
                    status: OperationStatus::Pending,
                },
            );
            Ok(entity)
        })
    }

    /// Replaces the staged entity with the server's version and forgets the operation.
    pub fn confirm(
        &self,
        id: &OperationId,
        server: Option<ServerEntity>,
    ) -> Result<(), CourierError> {
        self.scheduler.cancel(id);
        self.write(|ledger, state| {
            let pending = ledger.get(id).ok_or_else(|| not_found(id))?;
            reducer::confirm(&pending.operation, server, state)?;
            ledger.remove(id);
            debug!(operation_id = %id, "operation confirmed");
            Ok(())
        })
    }

    /// Undoes the operation and forgets it.
    pub fn rollback(&self, id: &OperationId) -> Result<(), CourierError> {
        self.scheduler.cancel(id);
        self.write(|ledger, state| {
            let pending = ledger.get(id).ok_or_else(|| not_found(id))?;
            reducer::rollback(&pending.operation, &pending.rollback, state)?;
            ledger.remove(id);
            info!(operation_id = %id, "operation rolled back");
            Ok(())
        })
    }

    /// Counts a failed attempt and decides whether to try again.
    ///
    /// Non-transient errors and spent budgets turn the entity `error`
    /// (still visible, no longer pending) instead of rolling it back.
    pub fn record_failure(
        &self,
        id: &OperationId,
        error: &CourierError,
    ) -> Result<RetryDecision, CourierError> {
        let policy = self.policy;
        self.write(|ledger, state| {
            let pending = ledger.get_mut(id).ok_or_else(|| not_found(id))?;
            let budget = pending.operation.max_retries.unwrap_or(policy.max_retries);

            if !error.is_retryable() || pending.operation.retry_count >= budget {
                pending.status = OperationStatus::Failed;
                let retry_count = pending.operation.retry_count;
                update_meta(&pending.operation, state, |meta| {
                    meta.pending = false;
                    meta.error = Some(error.to_string());
                    meta.retry_count = retry_count;
                });
                warn!(operation_id = %id, retries = retry_count, error = %error, "operation failed");
                return Ok(RetryDecision::Terminal);
            }

            let op = &mut pending.operation;
            let delay = policy.delay(op.retry_count);
            op.retry_count += 1;
            let attempt = op.retry_count;
            update_meta(op, state, |meta| meta.retry_count = attempt);
            debug!(
                operation_id = %id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "operation will be retried"
            );
            Ok(RetryDecision::Retry { delay, attempt })
        })
    }

    /// Puts the entity into the `error` state without consuming retries.
    pub fn mark_failed(&self, id: &OperationId, reason: &str) -> Result<(), CourierError> {
        self.write(|ledger, state| {
            let pending = ledger.get_mut(id).ok_or_else(|| not_found(id))?;
            pending.status = OperationStatus::Failed;
            update_meta(&pending.operation, state, |meta| {
                meta.pending = false;
                meta.error = Some(reason.to_string());
            });
            Ok(())
        })
    }

    /// Re-arms a failed operation with a fresh retry budget and returns it
    /// so the caller can run it again.
    pub fn retry_operation(&self, id: &OperationId) -> Result<Operation, CourierError> {
        self.write(|ledger, state| {
            let pending = ledger.get_mut(id).ok_or_else(|| not_found(id))?;
            if pending.status != OperationStatus::Failed {
                return Err(CourierError::InvalidOperation(format!(
                    "operation {id} has not failed"
                )));
            }
            pending.status = OperationStatus::Pending;
            pending.operation.retry_count = 0;
            update_meta(&pending.operation, state, |meta| {
                meta.pending = true;
                meta.error = None;
                meta.retry_count = 0;
            });
            info!(operation_id = %id, "operation re-armed");
            Ok(pending.operation.clone())
        })
    }

    /// Discards an operation the user gave up on.
    pub fn dismiss_operation(&self, id: &OperationId) -> Result<(), CourierError> {
        self.rollback(id)
    }

    /// Upserts a confirmed message broadcast by another client.
    pub fn apply_remote(&self, row: MessageRecord) {
        let _ = self.write(|_, state| {
            reducer::apply_remote_message(row, state);
            Ok(())
        });
    }

    /// Upserts many confirmed messages in one swap, e.g. a loaded history page.
    pub fn apply_remote_batch(&self, rows: impl IntoIterator<Item = MessageRecord>) {
        let _ = self.write(|_, state| {
            for row in rows {
                reducer::apply_remote_message(row, state);
            }
            Ok(())
        });
    }

    /// Upserts a confirmed conversation broadcast by another client.
    pub fn apply_remote_conversation(&self, conversation: Conversation) {
        let _ = self.write(|_, state| {
            reducer::apply_remote_conversation(conversation, state);
            Ok(())
        });
    }

    /// Stages `operation`, then runs `mutation` until it succeeds or the
    /// retry budget is spent, waiting out the backoff between attempts.
    ///
    /// On success the operation is confirmed with whatever the mutation
    /// returned. On terminal failure the entity is left in the `error`
    /// state and the error is returned.
    pub async fn execute<F, Fut>(
        &self,
        operation: Operation,
        mutation: F,
    ) -> Result<Option<ServerEntity>, CourierError>
    where
        F: Fn(Operation) -> Fut,
        Fut: Future<Output = Result<Option<ServerEntity>, CourierError>>,
    {
        let id = operation.id.clone();
        self.stage(operation)?;
        self.drive(&id, mutation).await
    }

    /// Re-arms a failed operation and runs it again like [`Self::execute`].
    pub async fn resume<F, Fut>(
        &self,
        id: &OperationId,
        mutation: F,
    ) -> Result<Option<ServerEntity>, CourierError>
    where
        F: Fn(Operation) -> Fut,
        Fut: Future<Output = Result<Option<ServerEntity>, CourierError>>,
    {
        self.retry_operation(id)?;
        self.drive(id, mutation).await
    }

    async fn drive<F, Fut>(
        &self,
        id: &OperationId,
        mutation: F,
    ) -> Result<Option<ServerEntity>, CourierError>
    where
        F: Fn(Operation) -> Fut,
        Fut: Future<Output = Result<Option<ServerEntity>, CourierError>>,
    {
        loop {
            let operation = self.operation(id).ok_or_else(|| not_found(id))?;
            let error = match mutation(operation).await {
                Ok(server) => {
                    self.confirm(id, server.clone())?;
                    return Ok(server);
                }
                Err(e) => e,
            };

            match self.record_failure(id, &error)? {
                RetryDecision::Retry { delay, .. } => {
                    if !self.scheduler.wait(id, delay).await {
                        self.mark_failed(id, "retry cancelled")?;
                        return Err(CourierError::Shutdown);
                    }
                }
                RetryDecision::Terminal if error.is_retryable() => {
                    let retries = self.operation(id).map_or(0, |op| op.retry_count);
                    return Err(CourierError::RetriesExhausted {
                        attempts: retries + 1,
                        last_error: error.to_string(),
                    });
                }
                RetryDecision::Terminal => return Err(error),
            }
        }
    }

    /// Cancels every pending backoff timer. Waiting operations turn `error`.
    pub fn cancel_retries(&self) -> usize {
        let cancelled = self.scheduler.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "pending retries cancelled");
        }
        cancelled
    }

    /// A copy of the staged operation, if it is still tracked.
    pub fn operation(&self, id: &OperationId) -> Option<Operation> {
        self.ledger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|p| p.operation.clone())
    }

    pub fn status(&self, id: &OperationId) -> Option<OperationStatus> {
        self.ledger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|p| p.status)
    }

    /// Operations staged but not yet confirmed or rolled back, failed ones included.
    pub fn pending_count(&self) -> usize {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Ids of operations waiting for the user to retry or dismiss.
    pub fn failed_operations(&self) -> Vec<OperationId> {
        let ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        let mut failed: Vec<_> = ledger
            .iter()
            .filter(|(_, p)| p.status == OperationStatus::Failed)
            .map(|(id, _)| id.clone())
            .collect();
        failed.sort();
        failed
    }
}

fn update_meta(op: &Operation, state: &mut InboxState, f: impl FnOnce(&mut OptimisticMeta)) {
    if let Some(Some(meta)) = reducer::meta_mut(op, state) {
        f(meta);
    }
}
