// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The sync engine facade.
//!
//! A send stages the message for the UI, hands it to the batch processor,
//! and reconciles in the background: the persisted row replaces the staged
//! one and is broadcast to the other clients on the conversation, or the
//! staged row turns `error` when the write gives up.

use std::sync::Arc;

use courier_batch::{BatchMetrics, BatchProcessor, Completion};
use courier_cache::{CachedStore, QueryStatsSummary};
use courier_channels::{ChannelConfig, ChannelManager, Subscription};
use courier_config::CourierConfig;
use courier_core::{
    ChannelEvent, ChannelKey, CourierError, EventFilter, EventKind, HealthStatus, MessageId,
    MessageQuery, MessageRecord, MessageStore, NewMessage, OperationId, PluginAdapter,
    PresenceState, PresenceStatus, Priority, Transport,
};
use courier_optimistic::{
    InboxState, Operation, OperationKind, OptimisticCoordinator, OptimisticEntity, ServerEntity,
    Staged,
};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Result of a durable write, as reported to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub success: bool,
    pub message_id: MessageId,
    /// The persisted row on success.
    pub data: Option<MessageRecord>,
    pub error: Option<String>,
}

/// A persisted message and the outcome of broadcasting it.
#[derive(Debug)]
pub struct Delivered {
    pub record: MessageRecord,
    /// Broadcast failures are not retried; the row is already durable.
    pub broadcast: Result<(), CourierError>,
}

/// What [`SyncEngine::send_message`] hands back at once.
#[derive(Debug)]
pub struct SentMessage {
    pub operation_id: OperationId,
    /// The row the UI shows until the write settles.
    pub staged: Staged<MessageRecord>,
    /// Resolves when the write is confirmed or has terminally failed.
    pub delivery: JoinHandle<Result<Delivered, CourierError>>,
}

pub struct SyncEngine {
    config: CourierConfig,
    store: Arc<CachedStore>,
    transport: Arc<dyn Transport>,
    batch: BatchProcessor,
    channels: ChannelManager,
    optimistic: Arc<OptimisticCoordinator>,
    tasks: TaskTracker,
}

impl SyncEngine {
    /// Wires the engine over `store` and `transport`. Must be called inside
    /// a tokio runtime; the batch worker starts immediately.
    pub fn new(
        config: CourierConfig,
        store: Arc<dyn MessageStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let store = Arc::new(CachedStore::new(store, &config.cache));
        let batch = BatchProcessor::spawn(&config.batch, store.clone());
        let channels = ChannelManager::new(&config.channels, Arc::clone(&transport));
        let optimistic = Arc::new(OptimisticCoordinator::new(&config.optimistic));

        info!(
            store = %store.label(),
            transport = %transport.label(),
            "sync engine started"
        );

        Self {
            config,
            store,
            transport,
            batch,
            channels,
            optimistic,
            tasks: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Persists one message through the batch processor and waits for it.
    ///
    /// Only a processor that has shut down rejects the message outright;
    /// every other outcome comes back as a receipt.
    pub async fn enqueue_message(
        &self,
        message: NewMessage,
        priority: Priority,
    ) -> Result<DeliveryReceipt, CourierError> {
        let completion = self.batch.enqueue(message, priority)?;
        let message_id = completion.message_id().clone();
        Ok(match completion.await {
            Ok(row) => DeliveryReceipt {
                success: true,
                message_id,
                data: Some(row),
                error: None,
            },
            Err(e) => DeliveryReceipt {
                success: false,
                message_id,
                data: None,
                error: Some(e.to_string()),
            },
        })
    }

    /// Shows `message` immediately, then persists and broadcasts it.
    pub fn send_message(
        &self,
        message: NewMessage,
        priority: Priority,
    ) -> Result<SentMessage, CourierError> {
        let operation = Operation::create_message(message.clone());
        let operation_id = operation.id.clone();
        let OptimisticEntity::Message(staged) = self.optimistic.stage(operation)? else {
            return Err(CourierError::Internal(
                "message create staged a non-message entity".into(),
            ));
        };

        let completion = match self.batch.enqueue(message, priority) {
            Ok(completion) => completion,
            Err(e) => {
                self.optimistic.rollback(&operation_id)?;
                return Err(e);
            }
        };
        debug!(
            operation_id = %operation_id,
            message_id = %completion.message_id(),
            conversation_id = %staged.entity.conversation_id,
            "message staged and queued"
        );

        let delivery = self.reconcile(operation_id.clone(), completion);
        Ok(SentMessage {
            operation_id,
            staged,
            delivery,
        })
    }

    /// Re-sends a message whose write failed terminally.
    pub fn retry_message(
        &self,
        operation_id: &OperationId,
        priority: Priority,
    ) -> Result<JoinHandle<Result<Delivered, CourierError>>, CourierError> {
        let operation = self.optimistic.retry_operation(operation_id)?;
        let OperationKind::CreateMessage { message } = operation.kind else {
            return Err(CourierError::InvalidOperation(format!(
                "operation {operation_id} is not a message send"
            )));
        };

        let completion = match self.batch.enqueue(draft_of(message), priority) {
            Ok(completion) => completion,
            Err(e) => {
                self.optimistic.mark_failed(operation_id, &e.to_string())?;
                return Err(e);
            }
        };
        Ok(self.reconcile(operation_id.clone(), completion))
    }

    fn reconcile(
        &self,
        operation_id: OperationId,
        completion: Completion,
    ) -> JoinHandle<Result<Delivered, CourierError>> {
        self.tasks.spawn(deliver(
            Arc::clone(&self.optimistic),
            self.channels.clone(),
            operation_id,
            completion,
        ))
    }

    /// Registers `handler` on a conversation's channel.
    pub async fn subscribe<F>(
        &self,
        key: &ChannelKey,
        filter: impl Into<EventFilter>,
        handler: F,
    ) -> Result<Subscription, CourierError>
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.channels.subscribe(key, filter, handler).await
    }

    /// Merges messages other clients broadcast on `key` into local state.
    pub async fn follow(&self, key: &ChannelKey) -> Result<Subscription, CourierError> {
        let optimistic = Arc::clone(&self.optimistic);
        self.channels
            .subscribe(key, EventKind::Message, move |event| {
                if let ChannelEvent::Message(row) = event {
                    optimistic.apply_remote(row.clone());
                }
            })
            .await
    }

    /// Reads through the cache and merges the rows into local state.
    pub async fn load_messages(
        &self,
        query: &MessageQuery,
    ) -> Result<Vec<MessageRecord>, CourierError> {
        let rows = self.store.select_messages(query).await?;
        self.optimistic.apply_remote_batch(rows.iter().cloned());
        Ok(rows)
    }

    pub async fn send_typing(&self, config: &ChannelConfig, is_typing: bool) {
        self.channels.send_typing(config, is_typing).await;
    }

    pub async fn update_presence(&self, config: &ChannelConfig, status: PresenceStatus) {
        self.channels.update_presence(config, status).await;
    }

    pub async fn presence(&self, key: &ChannelKey) -> Vec<PresenceState> {
        self.channels.presence(key).await
    }

    pub fn stage_operation(&self, operation: Operation) -> Result<OptimisticEntity, CourierError> {
        self.optimistic.stage(operation)
    }

    pub fn confirm_operation(
        &self,
        id: &OperationId,
        server: Option<ServerEntity>,
    ) -> Result<(), CourierError> {
        self.optimistic.confirm(id, server)
    }

    pub fn rollback_operation(&self, id: &OperationId) -> Result<(), CourierError> {
        self.optimistic.rollback(id)
    }

    /// Drops a failed operation and its staged entity.
    pub fn dismiss_operation(&self, id: &OperationId) -> Result<(), CourierError> {
        self.optimistic.dismiss_operation(id)
    }

    /// What the UI renders from.
    pub fn state(&self) -> Arc<InboxState> {
        self.optimistic.snapshot()
    }

    pub fn optimistic(&self) -> &OptimisticCoordinator {
        &self.optimistic
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    pub fn batch_metrics(&self) -> BatchMetrics {
        self.batch.metrics()
    }

    pub fn cache_stats(&self) -> Vec<QueryStatsSummary> {
        self.store.cache().all_stats()
    }

    /// Aggregates the store and transport health. Any unhealthy or
    /// degraded adapter degrades the engine.
    pub async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        let adapters: [&dyn PluginAdapter; 2] = [self.store.as_ref(), self.transport.as_ref()];

        let mut reasons = Vec::new();
        for adapter in adapters {
            match adapter.health_check().await? {
                HealthStatus::Healthy => {}
                HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => {
                    reasons.push(format!("{}: {reason}", adapter.label()));
                }
            }
        }

        if reasons.is_empty() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(reasons.join("; ")))
        }
    }

    /// Flushes queued writes and waits for their reconciliation, cancels
    /// retry and typing timers, closes every channel, then shuts the
    /// adapters down.
    pub async fn shutdown(&self) {
        self.batch.shutdown().await;
        self.tasks.close();
        self.tasks.wait().await;
        let retries = self.optimistic.cancel_retries();
        self.channels.cleanup().await;

        if let Err(e) = self.store.shutdown().await {
            warn!(error = %e, "store shutdown error");
        }
        if let Err(e) = self.transport.shutdown().await {
            warn!(error = %e, "transport shutdown error");
        }
        info!(cancelled_retries = retries, "sync engine shut down");
    }
}

/// Waits for the write, then confirms and broadcasts, or marks the staged row failed.
///
/// A durable row is broadcast even when its operation was rolled back or
/// dismissed while the write was in flight.
async fn deliver(
    optimistic: Arc<OptimisticCoordinator>,
    channels: ChannelManager,
    operation_id: OperationId,
    completion: Completion,
) -> Result<Delivered, CourierError> {
    let record = match completion.await {
        Ok(record) => record,
        Err(e) => {
            warn!(operation_id = %operation_id, error = %e, "message write failed");
            if let Err(missing) = optimistic.mark_failed(&operation_id, &e.to_string()) {
                debug!(operation_id = %operation_id, error = %missing, "failed write has no staged operation");
            }
            return Err(e);
        }
    };

    if let Err(e) = optimistic.confirm(&operation_id, Some(ServerEntity::Message(record.clone()))) {
        warn!(
            operation_id = %operation_id,
            message_id = %record.id,
            error = %e,
            "message persisted after its operation was withdrawn"
        );
    }
    let broadcast = channels.broadcast_message(&record).await;
    if let Err(e) = &broadcast {
        warn!(message_id = %record.id, error = %e, "message broadcast failed");
    }
    Ok(Delivered { record, broadcast })
}

/// The draft a staged message row was built from.
fn draft_of(row: MessageRecord) -> NewMessage {
    NewMessage {
        organization_id: row.organization_id,
        conversation_id: row.conversation_id,
        content: row.content,
        sender_type: row.sender_type,
        sender_name: row.sender_name,
        metadata: row.metadata,
    }
}
