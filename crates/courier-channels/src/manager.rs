// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel registry, subscriptions, typing and presence.
//!
//! One [`Channel`] is live per (organization, conversation) key. The
//! registry lock is held across transport subscribe and unsubscribe, so
//! concurrent callers can never open two transport subscriptions for the
//! same key. Outbound typing, presence and message events use the live
//! channel when there is one and an unregistered topic handle otherwise, so
//! sending never keeps a channel alive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_config::ChannelsConfig;
use courier_core::{
    ChannelEvent, ChannelKey, ConversationId, CourierError, EventFilter, MessageRecord,
    OrganizationId, PresenceState, PresenceStatus, Transport, TransportChannel, TypingEvent,
    UserId,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::channel::{Channel, EventHandler};
use crate::typing::{TypingKey, TypingTimers};

/// Who is acting on which conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub organization_id: OrganizationId,
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub user_name: Option<String>,
}

impl ChannelConfig {
    pub fn new(
        organization_id: impl Into<OrganizationId>,
        conversation_id: impl Into<ConversationId>,
        user_id: impl Into<UserId>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            user_name: None,
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn key(&self) -> ChannelKey {
        ChannelKey {
            organization_id: self.organization_id.clone(),
            conversation_id: self.conversation_id.clone(),
        }
    }

    fn typing_key(&self) -> TypingKey {
        TypingKey {
            channel: self.key(),
            user_id: self.user_id.clone(),
        }
    }

    fn typing_event(&self, is_typing: bool) -> ChannelEvent {
        ChannelEvent::Typing(TypingEvent {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            is_typing,
            at: Utc::now(),
        })
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    channels: Mutex<HashMap<ChannelKey, Arc<Channel>>>,
    typing: TypingTimers,
    prefix: String,
    typing_timeout: Duration,
    inbound_buffer: usize,
}

/// Owns every live channel of a client session.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<Inner>,
}

impl ChannelManager {
    pub fn new(config: &ChannelsConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                channels: Mutex::new(HashMap::new()),
                typing: TypingTimers::default(),
                prefix: config.channel_prefix.clone(),
                typing_timeout: config.typing_timeout(),
                inbound_buffer: config.inbound_buffer,
            }),
        }
    }

    /// Returns the live channel for `key`, subscribing the transport first if
    /// there is none. Repeated calls return the same instance.
    pub async fn get_channel(&self, key: &ChannelKey) -> Result<Arc<Channel>, CourierError> {
        let mut channels = self.inner.channels.lock().await;
        self.open_locked(&mut channels, key).await
    }

    async fn open_locked(
        &self,
        channels: &mut HashMap<ChannelKey, Arc<Channel>>,
        key: &ChannelKey,
    ) -> Result<Arc<Channel>, CourierError> {
        if let Some(channel) = channels.get(key) {
            return Ok(Arc::clone(channel));
        }

        let topic = key.topic(&self.inner.prefix);
        let handle = self.inner.transport.channel(&topic);
        let channel = Channel::open(key.clone(), handle, self.inner.inbound_buffer).await?;
        channels.insert(key.clone(), Arc::clone(&channel));
        info!(channel = %key, topic = %topic, "channel opened");
        Self::publish_live(channels.len());
        Ok(channel)
    }

    /// The live channel for `key`, if any. Never subscribes.
    pub async fn live_channel(&self, key: &ChannelKey) -> Option<Arc<Channel>> {
        self.inner.channels.lock().await.get(key).cloned()
    }

    /// Where to send outbound events for `key`. Never subscribes.
    async fn sender(&self, key: &ChannelKey) -> Arc<dyn TransportChannel> {
        match self.live_channel(key).await {
            Some(channel) => Arc::clone(channel.transport()),
            None => self.inner.transport.channel(&key.topic(&self.inner.prefix)),
        }
    }

    /// Registers `handler` for events matching `filter` on `key`'s channel.
    ///
    /// The handle must be passed to [`Subscription::unsubscribe`] to remove
    /// the registration; dropping it leaves the registration in place.
    pub async fn subscribe<F>(
        &self,
        key: &ChannelKey,
        filter: impl Into<EventFilter>,
        handler: F,
    ) -> Result<Subscription, CourierError>
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let filter = filter.into();

        let mut channels = self.inner.channels.lock().await;
        let channel = self.open_locked(&mut channels, key).await?;
        let id = channel.register(filter, handler);
        debug!(channel = %key, registration = id, ?filter, "subscribed");

        Ok(Subscription {
            manager: self.clone(),
            key: key.clone(),
            id,
        })
    }

    async fn unsubscribe(&self, key: &ChannelKey, id: u64) {
        let mut channels = self.inner.channels.lock().await;
        let Some(channel) = channels.get(key).cloned() else {
            return;
        };
        if channel.deregister(id) > 0 {
            return;
        }

        channels.remove(key);
        self.inner.typing.disarm_channel(key);
        if let Err(e) = channel.close().await {
            warn!(channel = %key, error = %e, "transport unsubscribe failed");
        }
        info!(channel = %key, "channel closed after last subscription");
        Self::publish_live(channels.len());
    }

    /// Broadcasts a typing change for `config.user_id`.
    ///
    /// `true` announces "started" unless a timer is already running, then
    /// (re)arms the expiry timer; expiry announces "cleared". `false` cancels
    /// the timer and always announces "cleared". Failures are logged only.
    pub async fn send_typing(&self, config: &ChannelConfig, is_typing: bool) {
        let typing_key = config.typing_key();

        if !is_typing {
            self.inner.typing.disarm(&typing_key);
            self.broadcast_best_effort(config, config.typing_event(false)).await;
            return;
        }

        let armed = self.inner.typing.arm(typing_key.clone());
        if armed.started {
            self.broadcast_best_effort(config, config.typing_event(true)).await;
        }

        let manager = self.clone();
        let config = config.clone();
        let timeout = self.inner.typing_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = armed.token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if manager.inner.typing.expire(&typing_key, armed.generation) {
                        debug!(channel = %typing_key.channel, user_id = %typing_key.user_id, "typing expired");
                        manager.expire_typing(&config).await;
                    }
                }
            }
        });
    }

    async fn expire_typing(&self, config: &ChannelConfig) {
        let key = config.key();
        let sender = self.sender(&key).await;
        if let Err(e) = sender.send(config.typing_event(false)).await {
            warn!(channel = %key, error = %e, "typing clear broadcast failed");
        }
    }

    /// Publishes this user's presence. Best-effort: failures are logged, never retried.
    pub async fn update_presence(&self, config: &ChannelConfig, status: PresenceStatus) {
        let state = PresenceState {
            user_id: config.user_id.clone(),
            user_name: config.user_name.clone(),
            status,
            updated_at: Utc::now(),
        };

        let key = config.key();
        let sender = match self.live_channel(&key).await {
            Some(channel) => {
                channel.record_presence(&state);
                Arc::clone(channel.transport())
            }
            None => self.inner.transport.channel(&key.topic(&self.inner.prefix)),
        };
        if let Err(e) = sender.track(state).await {
            warn!(channel = %key, error = %e, "presence track failed");
        }
    }

    /// Latest presence of every user seen on `key`'s live channel.
    pub async fn presence(&self, key: &ChannelKey) -> Vec<PresenceState> {
        match self.live_channel(key).await {
            Some(channel) => channel.presence(),
            None => Vec::new(),
        }
    }

    /// Broadcasts a persisted message to the other clients on its conversation.
    ///
    /// Failures are returned to the caller and not retried.
    pub async fn broadcast_message(&self, record: &MessageRecord) -> Result<(), CourierError> {
        let key = ChannelKey {
            organization_id: record.organization_id.clone(),
            conversation_id: record.conversation_id.clone(),
        };
        self.sender(&key)
            .await
            .send(ChannelEvent::Message(record.clone()))
            .await
    }

    async fn broadcast_best_effort(&self, config: &ChannelConfig, event: ChannelEvent) {
        let key = config.key();
        if let Err(e) = self.sender(&key).await.send(event).await {
            warn!(channel = %key, error = %e, "typing broadcast failed");
        }
    }

    /// Tears down every live channel and cancels every typing timer.
    pub async fn cleanup(&self) {
        let cancelled = self.inner.typing.disarm_all();
        let mut channels = self.inner.channels.lock().await;
        let closing: Vec<_> = channels.drain().collect();
        for (key, channel) in &closing {
            if let Err(e) = channel.close().await {
                warn!(channel = %key, error = %e, "transport unsubscribe failed");
            }
        }
        Self::publish_live(0);
        info!(
            channels = closing.len(),
            typing_timers = cancelled,
            "channel manager cleaned up"
        );
    }

    pub async fn live_channels(&self) -> usize {
        self.inner.channels.lock().await.len()
    }

    /// Typing timers currently armed.
    pub fn active_typing(&self) -> usize {
        self.inner.typing.len()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    #[allow(unused_variables)]
    fn publish_live(count: usize) {
        #[cfg(feature = "prometheus")]
        courier_prometheus::set_live_channels(count);
    }
}

/// A registration on one channel, returned by [`ChannelManager::subscribe`].
#[must_use = "dropping a Subscription does not unsubscribe"]
pub struct Subscription {
    manager: ChannelManager,
    key: ChannelKey,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Removes this registration only. The channel is torn down when its
    /// last registration goes.
    pub async fn unsubscribe(self) {
        self.manager.unsubscribe(&self.key, self.id).await;
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
