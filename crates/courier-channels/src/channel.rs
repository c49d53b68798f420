// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One live conversation channel and its dispatch table.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use courier_core::{
    ChannelEvent, ChannelKey, CourierError, EventFilter, PresenceState, PresenceStatus,
    TransportChannel, UserId,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Callback invoked for every matching event on a channel.
pub type EventHandler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

struct Registration {
    id: u64,
    filter: EventFilter,
    handler: EventHandler,
}

/// A subscribed transport topic for one (organization, conversation) pair.
///
/// Owns the transport handle for its whole life. Inbound events are routed
/// to every registration whose filter accepts them.
pub struct Channel {
    key: ChannelKey,
    transport: Arc<dyn TransportChannel>,
    registrations: RwLock<Vec<Registration>>,
    presence: RwLock<HashMap<UserId, PresenceState>>,
    next_registration: AtomicU64,
    stop: CancellationToken,
}

impl Channel {
    /// Subscribes `transport` and starts dispatching its inbound events.
    pub(crate) async fn open(
        key: ChannelKey,
        transport: Arc<dyn TransportChannel>,
        buffer: usize,
    ) -> Result<Arc<Self>, CourierError> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        transport.subscribe(tx).await?;

        let channel = Arc::new(Self {
            key,
            transport,
            registrations: RwLock::new(Vec::new()),
            presence: RwLock::new(HashMap::new()),
            next_registration: AtomicU64::new(1),
            stop: CancellationToken::new(),
        });
        tokio::spawn(Arc::clone(&channel).dispatch_loop(rx));
        Ok(channel)
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn topic(&self) -> &str {
        self.transport.topic()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn TransportChannel> {
        &self.transport
    }

    pub(crate) fn register(&self, filter: EventFilter, handler: EventHandler) -> u64 {
        let id = self.next_registration.fetch_add(1, Ordering::Relaxed);
        self.registrations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Registration { id, filter, handler });
        id
    }

    /// Removes one registration. Returns how many remain.
    pub(crate) fn deregister(&self, id: u64) -> usize {
        let mut registrations = self.registrations.write().unwrap_or_else(|e| e.into_inner());
        registrations.retain(|r| r.id != id);
        registrations.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.registrations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Latest known presence of every user on the channel, by user id.
    pub fn presence(&self) -> Vec<PresenceState> {
        let mut states: Vec<_> = self
            .presence
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        states.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        states
    }

    pub(crate) fn record_presence(&self, state: &PresenceState) {
        let mut presence = self.presence.write().unwrap_or_else(|e| e.into_inner());
        if state.status == PresenceStatus::Offline {
            presence.remove(&state.user_id);
        } else {
            presence.insert(state.user_id.clone(), state.clone());
        }
    }

    /// Delivers `event` to every matching registration.
    pub(crate) fn dispatch(&self, event: &ChannelEvent) {
        if let ChannelEvent::Presence(state) = event {
            self.record_presence(state);
        }

        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .registrations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.filter.accepts(kind))
            .map(|r| Arc::clone(&r.handler))
            .collect();

        trace!(channel = %self.key, kind = %kind, handlers = handlers.len(), "dispatching event");
        for handler in handlers {
            handler(event);
        }
    }

    async fn dispatch_loop(self: Arc<Self>, mut rx: mpsc::Receiver<ChannelEvent>) {
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => self.dispatch(&event),
                    None => break,
                },
            }
        }
        debug!(channel = %self.key, "dispatch loop stopped");
    }

    /// Stops dispatch and leaves the transport topic.
    pub(crate) async fn close(&self) -> Result<(), CourierError> {
        self.stop.cancel();
        self.registrations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.transport.unsubscribe().await
    }

    pub fn is_closed(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("key", &self.key)
            .field("topic", &self.topic())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
