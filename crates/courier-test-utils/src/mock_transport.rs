// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock pub/sub transport for deterministic testing.
//!
//! Every `MockTransport` created with [`MockTransport::peer`] shares one
//! in-process hub, so two engines can talk to each other in a test. Sends are
//! delivered to the other clients subscribed to the topic and captured for
//! assertions. Failures can be injected per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use courier_core::{
    AdapterType, ChannelEvent, CourierError, HealthStatus, PluginAdapter, PresenceState,
    Transport, TransportChannel, TypingEvent,
};

/// One successful `send` or `track`, as seen by the hub.
#[derive(Debug, Clone)]
pub struct SentEvent {
    pub topic: String,
    pub event: ChannelEvent,
    pub at: Instant,
    pub client: u64,
}

struct Member {
    client: u64,
    handle: u64,
    sink: mpsc::Sender<ChannelEvent>,
}

#[derive(Default)]
struct HubState {
    members: HashMap<String, Vec<Member>>,
    sent: Vec<SentEvent>,
    channels_created: usize,
}

#[derive(Default)]
struct Hub {
    state: Mutex<HubState>,
    next_id: AtomicU64,
    failing_sends: AtomicUsize,
    failing_tracks: AtomicUsize,
    failing_subscribes: AtomicUsize,
}

impl Hub {
    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Push `event` to every member of `topic` except those owned by `skip`.
    fn deliver(&self, topic: &str, event: &ChannelEvent, skip: Option<u64>) {
        let state = self.state();
        if let Some(members) = state.members.get(topic) {
            for member in members.iter().filter(|m| Some(m.client) != skip) {
                let _ = member.sink.try_send(event.clone());
            }
        }
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A client connection to the in-process hub.
pub struct MockTransport {
    hub: Arc<Hub>,
    client: u64,
}

impl MockTransport {
    /// A transport on a fresh, empty hub.
    pub fn new() -> Self {
        let hub = Arc::new(Hub::default());
        let client = hub.next_id();
        Self { hub, client }
    }

    /// Another client on the same hub.
    pub fn peer(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            client: self.hub.next_id(),
        }
    }

    pub fn client_id(&self) -> u64 {
        self.client
    }

    /// Deliver `event` to every subscriber of `topic`, as if another client sent it.
    pub fn inject(&self, topic: &str, event: ChannelEvent) {
        self.hub.deliver(topic, &event, None);
    }

    /// Events this client broadcast, across all topics.
    pub fn sent_events(&self) -> Vec<SentEvent> {
        self.hub
            .state()
            .sent
            .iter()
            .filter(|s| s.client == self.client)
            .cloned()
            .collect()
    }

    /// Events this client broadcast on one topic.
    pub fn sent_on(&self, topic: &str) -> Vec<ChannelEvent> {
        self.sent_events()
            .into_iter()
            .filter(|s| s.topic == topic)
            .map(|s| s.event)
            .collect()
    }

    /// Typing events this client broadcast on one topic, with their send times.
    pub fn typing_events(&self, topic: &str) -> Vec<(Instant, TypingEvent)> {
        self.sent_events()
            .into_iter()
            .filter(|s| s.topic == topic)
            .filter_map(|s| match s.event {
                ChannelEvent::Typing(t) => Some((s.at, t)),
                _ => None,
            })
            .collect()
    }

    /// Live subscriptions held by this client, across all topics.
    pub fn active_subscriptions(&self) -> usize {
        self.hub
            .state()
            .members
            .values()
            .flatten()
            .filter(|m| m.client == self.client)
            .count()
    }

    /// Live subscriptions on `topic`, across all clients.
    pub fn subscribers(&self, topic: &str) -> usize {
        self.hub.state().members.get(topic).map_or(0, Vec::len)
    }

    /// Number of topic handles created on the hub.
    pub fn channels_created(&self) -> usize {
        self.hub.state().channels_created
    }

    pub fn fail_next_sends(&self, n: usize) {
        self.hub.failing_sends.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_tracks(&self, n: usize) {
        self.hub.failing_tracks.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_subscribes(&self, n: usize) {
        self.hub.failing_subscribes.store(n, Ordering::SeqCst);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        let mut state = self.hub.state();
        for members in state.members.values_mut() {
            members.retain(|m| m.client != self.client);
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn channel(&self, topic: &str) -> Arc<dyn TransportChannel> {
        self.hub.state().channels_created += 1;
        Arc::new(MockTransportChannel {
            hub: Arc::clone(&self.hub),
            client: self.client,
            handle: self.hub.next_id(),
            topic: topic.to_string(),
        })
    }
}

/// One topic handle issued by [`MockTransport::channel`].
pub struct MockTransportChannel {
    hub: Arc<Hub>,
    client: u64,
    handle: u64,
    topic: String,
}

impl MockTransportChannel {
    fn record(&self, event: ChannelEvent) {
        self.hub.state().sent.push(SentEvent {
            topic: self.topic.clone(),
            event,
            at: Instant::now(),
            client: self.client,
        });
    }
}

#[async_trait]
impl TransportChannel for MockTransportChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn subscribe(&self, sink: mpsc::Sender<ChannelEvent>) -> Result<(), CourierError> {
        if Hub::take_failure(&self.hub.failing_subscribes) {
            return Err(CourierError::transport("mock subscribe failure"));
        }
        let mut state = self.hub.state();
        let members = state.members.entry(self.topic.clone()).or_default();
        members.retain(|m| m.handle != self.handle);
        members.push(Member {
            client: self.client,
            handle: self.handle,
            sink,
        });
        Ok(())
    }

    async fn send(&self, event: ChannelEvent) -> Result<(), CourierError> {
        if Hub::take_failure(&self.hub.failing_sends) {
            return Err(CourierError::transport("mock send failure"));
        }
        self.record(event.clone());
        self.hub.deliver(&self.topic, &event, Some(self.client));
        Ok(())
    }

    async fn track(&self, presence: PresenceState) -> Result<(), CourierError> {
        if Hub::take_failure(&self.hub.failing_tracks) {
            return Err(CourierError::transport("mock track failure"));
        }
        let event = ChannelEvent::Presence(presence);
        self.record(event.clone());
        self.hub.deliver(&self.topic, &event, Some(self.client));
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), CourierError> {
        let mut state = self.hub.state();
        if let Some(members) = state.members.get_mut(&self.topic) {
            members.retain(|m| m.handle != self.handle);
            if members.is_empty() {
                state.members.remove(&self.topic);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use courier_core::PresenceStatus;

    use super::*;
    use crate::record;

    #[tokio::test]
    async fn send_reaches_peers_but_not_sender() {
        let alice = MockTransport::new();
        let bob = alice.peer();

        let (a_tx, mut a_rx) = mpsc::channel(8);
        let (b_tx, mut b_rx) = mpsc::channel(8);
        let a_chan = alice.channel("t");
        let b_chan = bob.channel("t");
        a_chan.subscribe(a_tx).await.unwrap();
        b_chan.subscribe(b_tx).await.unwrap();

        a_chan
            .send(ChannelEvent::Message(record("c1", "hi")))
            .await
            .unwrap();

        assert!(matches!(b_rx.recv().await, Some(ChannelEvent::Message(_))));
        assert!(a_rx.try_recv().is_err());
        assert_eq!(alice.sent_on("t").len(), 1);
        assert!(bob.sent_events().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let transport = MockTransport::new();
        let (tx, mut rx) = mpsc::channel(8);
        let chan = transport.channel("t");
        chan.subscribe(tx).await.unwrap();
        assert_eq!(transport.active_subscriptions(), 1);

        chan.unsubscribe().await.unwrap();
        transport.inject("t", ChannelEvent::Message(record("c1", "late")));

        assert_eq!(transport.active_subscriptions(), 0);
        assert_eq!(transport.subscribers("t"), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn injected_failures() {
        let transport = MockTransport::new();
        let chan = transport.channel("t");
        transport.fail_next_tracks(1);

        let presence = PresenceState {
            user_id: "u1".into(),
            user_name: None,
            status: PresenceStatus::Online,
            updated_at: Utc::now(),
        };
        assert!(chan.track(presence.clone()).await.is_err());
        assert!(chan.track(presence).await.is_ok());
        assert_eq!(transport.sent_events().len(), 1);
    }
}
