// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pub/sub transport contract consumed by the channel manager.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CourierError;
use crate::model::{ChannelEvent, PresenceState};
use crate::traits::adapter::PluginAdapter;

/// Adapter for a channel-based publish/subscribe service.
pub trait Transport: PluginAdapter {
    /// Returns a handle for the named topic. No network traffic happens until
    /// [`TransportChannel::subscribe`] is called on it.
    fn channel(&self, topic: &str) -> Arc<dyn TransportChannel>;
}

/// A handle to one transport topic.
#[async_trait]
pub trait TransportChannel: Send + Sync + 'static {
    /// The topic this handle is bound to.
    fn topic(&self) -> &str;

    /// Joins the topic. Inbound events from other clients are pushed into `sink`
    /// until [`TransportChannel::unsubscribe`] is called.
    async fn subscribe(&self, sink: mpsc::Sender<ChannelEvent>) -> Result<(), CourierError>;

    /// Broadcasts an event to the other members of the topic.
    async fn send(&self, event: ChannelEvent) -> Result<(), CourierError>;

    /// Publishes this client's presence on the topic.
    async fn track(&self, presence: PresenceState) -> Result<(), CourierError>;

    /// Leaves the topic and stops pushing inbound events.
    async fn unsubscribe(&self) -> Result<(), CourierError>;
}
