// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier: a realtime message sync engine.
//!
//! [`SyncEngine`] ties together the four engine crates:
//!
//! - [`courier_batch`] persists outbound messages in size- or time-bounded batches
//! - [`courier_cache`] reads through a TTL cache in front of the store
//! - [`courier_channels`] keeps one pub/sub channel per conversation with typing and presence
//! - [`courier_optimistic`] shows mutations at once and confirms or rolls them back
//!
//! The persistent store and the pub/sub transport are supplied by the host
//! as [`courier_core::MessageStore`] and [`courier_core::Transport`] adapters.

pub mod engine;
pub mod telemetry;

pub use engine::{Delivered, DeliveryReceipt, SentMessage, SyncEngine};

pub use courier_channels::{ChannelConfig, Subscription};
pub use courier_config::CourierConfig;
pub use courier_core::{
    ChannelEvent, ChannelKey, CourierError, EventFilter, EventKind, MessageQuery, MessageRecord,
    MessageStore, NewMessage, PresenceStatus, Priority, Transport,
};
pub use courier_optimistic::{InboxState, Operation, ServerEntity, Staged};
