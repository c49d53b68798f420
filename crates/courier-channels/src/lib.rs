// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation channels over a pub/sub transport.
//!
//! [`ChannelManager`] keeps exactly one live [`Channel`] per
//! (organization, conversation) and multiplexes message, presence and
//! typing events over it. Typing indicators clear themselves after a
//! configurable period of inactivity.

pub mod channel;
pub mod manager;
pub mod typing;

pub use channel::{Channel, EventHandler};
pub use manager::{ChannelConfig, ChannelManager, Subscription};
pub use typing::TypingKey;
