// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier unit and integration tests.
//!
//! Provides in-process stand-ins for the two external collaborators so
//! engine tests are fast, deterministic and need no network.
//!
//! # Components
//!
//! - [`MockStore`] - message store with failure and latency injection
//! - [`MockTransport`] - in-process pub/sub hub that records every send

pub mod mock_store;
pub mod mock_transport;

pub use mock_store::{InsertCall, MockStore};
pub use mock_transport::{MockTransport, MockTransportChannel, SentEvent};

use courier_core::{MessageId, MessageRecord, NewMessage, SenderType};

/// A customer message draft for `org-1` in `conversation`.
pub fn draft(conversation: &str, content: &str) -> NewMessage {
    NewMessage {
        organization_id: "org-1".into(),
        conversation_id: conversation.into(),
        content: content.to_string(),
        sender_type: SenderType::Customer,
        sender_name: Some("Test Customer".to_string()),
        metadata: serde_json::Value::Null,
    }
}

/// A persisted-looking record built from [`draft`].
pub fn record(conversation: &str, content: &str) -> MessageRecord {
    draft(conversation, content).into_record(MessageId::generate())
}
