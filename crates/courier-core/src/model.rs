// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain records exchanged with the store, the transport and the UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{
    ConversationId, MessageId, OrganizationId, SenderType, UserId, key_segment,
};

/// A message composed locally and handed to the engine for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub organization_id: OrganizationId,
    pub conversation_id: ConversationId,
    pub content: String,
    pub sender_type: SenderType,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NewMessage {
    /// Builds the row handed to the store, stamped with `id` and the current time.
    pub fn into_record(self, id: MessageId) -> MessageRecord {
        MessageRecord {
            id,
            organization_id: self.organization_id,
            conversation_id: self.conversation_id,
            content: self.content,
            sender_type: self.sender_type,
            sender_name: self.sender_name,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}

/// A message row as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub organization_id: OrganizationId,
    pub conversation_id: ConversationId,
    pub content: String,
    pub sender_type: SenderType,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Equality and range filter over the messages table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageQuery {
    pub organization_id: OrganizationId,
    pub conversation_id: ConversationId,
    /// Only rows created at or after this instant.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Only rows created strictly before this instant.
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl MessageQuery {
    /// All messages of one conversation.
    pub fn conversation(
        organization_id: impl Into<OrganizationId>,
        conversation_id: impl Into<ConversationId>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            conversation_id: conversation_id.into(),
            since: None,
            until: None,
            limit: None,
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Label used to bucket latency metrics.
    pub fn query_type(&self) -> &'static str {
        match (self.since.is_some() || self.until.is_some(), self.limit.is_some()) {
            (false, false) => "messages_by_conversation",
            (false, true) => "messages_recent",
            (true, _) => "messages_range",
        }
    }

    /// Cache key for this query. Every key of a conversation shares
    /// [`MessageQuery::conversation_prefix`].
    pub fn signature(&self) -> String {
        let fmt_ts = |ts: &Option<DateTime<Utc>>| {
            ts.map(|t| t.timestamp_micros().to_string()).unwrap_or_default()
        };
        format!(
            "{}since={};until={};limit={}",
            Self::conversation_prefix(&self.organization_id, &self.conversation_id),
            fmt_ts(&self.since),
            fmt_ts(&self.until),
            self.limit.map(|l| l.to_string()).unwrap_or_default()
        )
    }

    pub fn conversation_prefix(
        organization_id: &OrganizationId,
        conversation_id: &ConversationId,
    ) -> String {
        format!(
            "messages:{}:{}:",
            key_segment(organization_id.as_str()),
            key_segment(conversation_id.as_str())
        )
    }

    /// Whether `record` satisfies the equality and range filters (ignores `limit`).
    pub fn matches(&self, record: &MessageRecord) -> bool {
        record.organization_id == self.organization_id
            && record.conversation_id == self.conversation_id
            && self.since.is_none_or(|since| record.created_at >= since)
            && self.until.is_none_or(|until| record.created_at < until)
    }
}

/// Lifecycle status of a support conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Pending,
    Resolved,
    Closed,
}

/// A support conversation as shown in the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub organization_id: OrganizationId,
    pub subject: String,
    pub status: ConversationStatus,
    #[serde(default)]
    pub assignee_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Online status broadcast over a channel's presence primitive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

/// One user's presence as tracked on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    pub user_id: UserId,
    #[serde(default)]
    pub user_name: Option<String>,
    pub status: PresenceStatus,
    pub updated_at: DateTime<Utc>,
}

/// Typing indicator for one user on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub user_id: UserId,
    #[serde(default)]
    pub user_name: Option<String>,
    pub is_typing: bool,
    pub at: DateTime<Utc>,
}

/// The kind of an event flowing over a channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Message,
    Presence,
    Typing,
}

/// An event multiplexed over a single conversation channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ChannelEvent {
    /// A message confirmed by the store.
    Message(MessageRecord),
    /// A presence change for one user.
    Presence(PresenceState),
    /// A typing indicator change for one user.
    Typing(TypingEvent),
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::Message(_) => EventKind::Message,
            ChannelEvent::Presence(_) => EventKind::Presence,
            ChannelEvent::Typing(_) => EventKind::Typing,
        }
    }
}

/// Which events a subscription wants delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Only events of one kind.
    Only(EventKind),
    /// Every event on the channel.
    All,
}

impl EventFilter {
    pub fn accepts(&self, kind: EventKind) -> bool {
        match self {
            EventFilter::Only(wanted) => *wanted == kind,
            EventFilter::All => true,
        }
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        EventFilter::Only(kind)
    }
}
