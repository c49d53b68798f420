// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-visible inbox state with optimistic tagging.
//!
//! Conversations are kept newest-activity first (`updated_at` descending);
//! each conversation's messages oldest first (`created_at` ascending).
//! Equal timestamps keep insertion order.

use std::collections::BTreeMap;

use courier_core::{Conversation, ConversationId, MessageId, MessageRecord, OperationId};
use serde::{Deserialize, Serialize};

/// Marks an entity as staged but not yet confirmed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticMeta {
    /// The operation that last touched the entity.
    pub operation_id: OperationId,
    /// Client-generated id of an entity created optimistically.
    pub temp_id: Option<String>,
    pub pending: bool,
    /// Set when the operation failed terminally; the entity stays visible.
    pub error: Option<String>,
    pub retry_count: u32,
}

impl OptimisticMeta {
    pub fn pending(operation_id: OperationId, temp_id: Option<String>) -> Self {
        Self {
            operation_id,
            temp_id,
            pending: true,
            error: None,
            retry_count: 0,
        }
    }
}

/// An entity plus its optimistic tag, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staged<T> {
    pub entity: T,
    #[serde(default)]
    pub optimistic: Option<OptimisticMeta>,
}

impl<T> Staged<T> {
    /// A server-confirmed entity with no optimistic flags.
    pub fn confirmed(entity: T) -> Self {
        Self {
            entity,
            optimistic: None,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        self.optimistic.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.optimistic.as_ref().is_some_and(|m| m.pending)
    }

    pub fn error(&self) -> Option<&str> {
        self.optimistic.as_ref().and_then(|m| m.error.as_deref())
    }

    /// Whether the tag belongs to `operation`.
    pub(crate) fn tagged_by(&self, operation: &OperationId) -> bool {
        self.optimistic
            .as_ref()
            .is_some_and(|m| &m.operation_id == operation)
    }
}

/// Everything the UI renders from: conversations and their messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboxState {
    pub conversations: Vec<Staged<Conversation>>,
    pub messages: BTreeMap<ConversationId, Vec<Staged<MessageRecord>>>,
}

impl InboxState {
    pub fn conversation(&self, id: &ConversationId) -> Option<&Staged<Conversation>> {
        self.conversations.iter().find(|c| &c.entity.id == id)
    }

    pub(crate) fn conversation_mut(
        &mut self,
        id: &ConversationId,
    ) -> Option<&mut Staged<Conversation>> {
        self.conversations.iter_mut().find(|c| &c.entity.id == id)
    }

    pub(crate) fn remove_conversation(
        &mut self,
        id: &ConversationId,
    ) -> Option<Staged<Conversation>> {
        let at = self.conversations.iter().position(|c| &c.entity.id == id)?;
        Some(self.conversations.remove(at))
    }

    /// Inserts behind every conversation with equal or newer activity.
    pub(crate) fn insert_conversation(&mut self, staged: Staged<Conversation>) {
        let at = self
            .conversations
            .iter()
            .position(|c| c.entity.updated_at < staged.entity.updated_at)
            .unwrap_or(self.conversations.len());
        self.conversations.insert(at, staged);
    }

    pub fn messages(&self, conversation: &ConversationId) -> &[Staged<MessageRecord>] {
        self.messages
            .get(conversation)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn message(
        &self,
        conversation: &ConversationId,
        id: &MessageId,
    ) -> Option<&Staged<MessageRecord>> {
        self.messages(conversation).iter().find(|m| &m.entity.id == id)
    }

    pub(crate) fn message_mut(
        &mut self,
        conversation: &ConversationId,
        id: &MessageId,
    ) -> Option<&mut Staged<MessageRecord>> {
        self.messages
            .get_mut(conversation)?
            .iter_mut()
            .find(|m| &m.entity.id == id)
    }

    pub(crate) fn remove_message(
        &mut self,
        conversation: &ConversationId,
        id: &MessageId,
    ) -> Option<Staged<MessageRecord>> {
        let list = self.messages.get_mut(conversation)?;
        let at = list.iter().position(|m| &m.entity.id == id)?;
        let removed = list.remove(at);
        if list.is_empty() {
            self.messages.remove(conversation);
        }
        Some(removed)
    }

    /// Inserts behind every message created at or before this one.
    pub(crate) fn insert_message(&mut self, staged: Staged<MessageRecord>) {
        let list = self
            .messages
            .entry(staged.entity.conversation_id.clone())
            .or_default();
        let at = list
            .iter()
            .position(|m| m.entity.created_at > staged.entity.created_at)
            .unwrap_or(list.len());
        list.insert(at, staged);
    }

    /// Entities still carrying an optimistic tag.
    pub fn optimistic_count(&self) -> usize {
        let conversations = self.conversations.iter().filter(|c| c.is_optimistic()).count();
        let messages = self
            .messages
            .values()
            .flatten()
            .filter(|m| m.is_optimistic())
            .count();
        conversations + messages
    }
}
