// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed optimistic operations.
//!
//! Every mutation the UI can stage is one variant of [`OperationKind`], so
//! apply, rollback and confirm are exhaustive matches with no runtime
//! payload probing.

use chrono::{DateTime, Utc};
use courier_core::{
    Conversation, ConversationId, ConversationStatus, MessageId, MessageRecord, NewMessage,
    OperationId, OrganizationId, UserId,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::state::Staged;

/// The entity family an operation mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Message,
    Conversation,
    Status,
    Assignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationAction {
    Create,
    Update,
    Delete,
}

/// What an operation does, with its strongly-typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationKind {
    /// Adds a message carrying a temporary id.
    CreateMessage { message: MessageRecord },
    UpdateMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
        content: String,
    },
    DeleteMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// Adds a conversation carrying a temporary id.
    CreateConversation { conversation: Conversation },
    UpdateConversation {
        conversation_id: ConversationId,
        subject: String,
    },
    DeleteConversation { conversation_id: ConversationId },
    ChangeStatus {
        conversation_id: ConversationId,
        status: ConversationStatus,
    },
    Assign {
        conversation_id: ConversationId,
        assignee: Option<UserId>,
    },
}

impl OperationKind {
    pub fn operation_type(&self) -> OperationType {
        match self {
            Self::CreateMessage { .. } | Self::UpdateMessage { .. } | Self::DeleteMessage { .. } => {
                OperationType::Message
            }
            Self::CreateConversation { .. }
            | Self::UpdateConversation { .. }
            | Self::DeleteConversation { .. } => OperationType::Conversation,
            Self::ChangeStatus { .. } => OperationType::Status,
            Self::Assign { .. } => OperationType::Assignment,
        }
    }

    pub fn action(&self) -> OperationAction {
        match self {
            Self::CreateMessage { .. } | Self::CreateConversation { .. } => OperationAction::Create,
            Self::DeleteMessage { .. } | Self::DeleteConversation { .. } => OperationAction::Delete,
            Self::UpdateMessage { .. }
            | Self::UpdateConversation { .. }
            | Self::ChangeStatus { .. }
            | Self::Assign { .. } => OperationAction::Update,
        }
    }
}

/// A staged mutation and its retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    /// Overrides the coordinator's configured retry budget.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: OperationId::generate(),
            kind,
            timestamp: Utc::now(),
            retry_count: 0,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// A message create whose row gets a temporary id until the store confirms it.
    pub fn create_message(draft: NewMessage) -> Self {
        Self::new(OperationKind::CreateMessage {
            message: draft.into_record(MessageId::temporary()),
        })
    }

    pub fn update_message(
        conversation_id: impl Into<ConversationId>,
        message_id: impl Into<MessageId>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(OperationKind::UpdateMessage {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            content: content.into(),
        })
    }

    pub fn delete_message(
        conversation_id: impl Into<ConversationId>,
        message_id: impl Into<MessageId>,
    ) -> Self {
        Self::new(OperationKind::DeleteMessage {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        })
    }

    /// A new open conversation with a temporary id.
    pub fn create_conversation(
        organization_id: impl Into<OrganizationId>,
        subject: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self::new(OperationKind::CreateConversation {
            conversation: Conversation {
                id: ConversationId::temporary(),
                organization_id: organization_id.into(),
                subject: subject.into(),
                status: ConversationStatus::Open,
                assignee_id: None,
                created_at: now,
                updated_at: now,
            },
        })
    }

    pub fn update_conversation(
        conversation_id: impl Into<ConversationId>,
        subject: impl Into<String>,
    ) -> Self {
        Self::new(OperationKind::UpdateConversation {
            conversation_id: conversation_id.into(),
            subject: subject.into(),
        })
    }

    pub fn delete_conversation(conversation_id: impl Into<ConversationId>) -> Self {
        Self::new(OperationKind::DeleteConversation {
            conversation_id: conversation_id.into(),
        })
    }

    pub fn change_status(
        conversation_id: impl Into<ConversationId>,
        status: ConversationStatus,
    ) -> Self {
        Self::new(OperationKind::ChangeStatus {
            conversation_id: conversation_id.into(),
            status,
        })
    }

    pub fn assign(conversation_id: impl Into<ConversationId>, assignee: Option<UserId>) -> Self {
        Self::new(OperationKind::Assign {
            conversation_id: conversation_id.into(),
            assignee,
        })
    }

    pub fn operation_type(&self) -> OperationType {
        self.kind.operation_type()
    }

    pub fn action(&self) -> OperationAction {
        self.kind.action()
    }
}

/// Pre-mutation snapshot captured when an operation is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum RollbackData {
    /// Pure creates have nothing to restore.
    None,
    Message(Staged<MessageRecord>),
    Conversation(Staged<Conversation>),
}

/// The client-visible entity an operation produced or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum OptimisticEntity {
    Message(Staged<MessageRecord>),
    Conversation(Staged<Conversation>),
}

/// An authoritative entity returned by the server for a confirmed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum ServerEntity {
    Message(MessageRecord),
    Conversation(Conversation),
}
