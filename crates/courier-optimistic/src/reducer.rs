// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Apply, rollback and confirm as functions of an operation and a state.
//!
//! Nothing here captures outside state, so any step can be replayed from a
//! logged [`Operation`] and its [`RollbackData`].

use courier_core::{Conversation, ConversationId, CourierError, MessageId, MessageRecord};

use crate::operation::{Operation, OperationKind, OptimisticEntity, RollbackData, ServerEntity};
use crate::state::{InboxState, OptimisticMeta, Staged};

fn tag(op: &Operation, temp_id: Option<String>) -> Option<OptimisticMeta> {
    Some(OptimisticMeta::pending(op.id.clone(), temp_id))
}

fn message_not_found(id: impl ToString) -> CourierError {
    CourierError::EntityNotFound {
        entity: "message",
        id: id.to_string(),
    }
}

fn conversation_not_found(id: impl ToString) -> CourierError {
    CourierError::EntityNotFound {
        entity: "conversation",
        id: id.to_string(),
    }
}

/// Applies `op` to `state` and returns the visible entity plus what is
/// needed to undo it. Leaves `state` untouched on error.
pub fn apply(
    op: &Operation,
    state: &mut InboxState,
) -> Result<(OptimisticEntity, RollbackData), CourierError> {
    match &op.kind {
        OperationKind::CreateMessage { message } => {
            if state.message(&message.conversation_id, &message.id).is_some() {
                return Err(CourierError::InvalidOperation(format!(
                    "message {} is already staged",
                    message.id
                )));
            }
            let staged = Staged {
                entity: message.clone(),
                optimistic: tag(op, Some(message.id.to_string())),
            };
            state.insert_message(staged.clone());
            Ok((OptimisticEntity::Message(staged), RollbackData::None))
        }
        OperationKind::UpdateMessage {
            conversation_id,
            message_id,
            content,
        } => {
            let target = state
                .message_mut(conversation_id, message_id)
                .ok_or_else(|| message_not_found(message_id))?;
            let before = target.clone();
            target.entity.content = content.clone();
            target.optimistic = tag(op, None);
            Ok((
                OptimisticEntity::Message(target.clone()),
                RollbackData::Message(before),
            ))
        }
        OperationKind::DeleteMessage {
            conversation_id,
            message_id,
        } => {
            let before = state
                .remove_message(conversation_id, message_id)
                .ok_or_else(|| message_not_found(message_id))?;
            let visible = Staged {
                entity: before.entity.clone(),
                optimistic: tag(op, None),
            };
            Ok((OptimisticEntity::Message(visible), RollbackData::Message(before)))
        }
        OperationKind::CreateConversation { conversation } => {
            if state.conversation(&conversation.id).is_some() {
                return Err(CourierError::InvalidOperation(format!(
                    "conversation {} is already staged",
                    conversation.id
                )));
            }
            let staged = Staged {
                entity: conversation.clone(),
                optimistic: tag(op, Some(conversation.id.to_string())),
            };
            state.insert_conversation(staged.clone());
            Ok((OptimisticEntity::Conversation(staged), RollbackData::None))
        }
        OperationKind::DeleteConversation { conversation_id } => {
            let before = state
                .remove_conversation(conversation_id)
                .ok_or_else(|| conversation_not_found(conversation_id))?;
            let visible = Staged {
                entity: before.entity.clone(),
                optimistic: tag(op, None),
            };
            Ok((
                OptimisticEntity::Conversation(visible),
                RollbackData::Conversation(before),
            ))
        }
        OperationKind::UpdateConversation {
            conversation_id, ..
        }
        | OperationKind::ChangeStatus {
            conversation_id, ..
        }
        | OperationKind::Assign {
            conversation_id, ..
        } => {
            let target = state
                .conversation_mut(conversation_id)
                .ok_or_else(|| conversation_not_found(conversation_id))?;
            let before = target.clone();
            set_conversation_fields(&op.kind, &mut target.entity);
            target.optimistic = tag(op, None);
            Ok((
                OptimisticEntity::Conversation(target.clone()),
                RollbackData::Conversation(before),
            ))
        }
    }
}

/// Writes the fields a conversation update changes.
fn set_conversation_fields(kind: &OperationKind, conversation: &mut Conversation) {
    match kind {
        OperationKind::UpdateConversation { subject, .. } => conversation.subject = subject.clone(),
        OperationKind::ChangeStatus { status, .. } => conversation.status = *status,
        OperationKind::Assign { assignee, .. } => conversation.assignee_id = assignee.clone(),
        _ => {}
    }
}

/// Copies back the fields a conversation update changed.
fn restore_conversation_fields(kind: &OperationKind, from: &Conversation, to: &mut Conversation) {
    match kind {
        OperationKind::UpdateConversation { .. } => to.subject = from.subject.clone(),
        OperationKind::ChangeStatus { .. } => to.status = from.status,
        OperationKind::Assign { .. } => to.assignee_id = from.assignee_id.clone(),
        _ => {}
    }
}

fn mismatch(op: &Operation, what: &str) -> CourierError {
    CourierError::InvalidOperation(format!(
        "{} {} cannot use {what}",
        op.operation_type(),
        op.action()
    ))
}

/// Undoes `op` using the snapshot captured when it was applied.
///
/// Creates are removed by temporary id, updates restore only the fields they
/// changed, deletes re-insert the snapshot in timestamp order.
pub fn rollback(
    op: &Operation,
    data: &RollbackData,
    state: &mut InboxState,
) -> Result<(), CourierError> {
    match (&op.kind, data) {
        (OperationKind::CreateMessage { message }, RollbackData::None) => {
            state.remove_message(&message.conversation_id, &message.id);
        }
        (OperationKind::CreateConversation { conversation }, RollbackData::None) => {
            state.remove_conversation(&conversation.id);
        }
        (
            OperationKind::UpdateMessage {
                conversation_id,
                message_id,
                ..
            },
            RollbackData::Message(before),
        ) => {
            if let Some(target) = state.message_mut(conversation_id, message_id) {
                target.entity.content = before.entity.content.clone();
                target.optimistic = before.optimistic.clone();
            }
        }
        (OperationKind::DeleteMessage { .. }, RollbackData::Message(before)) => {
            state.insert_message(before.clone());
        }
        (OperationKind::DeleteConversation { .. }, RollbackData::Conversation(before)) => {
            state.insert_conversation(before.clone());
        }
        (
            OperationKind::UpdateConversation {
                conversation_id, ..
            }
            | OperationKind::ChangeStatus {
                conversation_id, ..
            }
            | OperationKind::Assign {
                conversation_id, ..
            },
            RollbackData::Conversation(before),
        ) => {
            if let Some(target) = state.conversation_mut(conversation_id) {
                restore_conversation_fields(&op.kind, &before.entity, &mut target.entity);
                target.optimistic = before.optimistic.clone();
            }
        }
        _ => return Err(mismatch(op, "this rollback snapshot")),
    }
    Ok(())
}

/// Merges the server's answer over the staged entity and strips the
/// optimistic tag. With no server entity the staged data is kept as-is.
pub fn confirm(
    op: &Operation,
    server: Option<ServerEntity>,
    state: &mut InboxState,
) -> Result<(), CourierError> {
    match (&op.kind, server) {
        (OperationKind::CreateMessage { message }, Some(ServerEntity::Message(row))) => {
            state.remove_message(&message.conversation_id, &message.id);
            // A broadcast of the same row may already have landed.
            state.remove_message(&row.conversation_id, &row.id);
            state.insert_message(Staged::confirmed(row));
        }
        (
            OperationKind::UpdateMessage {
                conversation_id,
                message_id,
                ..
            },
            Some(ServerEntity::Message(row)),
        ) => {
            replace_message(state, conversation_id, message_id, row);
        }
        (OperationKind::CreateConversation { conversation }, Some(ServerEntity::Conversation(c))) => {
            state.remove_conversation(&conversation.id);
            state.remove_conversation(&c.id);
            state.insert_conversation(Staged::confirmed(c));
        }
        (
            OperationKind::UpdateConversation {
                conversation_id, ..
            }
            | OperationKind::ChangeStatus {
                conversation_id, ..
            }
            | OperationKind::Assign {
                conversation_id, ..
            },
            Some(ServerEntity::Conversation(c)),
        ) => {
            state.remove_conversation(conversation_id);
            state.remove_conversation(&c.id);
            state.insert_conversation(Staged::confirmed(c));
        }
        (OperationKind::DeleteMessage { .. } | OperationKind::DeleteConversation { .. }, _) => {}
        (_, None) => strip_tag(op, state),
        (_, Some(_)) => return Err(mismatch(op, "this server entity")),
    }
    Ok(())
}

fn replace_message(
    state: &mut InboxState,
    conversation_id: &ConversationId,
    message_id: &MessageId,
    row: MessageRecord,
) {
    state.remove_message(conversation_id, message_id);
    state.remove_message(&row.conversation_id, &row.id);
    state.insert_message(Staged::confirmed(row));
}

/// Removes the tag `op` put on its entity, keeping the staged data.
fn strip_tag(op: &Operation, state: &mut InboxState) {
    if let Some(meta) = meta_mut(op, state) {
        *meta = None;
    }
}

/// The optimistic tag of the entity `op` touched, if `op` still owns it.
pub(crate) fn meta_mut<'a>(
    op: &Operation,
    state: &'a mut InboxState,
) -> Option<&'a mut Option<OptimisticMeta>> {
    match &op.kind {
        OperationKind::CreateMessage { message } => state
            .message_mut(&message.conversation_id, &message.id)
            .filter(|m| m.tagged_by(&op.id))
            .map(|m| &mut m.optimistic),
        OperationKind::UpdateMessage {
            conversation_id,
            message_id,
            ..
        } => state
            .message_mut(conversation_id, message_id)
            .filter(|m| m.tagged_by(&op.id))
            .map(|m| &mut m.optimistic),
        OperationKind::CreateConversation { conversation } => state
            .conversation_mut(&conversation.id)
            .filter(|c| c.tagged_by(&op.id))
            .map(|c| &mut c.optimistic),
        OperationKind::UpdateConversation {
            conversation_id, ..
        }
        | OperationKind::ChangeStatus {
            conversation_id, ..
        }
        | OperationKind::Assign {
            conversation_id, ..
        } => state
            .conversation_mut(conversation_id)
            .filter(|c| c.tagged_by(&op.id))
            .map(|c| &mut c.optimistic),
        OperationKind::DeleteMessage { .. } | OperationKind::DeleteConversation { .. } => None,
    }
}

/// Upserts a confirmed message that arrived from another client.
pub fn apply_remote_message(row: MessageRecord, state: &mut InboxState) {
    state.remove_message(&row.conversation_id, &row.id);
    state.insert_message(Staged::confirmed(row));
}

/// Upserts a confirmed conversation that arrived from another client.
pub fn apply_remote_conversation(conversation: Conversation, state: &mut InboxState) {
    state.remove_conversation(&conversation.id);
    state.insert_conversation(Staged::confirmed(conversation));
}
