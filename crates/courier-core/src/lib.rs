// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier realtime sync engine.
//!
//! This crate provides the error type, identifiers, domain records and the
//! adapter traits for the two external collaborators: the durable message
//! store and the pub/sub transport.

pub mod error;
pub mod model;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CourierError;
pub use model::{
    ChannelEvent, Conversation, ConversationStatus, EventFilter, EventKind, MessageQuery,
    MessageRecord, NewMessage, PresenceState, PresenceStatus, TypingEvent,
};
pub use types::{
    AdapterType, ChannelKey, ConversationId, HealthStatus, MessageId, OperationId,
    OrganizationId, Priority, SenderType, UserId,
};

pub use traits::{MessageStore, PluginAdapter, Transport, TransportChannel};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn record(conversation: &str, secs: i64) -> MessageRecord {
        MessageRecord {
            id: MessageId::generate(),
            organization_id: "org-1".into(),
            conversation_id: conversation.into(),
            content: "hi".into(),
            sender_type: SenderType::Agent,
            sender_name: None,
            metadata: serde_json::Value::Null,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn retryable_classification() {
        assert!(CourierError::store("disk full").is_retryable());
        assert!(CourierError::transport("socket closed").is_retryable());
        assert!(
            CourierError::Timeout {
                duration: std::time::Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(
            !CourierError::RetriesExhausted {
                attempts: 3,
                last_error: "x".into()
            }
            .is_retryable()
        );
        assert!(!CourierError::InvalidOperation("bad".into()).is_retryable());
        assert!(!CourierError::Shutdown.is_retryable());
    }

    #[test]
    fn priority_orders_high_first() {
        let mut tiers = vec![Priority::Low, Priority::High, Priority::Medium];
        tiers.sort_by(|a, b| b.cmp(a));
        assert_eq!(tiers, vec![Priority::High, Priority::Medium, Priority::Low]);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn priority_parses_lowercase() {
        assert_eq!(Priority::from_str("high").unwrap(), Priority::High);
        assert_eq!(Priority::Low.to_string(), "low");
        assert!(Priority::from_str("urgent").is_err());
    }

    #[test]
    fn temporary_ids_are_tagged() {
        let temp = MessageId::temporary();
        assert!(temp.is_temporary());
        assert!(!MessageId::generate().is_temporary());
        assert_ne!(temp, MessageId::temporary());
    }

    #[test]
    fn channel_topic_includes_both_ids() {
        let key = ChannelKey::new("org-1", "conv-9");
        assert_eq!(key.topic("conversation"), "conversation:org-1:conv-9");
        assert_eq!(key.to_string(), "org-1/conv-9");
    }

    #[test]
    fn colons_in_ids_do_not_alias_keys() {
        let left = ChannelKey::new("a:b", "c");
        let right = ChannelKey::new("a", "b:c");
        assert_ne!(left.topic("conversation"), right.topic("conversation"));
        assert_eq!(left.topic("conversation"), "conversation:a%3Ab:c");

        let left_q = MessageQuery::conversation("a:b", "c");
        let right_q = MessageQuery::conversation("a", "b:c");
        assert_ne!(left_q.signature(), right_q.signature());

        let escaped = MessageQuery::conversation_prefix(&"a%3Ab".into(), &"c".into());
        assert_ne!(
            escaped,
            MessageQuery::conversation_prefix(&"a:b".into(), &"c".into())
        );
        assert!(!right_q.signature().starts_with(&escaped));
    }

    #[test]
    fn query_signature_shares_conversation_prefix() {
        let base = MessageQuery::conversation("org-1", "conv-1");
        let ranged = base.clone().since(Utc::now()).limit(20);
        let prefix = MessageQuery::conversation_prefix(&"org-1".into(), &"conv-1".into());

        assert!(base.signature().starts_with(&prefix));
        assert!(ranged.signature().starts_with(&prefix));
        assert_ne!(base.signature(), ranged.signature());
        assert_eq!(base.query_type(), "messages_by_conversation");
        assert_eq!(ranged.query_type(), "messages_range");
    }

    #[test]
    fn query_range_filter() {
        let start = Utc.timestamp_opt(1_700_000_010, 0).unwrap();
        let query = MessageQuery::conversation("org-1", "conv-1")
            .since(start)
            .until(start + Duration::seconds(10));

        assert!(!query.matches(&record("conv-1", 5)));
        assert!(query.matches(&record("conv-1", 10)));
        assert!(query.matches(&record("conv-1", 19)));
        assert!(!query.matches(&record("conv-1", 20)));
        assert!(!query.matches(&record("conv-2", 12)));
    }

    #[test]
    fn event_filter_wildcard() {
        assert!(EventFilter::All.accepts(EventKind::Typing));
        assert!(EventFilter::from(EventKind::Message).accepts(EventKind::Message));
        assert!(!EventFilter::Only(EventKind::Message).accepts(EventKind::Presence));
    }

    #[test]
    fn channel_event_serializes_tagged() {
        let event = ChannelEvent::Typing(TypingEvent {
            user_id: "u1".into(),
            user_name: None,
            is_typing: true,
            at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "typing");
        assert_eq!(json["payload"]["is_typing"], true);
        assert_eq!(event.kind(), EventKind::Typing);
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_store<T: MessageStore>() {}
        fn _assert_transport<T: Transport>() {}
        fn _assert_transport_channel<T: TransportChannel>() {}
        fn _assert_plugin<T: PluginAdapter>() {}
    }
}
