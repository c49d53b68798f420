// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifiers and small enums shared across the Courier engine.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Prefix carried by identifiers generated client-side before confirmation.
pub const TEMP_ID_PREFIX: &str = "temp-";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Generates a temporary client-side identifier.
            pub fn temporary() -> Self {
                Self(format!("{TEMP_ID_PREFIX}{}", uuid::Uuid::new_v4()))
            }

            /// Whether this identifier was generated client-side and not yet confirmed.
            pub fn is_temporary(&self) -> bool {
                self.0.starts_with(TEMP_ID_PREFIX)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Tenant that owns conversations.
    OrganizationId
);
string_id!(
    /// A support conversation inside an organization.
    ConversationId
);
string_id!(
    /// A single chat message.
    MessageId
);
string_id!(
    /// A human agent or end customer.
    UserId
);
string_id!(
    /// A staged optimistic operation.
    OperationId
);

/// Identifies one logical pub/sub channel: an (organization, conversation) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    pub organization_id: OrganizationId,
    pub conversation_id: ConversationId,
}

impl ChannelKey {
    pub fn new(
        organization_id: impl Into<OrganizationId>,
        conversation_id: impl Into<ConversationId>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            conversation_id: conversation_id.into(),
        }
    }

    /// Transport-level channel name, e.g. `conversation:org-1:conv-9`.
    pub fn topic(&self, prefix: &str) -> String {
        format!(
            "{prefix}:{}:{}",
            key_segment(self.organization_id.as_str()),
            key_segment(self.conversation_id.as_str())
        )
    }
}

/// Escapes one component of a `:`-joined key so that distinct component
/// tuples never render to the same key. Only `%` and `:` are rewritten.
pub fn key_segment(raw: &str) -> Cow<'_, str> {
    if !raw.contains([':', '%']) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.organization_id, self.conversation_id)
    }
}

/// Delivery priority for outbound messages. Higher variants flush first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Numeric rank used for queue ordering; larger is more urgent.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Who authored a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Customer,
    Agent,
    System,
    Bot,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter plugged into the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Store,
    Transport,
    Observability,
}
