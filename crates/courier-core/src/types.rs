// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the delivery pipeline and the response cache.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
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
    /// Client-generated message identifier, unique per device.
    ///
    /// Doubles as the idempotency key presented to the remote store.
    LocalId
);

string_id!(
    /// Identifier of a conversation (direct or group).
    ConversationId
);

string_id!(
    /// Identifier of a user account.
    UserId
);

string_id!(
    /// Identifier of a message as known to receipt tracking.
    MessageId
);

/// Delivery status of an outgoing message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

/// An outgoing message owned by the durable local queue until it is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub local_id: LocalId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub status: MessageStatus,
    /// Attached by the remote store once the message has been accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedMessage {
    /// A fresh pending message with no retries.
    pub fn new(
        local_id: LocalId,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id,
            conversation_id,
            sender_id,
            text: text.into(),
            created_at,
            retry_count: 0,
            status: MessageStatus::Pending,
            server_id: None,
            last_error: None,
        }
    }
}

/// Acknowledgement returned by the remote store for an accepted message write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAck {
    pub server_id: String,
}

/// Denormalized "last message" summary stored on a conversation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationPreview {
    pub conversation_id: ConversationId,
    pub last_message_id: String,
    pub last_message_text: String,
    pub sender_id: UserId,
    pub sent_at: DateTime<Utc>,
}

/// A message as held in the device-local message cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMessage {
    pub id: String,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Receipt sets of one message as reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceipts {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    #[serde(default)]
    pub delivered_to: BTreeSet<UserId>,
    #[serde(default)]
    pub read_by: BTreeSet<UserId>,
}

/// A change notification from a receipt subscription.
///
/// Delivered at least once and in order per query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptChange {
    /// A message document was added or modified.
    Upsert(MessageReceipts),
    /// A message document was deleted.
    Removed {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
}

/// Kind of cached artifact. Each kind has its own time-to-live.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CacheType {
    /// Suggested replies; stale quickly as the conversation moves on.
    AiReply,
    SearchResults,
    Summary,
    Priority,
    ActionItems,
    Decisions,
}

impl CacheType {
    /// Built-in time-to-live for this kind.
    pub fn default_ttl(self) -> Duration {
        match self {
            CacheType::AiReply => Duration::from_secs(5 * 60),
            CacheType::SearchResults => Duration::from_secs(30 * 60),
            CacheType::Summary => Duration::from_secs(60 * 60),
            CacheType::Priority => Duration::from_secs(60 * 60),
            CacheType::ActionItems => Duration::from_secs(2 * 60 * 60),
            CacheType::Decisions => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Scheduling priority of a batched cache request. Ordered `Low < Medium < High`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// A stored cache entry. The value is kept as JSON so one store serves every artifact type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub cache_type: CacheType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry is stale at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Input to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Feature requesting the completion (`summary`, `decisions`, ...).
    pub feature: String,
    pub input: String,
}

/// Restricts a vector search to a subset of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub conversation_id: Option<ConversationId>,
}

/// A nearest-neighbour hit from the vector search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
