// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote document store contract.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::CourierError;
use crate::types::{ConversationId, ConversationPreview, QueuedMessage, ReceiptChange, RemoteAck};

/// Ordered, at-least-once stream of receipt changes for one conversation.
pub type ReceiptStream = Pin<Box<dyn Stream<Item = ReceiptChange> + Send>>;

/// The managed backend that stores conversations and messages.
///
/// Writes are strongly ordered per document. Message writes are keyed by the
/// message's local id, so replaying the same write never creates a duplicate.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates (or idempotently re-creates) the message document keyed by `message.local_id`.
    async fn put_message(&self, message: &QueuedMessage) -> Result<RemoteAck, CourierError>;

    /// Overwrites the conversation's last-message preview.
    async fn update_conversation(&self, preview: &ConversationPreview)
    -> Result<(), CourierError>;

    /// Subscribes to receipt changes for every message of a conversation.
    async fn subscribe_receipts(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ReceiptStream, CourierError>;
}
