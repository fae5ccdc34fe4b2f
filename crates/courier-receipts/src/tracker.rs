// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery and read receipt sets per message.
//!
//! Receipt sets only grow: every mark and every remote change is a set
//! union, so replays and at-least-once redelivery are harmless. The sender
//! is a member of both sets from creation. Unread counts are derived on
//! demand and never stored, which keeps them consistent whether the sets
//! were filled by the live listener or by a snapshot read after reconnect.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use courier_core::{
    ConversationId, CourierError, MessageId, MessageReceipts, ReceiptChange, ReceiptStream,
    RemoteStore, UserId,
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Default)]
struct State {
    conversations: HashMap<ConversationId, BTreeMap<MessageId, MessageReceipts>>,
    /// Message to owning conversation.
    index: HashMap<MessageId, ConversationId>,
}

impl State {
    fn message_mut(&mut self, message_id: &MessageId) -> Result<&mut MessageReceipts, CourierError> {
        self.index
            .get(message_id)
            .and_then(|c| self.conversations.get_mut(c))
            .and_then(|messages| messages.get_mut(message_id))
            .ok_or_else(|| not_found(message_id))
    }

    /// Union `incoming` into the stored receipts, inserting the message if new.
    /// Returns the merged receipts.
    fn merge(&mut self, mut incoming: MessageReceipts) -> MessageReceipts {
        incoming.read_by.insert(incoming.sender_id.clone());
        incoming.delivered_to.insert(incoming.sender_id.clone());
        let read = incoming.read_by.clone();
        incoming.delivered_to.extend(read);

        self.index
            .insert(incoming.message_id.clone(), incoming.conversation_id.clone());
        let messages = self
            .conversations
            .entry(incoming.conversation_id.clone())
            .or_default();
        match messages.get_mut(&incoming.message_id) {
            Some(existing) => {
                existing.delivered_to.extend(incoming.delivered_to);
                existing.read_by.extend(incoming.read_by);
                existing.clone()
            }
            None => {
                messages.insert(incoming.message_id.clone(), incoming.clone());
                incoming
            }
        }
    }

    fn remove(&mut self, conversation_id: &ConversationId, message_id: &MessageId) -> bool {
        let removed = self
            .conversations
            .get_mut(conversation_id)
            .and_then(|messages| messages.remove(message_id))
            .is_some();
        if removed {
            self.index.remove(message_id);
        }
        removed
    }
}

fn not_found(message_id: &MessageId) -> CourierError {
    CourierError::NotFound {
        kind: "message",
        id: message_id.to_string(),
    }
}

/// In-memory receipt sets for every known message.
#[derive(Default)]
pub struct DeliveryTracker {
    state: RwLock<State>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Start tracking a message. The sender has read and received it.
    ///
    /// Registering a known message keeps its existing receipts.
    pub fn register_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        sender_id: UserId,
    ) -> MessageReceipts {
        self.write().merge(MessageReceipts {
            message_id,
            conversation_id,
            sender_id,
            delivered_to: Default::default(),
            read_by: Default::default(),
        })
    }

    /// Add `user_id` to the message's delivered set. Returns whether it was newly added.
    pub fn mark_delivered(&self, message_id: &MessageId, user_id: &UserId) -> Result<bool, CourierError> {
        let mut state = self.write();
        let receipts = state.message_mut(message_id)?;
        Ok(receipts.delivered_to.insert(user_id.clone()))
    }

    /// Add `user_id` to the message's read set, and to its delivered set if absent.
    /// Returns whether the read was new.
    pub fn mark_read(&self, message_id: &MessageId, user_id: &UserId) -> Result<bool, CourierError> {
        let mut state = self.write();
        let receipts = state.message_mut(message_id)?;
        receipts.delivered_to.insert(user_id.clone());
        let newly_read = receipts.read_by.insert(user_id.clone());
        if newly_read {
            debug!(message_id = %message_id, user_id = %user_id, "message read");
        }
        Ok(newly_read)
    }

    /// Mark every message of the conversation read by `user_id`.
    /// Returns the ids that were unread before, in id order.
    pub fn mark_conversation_read(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Vec<MessageId> {
        let mut state = self.write();
        let Some(messages) = state.conversations.get_mut(conversation_id) else {
            return Vec::new();
        };
        let mut newly_read = Vec::new();
        for receipts in messages.values_mut() {
            receipts.delivered_to.insert(user_id.clone());
            if receipts.read_by.insert(user_id.clone()) {
                newly_read.push(receipts.message_id.clone());
            }
        }
        newly_read
    }

    /// Messages of the conversation that `user_id` has not read.
    pub fn unread_count_for(&self, user_id: &UserId, conversation_id: &ConversationId) -> usize {
        self.read()
            .conversations
            .get(conversation_id)
            .map_or(0, |messages| {
                messages
                    .values()
                    .filter(|r| !r.read_by.contains(user_id))
                    .count()
            })
    }

    pub fn receipts(&self, message_id: &MessageId) -> Option<MessageReceipts> {
        let state = self.read();
        let conversation = state.index.get(message_id)?;
        state.conversations.get(conversation)?.get(message_id).cloned()
    }

    pub fn message_count(&self, conversation_id: &ConversationId) -> usize {
        self.read()
            .conversations
            .get(conversation_id)
            .map_or(0, BTreeMap::len)
    }

    /// Apply one change notification from the remote store.
    pub fn apply_change(&self, change: ReceiptChange) {
        let mut state = self.write();
        match change {
            ReceiptChange::Upsert(receipts) => {
                state.merge(receipts);
            }
            ReceiptChange::Removed {
                conversation_id,
                message_id,
            } => {
                state.remove(&conversation_id, &message_id);
            }
        }
    }

    /// Reconcile a conversation with a full batch read.
    ///
    /// Messages absent from the snapshot are dropped; the rest are merged
    /// with local marks that may not have reached the remote store yet.
    pub fn apply_snapshot(&self, conversation_id: &ConversationId, snapshot: Vec<MessageReceipts>) {
        let mut state = self.write();
        let previous = state.conversations.remove(conversation_id).unwrap_or_default();
        for message_id in previous.keys() {
            state.index.remove(message_id);
        }

        let mut kept = 0;
        for receipts in snapshot {
            if &receipts.conversation_id != conversation_id {
                continue;
            }
            let local = previous.get(&receipts.message_id).cloned();
            state.merge(receipts);
            if let Some(local) = local {
                state.merge(local);
            }
            kept += 1;
        }
        info!(
            conversation_id = %conversation_id,
            previous = previous.len(),
            messages = kept,
            "receipts reconciled from snapshot"
        );
    }

    /// Apply changes from a listener stream until it ends or `cancel` fires.
    /// Returns the number of changes applied.
    pub async fn follow(&self, mut stream: ReceiptStream, cancel: CancellationToken) -> usize {
        let mut applied = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.next() => match next {
                    Some(change) => {
                        self.apply_change(change);
                        applied += 1;
                    }
                    None => {
                        debug!("receipt stream ended");
                        break;
                    }
                },
            }
        }
        applied
    }

    /// Subscribe to a conversation's receipts and [`follow`](Self::follow) them.
    pub async fn follow_conversation(
        &self,
        remote: &dyn RemoteStore,
        conversation_id: &ConversationId,
        cancel: CancellationToken,
    ) -> Result<usize, CourierError> {
        let stream = remote.subscribe_receipts(conversation_id).await?;
        Ok(self.follow(stream, cancel).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(messages: &[(&str, &str)]) -> DeliveryTracker {
        let tracker = DeliveryTracker::new();
        for (id, sender) in messages {
            tracker.register_message("c1".into(), (*id).into(), (*sender).into());
        }
        tracker
    }

    #[test]
    fn sender_has_read_their_own_message() {
        let tracker = DeliveryTracker::new();
        let receipts = tracker.register_message("c1".into(), "m1".into(), "alice".into());
        assert!(receipts.read_by.contains(&UserId::from("alice")));
        assert!(receipts.delivered_to.contains(&UserId::from("alice")));
        assert_eq!(tracker.unread_count_for(&"alice".into(), &"c1".into()), 0);
        assert_eq!(tracker.unread_count_for(&"bob".into(), &"c1".into()), 1);
    }

    #[test]
    fn read_implies_delivered() {
        let tracker = tracker_with(&[("m1", "alice")]);
        assert!(tracker.mark_read(&"m1".into(), &"bob".into()).unwrap());
        let receipts = tracker.receipts(&"m1".into()).unwrap();
        assert!(receipts.delivered_to.contains(&UserId::from("bob")));
        assert!(receipts.read_by.contains(&UserId::from("bob")));
    }

    #[test]
    fn marks_are_idempotent() {
        let tracker = tracker_with(&[("m1", "alice")]);
        assert!(tracker.mark_delivered(&"m1".into(), &"bob".into()).unwrap());
        assert!(!tracker.mark_delivered(&"m1".into(), &"bob".into()).unwrap());
        assert!(tracker.mark_read(&"m1".into(), &"bob".into()).unwrap());
        assert!(!tracker.mark_read(&"m1".into(), &"bob".into()).unwrap());
        assert_eq!(tracker.receipts(&"m1".into()).unwrap().read_by.len(), 2);
    }

    #[test]
    fn unknown_message_is_not_found() {
        let tracker = DeliveryTracker::new();
        let err = tracker.mark_read(&"nope".into(), &"bob".into()).unwrap_err();
        assert!(matches!(err, CourierError::NotFound { kind: "message", .. }));
    }

    #[test]
    fn group_read_state_is_per_recipient() {
        let tracker = tracker_with(&[("m1", "alice"), ("m2", "alice")]);
        tracker.mark_read(&"m1".into(), &"bob".into()).unwrap();
        assert_eq!(tracker.unread_count_for(&"bob".into(), &"c1".into()), 1);
        assert_eq!(tracker.unread_count_for(&"carol".into(), &"c1".into()), 2);
    }

    #[test]
    fn conversation_read_returns_newly_read_ids() {
        let tracker = tracker_with(&[("m1", "alice"), ("m2", "bob"), ("m3", "alice")]);
        tracker.mark_read(&"m1".into(), &"bob".into()).unwrap();
        let newly = tracker.mark_conversation_read(&"c1".into(), &"bob".into());
        assert_eq!(newly, vec![MessageId::from("m3")]);
        assert_eq!(tracker.unread_count_for(&"bob".into(), &"c1".into()), 0);
        assert!(tracker.mark_conversation_read(&"c1".into(), &"bob".into()).is_empty());
    }

    #[test]
    fn removal_drops_the_message_from_counts() {
        let tracker = tracker_with(&[("m1", "alice"), ("m2", "alice")]);
        tracker.apply_change(ReceiptChange::Removed {
            conversation_id: "c1".into(),
            message_id: "m2".into(),
        });
        assert_eq!(tracker.unread_count_for(&"bob".into(), &"c1".into()), 1);
        assert!(tracker.receipts(&"m2".into()).is_none());
    }

    #[test]
    fn snapshot_keeps_local_marks_not_yet_in_the_remote() {
        let tracker = tracker_with(&[("m1", "alice"), ("m2", "alice")]);
        tracker.mark_read(&"m1".into(), &"bob".into()).unwrap();

        let remote_m1 = MessageReceipts {
            message_id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "alice".into(),
            delivered_to: Default::default(),
            read_by: std::collections::BTreeSet::from([UserId::from("carol")]),
        };
        tracker.apply_snapshot(&"c1".into(), vec![remote_m1]);

        assert_eq!(tracker.message_count(&"c1".into()), 1);
        let receipts = tracker.receipts(&"m1".into()).unwrap();
        assert!(receipts.read_by.contains(&UserId::from("bob")));
        assert!(receipts.read_by.contains(&UserId::from("carol")));
        assert!(tracker.receipts(&"m2".into()).is_none());
    }
}
