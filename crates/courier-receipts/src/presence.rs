// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Who is looking at which conversation right now.
//!
//! A recipient with the conversation open sees new messages live and must
//! not also get a push notification. Views are counted, so a user with the
//! same conversation open on two screens stays present until both close.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use courier_core::{ConversationId, UserId};

type Views = HashMap<ConversationId, HashMap<UserId, usize>>;

#[derive(Default)]
pub struct PresenceRegistry {
    views: Mutex<Views>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Views> {
        self.views.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record that `user_id` opened the conversation.
    pub fn enter(&self, user_id: &UserId, conversation_id: &ConversationId) {
        *self
            .lock()
            .entry(conversation_id.clone())
            .or_default()
            .entry(user_id.clone())
            .or_default() += 1;
    }

    /// Record that `user_id` closed one view of the conversation.
    /// Leaving without a matching enter is ignored.
    pub fn leave(&self, user_id: &UserId, conversation_id: &ConversationId) {
        let mut views = self.lock();
        let Some(viewers) = views.get_mut(conversation_id) else {
            return;
        };
        if let Some(count) = viewers.get_mut(user_id) {
            *count -= 1;
            if *count == 0 {
                viewers.remove(user_id);
            }
        }
        if viewers.is_empty() {
            views.remove(conversation_id);
        }
    }

    pub fn is_viewing(&self, user_id: &UserId, conversation_id: &ConversationId) -> bool {
        self.lock()
            .get(conversation_id)
            .is_some_and(|viewers| viewers.contains_key(user_id))
    }

    /// Whether a new message in the conversation should be pushed to `recipient`.
    pub fn should_push(&self, recipient: &UserId, conversation_id: &ConversationId) -> bool {
        !self.is_viewing(recipient, conversation_id)
    }

    /// Recipients that need a push: everyone except the sender and active viewers.
    pub fn push_targets(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        participants: impl IntoIterator<Item = UserId>,
    ) -> Vec<UserId> {
        let views = self.lock();
        let viewers = views.get(conversation_id);
        participants
            .into_iter()
            .filter(|u| u != sender_id)
            .filter(|u| viewers.is_none_or(|v| !v.contains_key(u)))
            .collect()
    }
}
