// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation-preview channel.
//!
//! Candidates are keyed by conversation. A candidate is accepted only when
//! its `last_message_id` is strictly greater than every id previously
//! accepted for that conversation; accepted candidates replace the pending
//! payload and restart the debounce window. When the window expires exactly
//! one `update_conversation` write is issued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_core::{ConversationId, ConversationPreview, CourierError, RemoteStore};
use tracing::{debug, warn};

use crate::metrics;
use crate::task_table::TaskTable;

const CHANNEL: &str = "preview";

/// A pending debounced write, keyed by its target conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchedUpdate {
    pub key: ConversationId,
    pub payload: ConversationPreview,
    /// Ordering key for the guard; local ids sort in creation order.
    pub last_message_id: String,
    pub scheduled_at: DateTime<Utc>,
}

impl BatchedUpdate {
    pub fn from_preview(payload: ConversationPreview, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            key: payload.conversation_id.clone(),
            last_message_id: payload.last_message_id.clone(),
            payload,
            scheduled_at,
        }
    }
}

#[derive(Default)]
struct State {
    pending: HashMap<ConversationId, BatchedUpdate>,
    /// Greatest id accepted per conversation, pending or already written.
    ///
    /// Never pruned: forgetting a written conversation would let a late,
    /// older candidate overwrite its remote preview. It holds one id per
    /// conversation this device previewed and lives as long as the channel,
    /// which is one client session.
    high_water: HashMap<ConversationId, String>,
}

struct Inner {
    remote: Arc<dyn RemoteStore>,
    window: Duration,
    state: Mutex<State>,
    /// Serializes remote writes so an older payload never lands after a newer one.
    writes: tokio::sync::Mutex<()>,
    timers: TaskTable<ConversationId>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl Inner {
    fn schedule(self: &Arc<Self>, key: ConversationId, replace: bool) {
        let weak = Arc::downgrade(self);
        let task = fire(weak, key.clone());
        if replace {
            self.timers.schedule_or_replace(key, self.window, task);
        } else {
            self.timers.schedule_if_absent(key, self.window, task);
        }
    }

    /// Write the pending payload for `key`, if any.
    async fn write(self: &Arc<Self>, key: &ConversationId) -> Result<bool, CourierError> {
        let _serial = self.writes.lock().await;
        self.write_serialized(key).await
    }

    /// Same as [`Inner::write`] for a caller already holding `writes`.
    async fn write_serialized(self: &Arc<Self>, key: &ConversationId) -> Result<bool, CourierError> {
        let Some(update) = lock(&self.state).pending.remove(key) else {
            return Ok(false);
        };

        match self.remote.update_conversation(&update.payload).await {
            Ok(()) => {
                metrics::record_write(CHANNEL);
                debug!(
                    conversation_id = %key,
                    last_message_id = %update.last_message_id,
                    "conversation preview written"
                );
                Ok(true)
            }
            Err(e) => {
                // Anything pending now was accepted later and is newer.
                lock(&self.state)
                    .pending
                    .entry(key.clone())
                    .or_insert(update);
                self.schedule(key.clone(), false);
                Err(e)
            }
        }
    }
}

async fn fire(inner: Weak<Inner>, key: ConversationId) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    if let Err(e) = inner.write(&key).await {
        warn!(conversation_id = %key, error = %e, "conversation preview write failed, kept pending");
    }
}

/// Debounced, guarded conversation-preview writes.
#[derive(Clone)]
pub struct PreviewChannel {
    inner: Arc<Inner>,
}

impl PreviewChannel {
    pub fn new(remote: Arc<dyn RemoteStore>, window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote,
                window,
                state: Mutex::new(State::default()),
                writes: tokio::sync::Mutex::new(()),
                timers: TaskTable::new(),
            }),
        }
    }

    /// Offer a candidate update. Returns `false` if the guard dropped it.
    pub fn submit(&self, update: BatchedUpdate) -> bool {
        let key = update.key.clone();
        {
            let mut state = lock(&self.inner.state);
            if let Some(current) = state.high_water.get(&key)
                && update.last_message_id.as_str() <= current.as_str()
            {
                debug!(
                    conversation_id = %key,
                    candidate = %update.last_message_id,
                    current = %current,
                    "stale preview candidate dropped"
                );
                metrics::record_stale_drop();
                return false;
            }
            state
                .high_water
                .insert(key.clone(), update.last_message_id.clone());
            state.pending.insert(key.clone(), update);
        }
        self.inner.schedule(key, true);
        true
    }

    /// Write `key`'s pending payload now. Returns whether a write was issued.
    ///
    /// A timer write already in progress lands before this returns.
    pub async fn flush_key(&self, key: &ConversationId) -> Result<bool, CourierError> {
        let _serial = self.inner.writes.lock().await;
        self.inner.timers.cancel(key);
        self.inner.write_serialized(key).await
    }

    /// Write every pending payload now. Returns the number of writes issued.
    ///
    /// Every key is attempted; the first error is returned and the failed
    /// payloads stay pending. A timer write already in progress lands
    /// before the pending set is read.
    pub async fn flush(&self) -> Result<usize, CourierError> {
        let _serial = self.inner.writes.lock().await;
        self.inner.timers.cancel_all();
        let keys: Vec<ConversationId> = lock(&self.inner.state).pending.keys().cloned().collect();

        let mut written = 0;
        let mut first_error = None;
        for key in keys {
            match self.inner.write_serialized(&key).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    pub fn pending(&self, key: &ConversationId) -> Option<BatchedUpdate> {
        lock(&self.inner.state).pending.get(key).cloned()
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.inner.state).pending.len()
    }

    pub fn is_scheduled(&self, key: &ConversationId) -> bool {
        self.inner.timers.is_scheduled(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_test_utils::MockRemoteStore;
    use proptest::prelude::*;

    const WINDOW: Duration = Duration::from_millis(300);

    fn update(conversation: &str, id: &str) -> BatchedUpdate {
        let preview = ConversationPreview {
            conversation_id: conversation.into(),
            last_message_id: id.to_string(),
            last_message_text: format!("text of {id}"),
            sender_id: "alice".into(),
            sent_at: Utc::now(),
        };
        BatchedUpdate::from_preview(preview, Utc::now())
    }

    fn channel() -> (Arc<MockRemoteStore>, PreviewChannel) {
        let remote = Arc::new(MockRemoteStore::new());
        let channel = PreviewChannel::new(remote.clone(), WINDOW);
        (remote, channel)
    }

    #[tokio::test(start_paused = true)]
    async fn two_updates_within_window_write_once() {
        let (remote, channel) = channel();
        assert!(channel.submit(update("c1", "msg_0001")));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(channel.submit(update("c1", "msg_0002")));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(remote.preview_writes().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let writes = remote.preview_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].last_message_id, "msg_0002");
    }

    #[tokio::test(start_paused = true)]
    async fn smaller_or_equal_ids_are_dropped() {
        let (remote, channel) = channel();
        assert!(channel.submit(update("c1", "msg_0002")));
        assert!(!channel.submit(update("c1", "msg_0001")));
        assert!(!channel.submit(update("c1", "msg_0002")));

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(remote.last_preview("c1").unwrap().last_message_id, "msg_0002");
    }

    #[tokio::test(start_paused = true)]
    async fn ids_older_than_a_written_preview_stay_dropped() {
        let (remote, channel) = channel();
        channel.submit(update("c1", "msg_0005"));
        channel.flush().await.unwrap();

        assert!(!channel.submit(update("c1", "msg_0003")));
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(remote.preview_writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_debounce_independently() {
        let (remote, channel) = channel();
        channel.submit(update("c1", "m1"));
        channel.submit(update("c2", "m1"));
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(remote.preview_writes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_immediately_and_is_idempotent() {
        let (remote, channel) = channel();
        channel.submit(update("c1", "m1"));
        assert_eq!(channel.flush().await.unwrap(), 1);
        assert_eq!(remote.preview_writes().len(), 1);
        assert!(!channel.is_scheduled(&"c1".into()));

        assert_eq!(channel.flush().await.unwrap(), 0);
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(remote.preview_writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_keeps_the_payload_pending() {
        let (remote, channel) = channel();
        remote.fail_next_previews(1);
        channel.submit(update("c1", "m1"));

        assert!(channel.flush_key(&"c1".into()).await.is_err());
        assert_eq!(channel.pending(&"c1".into()).unwrap().last_message_id, "m1");
        assert!(channel.is_scheduled(&"c1".into()));

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(remote.last_preview("c1").unwrap().last_message_id, "m1");
        assert_eq!(channel.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_waits_for_a_write_already_in_progress() {
        let (remote, channel) = channel();
        remote.set_preview_latency(Duration::from_millis(500));
        channel.submit(update("c1", "msg_0001"));

        // The window has closed and the timer's write is now in flight.
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        assert!(!channel.is_scheduled(&"c1".into()));
        assert!(remote.preview_writes().is_empty());

        assert_eq!(channel.flush().await.unwrap(), 0);
        assert_eq!(remote.preview_writes().len(), 1);
        assert_eq!(channel.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_key_waits_for_a_write_already_in_progress() {
        let (remote, channel) = channel();
        remote.set_preview_latency(Duration::from_millis(500));
        channel.submit(update("c1", "msg_0001"));
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;

        assert!(!channel.flush_key(&"c1".into()).await.unwrap());
        assert_eq!(remote.last_preview("c1").unwrap().last_message_id, "msg_0001");
    }

    proptest! {
        #[test]
        fn greatest_id_wins_in_any_order(order in Just(vec!["m1", "m2", "m3"]).prop_shuffle()) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();
            let writes = rt.block_on(async {
                let (remote, channel) = channel();
                for id in &order {
                    channel.submit(update("c1", id));
                }
                channel.flush().await.unwrap();
                remote.preview_writes()
            });
            prop_assert_eq!(writes.len(), 1);
            prop_assert_eq!(writes[0].last_message_id.as_str(), "m3");
        }
    }
}
