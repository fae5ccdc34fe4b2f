// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local message-cache channel.
//!
//! Every message received during a window is kept; nothing collapses. The
//! window opens with the first message of a batch and is not extended by
//! later ones. On expiry the batch is merged into the conversation's cached
//! message list in the key-value store with a single write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use courier_core::{CachedMessage, ConversationId, CourierError, KeyValueStore};
use tracing::{debug, error, warn};

use crate::metrics;
use crate::task_table::TaskTable;

const CHANNEL: &str = "local_cache";

/// Key-value prefix of the per-conversation message cache.
pub const MESSAGE_CACHE_PREFIX: &str = "courier.messages.";

pub fn message_cache_key(conversation: &ConversationId) -> String {
    format!("{MESSAGE_CACHE_PREFIX}{conversation}")
}

type Batches = HashMap<ConversationId, Vec<CachedMessage>>;

struct Inner {
    kv: Arc<dyn KeyValueStore>,
    window: Duration,
    limit: usize,
    pending: Mutex<Batches>,
    /// Serializes the read-merge-write of the stored list.
    writes: tokio::sync::Mutex<()>,
    timers: TaskTable<ConversationId>,
}

fn lock(pending: &Mutex<Batches>) -> MutexGuard<'_, Batches> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

impl Inner {
    fn schedule(self: &Arc<Self>, key: ConversationId) {
        let task = fire(Arc::downgrade(self), key.clone());
        self.timers.schedule_if_absent(key, self.window, task);
    }

    async fn write(self: &Arc<Self>, key: &ConversationId) -> Result<usize, CourierError> {
        let _serial = self.writes.lock().await;
        self.write_serialized(key).await
    }

    /// Same as [`Inner::write`] for a caller already holding `writes`.
    async fn write_serialized(self: &Arc<Self>, key: &ConversationId) -> Result<usize, CourierError> {
        let batch = lock(&self.pending).remove(key).unwrap_or_default();
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();

        match self.merge(key, &batch).await {
            Ok(stored) => {
                metrics::record_write(CHANNEL);
                debug!(conversation_id = %key, batch = count, stored, "local message cache written");
                Ok(count)
            }
            Err(e) => {
                // Put the batch back ahead of anything that arrived meanwhile.
                let mut pending = lock(&self.pending);
                let slot = pending.entry(key.clone()).or_default();
                let newer = std::mem::replace(slot, batch);
                slot.extend(newer);
                drop(pending);
                self.schedule(key.clone());
                Err(e)
            }
        }
    }

    async fn merge(&self, key: &ConversationId, batch: &[CachedMessage]) -> Result<usize, CourierError> {
        let mut stored = read_cached(self.kv.as_ref(), key).await?;
        for msg in batch {
            match stored.iter_mut().find(|m| m.id == msg.id) {
                Some(existing) => *existing = msg.clone(),
                None => stored.push(msg.clone()),
            }
        }
        stored.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if stored.len() > self.limit {
            let excess = stored.len() - self.limit;
            stored.drain(..excess);
        }
        self.kv
            .set(&message_cache_key(key), &serde_json::to_string(&stored)?)
            .await?;
        Ok(stored.len())
    }
}

async fn fire(inner: Weak<Inner>, key: ConversationId) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    if let Err(e) = inner.write(&key).await {
        warn!(conversation_id = %key, error = %e, "local message cache write failed, kept pending");
    }
}

/// Read a conversation's cached messages, oldest first.
///
/// An unparsable list is treated as empty so the next write replaces it.
pub async fn read_cached(
    kv: &dyn KeyValueStore,
    conversation: &ConversationId,
) -> Result<Vec<CachedMessage>, CourierError> {
    let Some(raw) = kv.get(&message_cache_key(conversation)).await? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str(&raw) {
        Ok(messages) => Ok(messages),
        Err(e) => {
            error!(
                conversation_id = %conversation,
                error = %e,
                "local message cache corrupted, resetting"
            );
            Ok(Vec::new())
        }
    }
}

/// Batched writes of received messages into the device-local message cache.
#[derive(Clone)]
pub struct LocalCacheChannel {
    inner: Arc<Inner>,
}

impl LocalCacheChannel {
    /// `limit` is the number of newest messages kept per conversation.
    pub fn new(kv: Arc<dyn KeyValueStore>, window: Duration, limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                kv,
                window,
                limit,
                pending: Mutex::new(HashMap::new()),
                writes: tokio::sync::Mutex::new(()),
                timers: TaskTable::new(),
            }),
        }
    }

    pub fn submit(&self, message: CachedMessage) {
        let key = message.conversation_id.clone();
        lock(&self.inner.pending)
            .entry(key.clone())
            .or_default()
            .push(message);
        self.inner.schedule(key);
    }

    /// Write `key`'s batch now. Returns the number of messages written.
    ///
    /// A timer write already in progress lands before this returns.
    pub async fn flush_key(&self, key: &ConversationId) -> Result<usize, CourierError> {
        let _serial = self.inner.writes.lock().await;
        self.inner.timers.cancel(key);
        self.inner.write_serialized(key).await
    }

    /// Write every batch now. Returns the number of messages written.
    ///
    /// Every conversation is attempted; the first error is returned and the
    /// failed batches stay pending. A timer write already in progress lands
    /// before the pending batches are read.
    pub async fn flush(&self) -> Result<usize, CourierError> {
        let _serial = self.inner.writes.lock().await;
        self.inner.timers.cancel_all();
        let keys: Vec<ConversationId> = lock(&self.inner.pending).keys().cloned().collect();

        let mut written = 0;
        let mut first_error = None;
        for key in keys {
            match self.inner.write_serialized(&key).await {
                Ok(n) => written += n,
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

    /// Messages waiting for the next write, across all conversations.
    pub fn pending_len(&self) -> usize {
        lock(&self.inner.pending).values().map(Vec::len).sum()
    }

    /// Persisted messages of `conversation`, oldest first.
    pub async fn cached(&self, conversation: &ConversationId) -> Result<Vec<CachedMessage>, CourierError> {
        read_cached(self.inner.kv.as_ref(), conversation).await
    }
}
