// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable local queue of outgoing messages.
//!
//! The queue keeps two stores in the device key-value store: the active
//! (pending) list and the failed list. Every mutation rewrites the full JSON
//! image of the affected store before returning, and the in-memory copy is
//! only updated once that write succeeded. Mutations are serialized by an
//! async mutex held across the write.

use std::sync::Arc;

use courier_core::{CourierError, KeyValueStore, LocalId, MessageStatus, QueuedMessage};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Key of the active queue image.
pub const PENDING_KEY: &str = "courier.outbox.pending";
/// Key of the failed-message image.
pub const FAILED_KEY: &str = "courier.outbox.failed";

/// What happened while loading the persisted queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub pending: usize,
    pub failed: usize,
    /// Entries persisted as `sending` by a previous process, reset to `pending`.
    pub recovered_in_flight: usize,
    /// Keys whose image could not be parsed and were reset to empty.
    pub corrupted: Vec<&'static str>,
}

impl LoadReport {
    /// Whether queued messages may have been lost. Callers must surface this to the user.
    pub fn data_lost(&self) -> bool {
        !self.corrupted.is_empty()
    }
}

/// Result of recording a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The message stays queued; `retry_count` is the number of retries now owed.
    Retry { retry_count: u32 },
    /// The retry budget is spent; the message moved to the failed store.
    Exhausted,
}

#[derive(Debug, Default)]
struct Stores {
    pending: Vec<QueuedMessage>,
    failed: Vec<QueuedMessage>,
}

/// Persistent FIFO of outgoing messages plus a store of exhausted ones.
pub struct DurableQueue {
    store: Arc<dyn KeyValueStore>,
    max_retries: u32,
    state: Mutex<Stores>,
}

impl std::fmt::Debug for DurableQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueue")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

async fn load_image(
    store: &dyn KeyValueStore,
    key: &'static str,
    report: &mut LoadReport,
) -> Result<Vec<QueuedMessage>, CourierError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<QueuedMessage>>(&raw) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            error!(
                key,
                error = %e,
                bytes = raw.len(),
                "persisted outbox image is corrupted; resetting to empty, queued messages may be lost"
            );
            store.set(key, "[]").await?;
            report.corrupted.push(key);
            Ok(Vec::new())
        }
    }
}

impl DurableQueue {
    /// Load the persisted queue.
    ///
    /// Corrupted images are reset to empty and reported rather than failing.
    /// Storage I/O errors are returned.
    pub async fn open(
        store: Arc<dyn KeyValueStore>,
        max_retries: u32,
    ) -> Result<(Self, LoadReport), CourierError> {
        let mut report = LoadReport::default();
        let mut pending = load_image(store.as_ref(), PENDING_KEY, &mut report).await?;
        let failed = load_image(store.as_ref(), FAILED_KEY, &mut report).await?;

        let mut dirty = false;

        // A crash between the two writes of a move leaves the entry in both stores.
        let before = pending.len();
        pending.retain(|m| !failed.iter().any(|f| f.local_id == m.local_id));
        if pending.len() != before {
            warn!(
                duplicates = before - pending.len(),
                "dropping pending entries already in the failed store"
            );
            dirty = true;
        }

        for msg in pending.iter_mut().filter(|m| m.status == MessageStatus::Sending) {
            msg.status = MessageStatus::Pending;
            report.recovered_in_flight += 1;
            dirty = true;
        }

        if dirty {
            store
                .set(PENDING_KEY, &serde_json::to_string(&pending)?)
                .await?;
        }

        report.pending = pending.len();
        report.failed = failed.len();
        info!(
            pending = report.pending,
            failed = report.failed,
            recovered = report.recovered_in_flight,
            "outbox loaded"
        );

        let queue = Self {
            store,
            max_retries,
            state: Mutex::new(Stores { pending, failed }),
        };
        Ok((queue, report))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn persist(&self, key: &str, entries: &[QueuedMessage]) -> Result<(), CourierError> {
        let image = serde_json::to_string(entries)?;
        self.store.set(key, &image).await
    }

    /// Append a message as `pending` with no retries.
    ///
    /// Returns `false` without touching storage if the local id is already queued or failed.
    pub async fn enqueue(&self, message: QueuedMessage) -> Result<bool, CourierError> {
        let mut state = self.state.lock().await;
        let known = state
            .pending
            .iter()
            .chain(state.failed.iter())
            .any(|m| m.local_id == message.local_id);
        if known {
            debug!(local_id = %message.local_id, "duplicate enqueue ignored");
            return Ok(false);
        }

        let mut next = state.pending.clone();
        next.push(QueuedMessage {
            retry_count: 0,
            status: MessageStatus::Pending,
            server_id: None,
            last_error: None,
            ..message
        });
        self.persist(PENDING_KEY, &next).await?;
        state.pending = next;
        Ok(true)
    }

    /// Active entries in enqueue order.
    pub async fn list_pending(&self) -> Vec<QueuedMessage> {
        self.state.lock().await.pending.clone()
    }

    /// Exhausted entries, oldest failure first.
    pub async fn list_failed(&self) -> Vec<QueuedMessage> {
        self.state.lock().await.failed.clone()
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn get(&self, local_id: &LocalId) -> Option<QueuedMessage> {
        let state = self.state.lock().await;
        state
            .pending
            .iter()
            .chain(state.failed.iter())
            .find(|m| &m.local_id == local_id)
            .cloned()
    }

    /// Mark an active entry as `sending` and return a snapshot of it.
    pub async fn mark_sending(&self, local_id: &LocalId) -> Result<QueuedMessage, CourierError> {
        let mut state = self.state.lock().await;
        let mut next = state.pending.clone();
        let msg = next
            .iter_mut()
            .find(|m| &m.local_id == local_id)
            .ok_or_else(|| not_found(local_id))?;
        msg.status = MessageStatus::Sending;
        let snapshot = msg.clone();
        self.persist(PENDING_KEY, &next).await?;
        state.pending = next;
        Ok(snapshot)
    }

    /// Remove an entry the remote store accepted.
    ///
    /// Returns the entry marked `sent` with its server id, or `None` if it was
    /// no longer queued.
    pub async fn dequeue_succeeded(
        &self,
        local_id: &LocalId,
        server_id: Option<String>,
    ) -> Result<Option<QueuedMessage>, CourierError> {
        let mut state = self.state.lock().await;
        let Some(pos) = state.pending.iter().position(|m| &m.local_id == local_id) else {
            return Ok(None);
        };
        let mut next = state.pending.clone();
        let mut sent = next.remove(pos);
        self.persist(PENDING_KEY, &next).await?;
        state.pending = next;

        sent.status = MessageStatus::Sent;
        sent.server_id = server_id;
        Ok(Some(sent))
    }

    /// Record a transient failure of the latest attempt.
    ///
    /// With retries left the entry returns to `pending` with `retry_count + 1`.
    /// Once `retry_count == max_retries` the entry moves to the failed store.
    pub async fn record_failure(
        &self,
        local_id: &LocalId,
        error: &str,
    ) -> Result<FailureOutcome, CourierError> {
        let mut state = self.state.lock().await;
        let mut next = state.pending.clone();
        let pos = next
            .iter()
            .position(|m| &m.local_id == local_id)
            .ok_or_else(|| not_found(local_id))?;

        if next[pos].retry_count >= self.max_retries {
            drop(next);
            self.move_to_failed(&mut state, pos, error).await?;
            return Ok(FailureOutcome::Exhausted);
        }

        let msg = &mut next[pos];
        msg.retry_count += 1;
        msg.status = MessageStatus::Pending;
        msg.last_error = Some(error.to_string());
        let retry_count = msg.retry_count;
        self.persist(PENDING_KEY, &next).await?;
        state.pending = next;
        Ok(FailureOutcome::Retry { retry_count })
    }

    /// Move an entry straight to the failed store, e.g. after a permanent rejection.
    pub async fn fail_permanently(
        &self,
        local_id: &LocalId,
        error: &str,
    ) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        let pos = state
            .pending
            .iter()
            .position(|m| &m.local_id == local_id)
            .ok_or_else(|| not_found(local_id))?;
        self.move_to_failed(&mut state, pos, error).await
    }

    async fn move_to_failed(
        &self,
        state: &mut Stores,
        pos: usize,
        error: &str,
    ) -> Result<(), CourierError> {
        let mut pending = state.pending.clone();
        let mut msg = pending.remove(pos);
        msg.status = MessageStatus::Failed;
        msg.last_error = Some(error.to_string());

        let mut failed = state.failed.clone();
        failed.push(msg);

        // Failed image first: a crash in between duplicates, which `open` repairs.
        self.persist(FAILED_KEY, &failed).await?;
        state.failed = failed;
        self.persist(PENDING_KEY, &pending).await?;
        state.pending = pending;
        Ok(())
    }

    /// Return a failed entry to the tail of the active queue with a fresh retry budget.
    pub async fn resend(&self, local_id: &LocalId) -> Result<QueuedMessage, CourierError> {
        let mut state = self.state.lock().await;
        let pos = state
            .failed
            .iter()
            .position(|m| &m.local_id == local_id)
            .ok_or_else(|| not_found(local_id))?;

        let mut failed = state.failed.clone();
        let mut msg = failed.remove(pos);
        msg.status = MessageStatus::Pending;
        msg.retry_count = 0;
        msg.last_error = None;

        let mut pending = state.pending.clone();
        pending.push(msg.clone());

        // Pending image first, for the same reason as `move_to_failed`.
        self.persist(PENDING_KEY, &pending).await?;
        state.pending = pending;
        self.persist(FAILED_KEY, &failed).await?;
        state.failed = failed;

        info!(local_id = %local_id, "failed message returned to outbox");
        Ok(msg)
    }
}

fn not_found(local_id: &LocalId) -> CourierError {
    CourierError::NotFound {
        kind: "queued message",
        id: local_id.to_string(),
    }
}
