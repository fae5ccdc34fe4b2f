// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted remote document store.
//!
//! `MockRemoteStore` keeps message documents keyed by local id (so repeated
//! puts are idempotent, like the real store), logs every call for assertion,
//! and can be scripted to fail, reject, or hang.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{
    ConversationId, ConversationPreview, CourierError, LocalId, QueuedMessage, ReceiptChange,
    ReceiptStream, RemoteAck, RemoteStore,
};
use tokio::sync::{Notify, mpsc};

/// What the next `put_message` call should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Accept,
    /// Transient failure; the caller should retry.
    Fail,
    /// Permanent rejection; retrying cannot succeed.
    Reject,
}

#[derive(Default)]
struct State {
    documents: BTreeMap<LocalId, QueuedMessage>,
    put_log: Vec<QueuedMessage>,
    previews: Vec<ConversationPreview>,
    script: VecDeque<PutOutcome>,
    fail_all_puts: bool,
    failing_previews: usize,
    preview_latency: Option<Duration>,
    hanging: HashSet<LocalId>,
    subscribers: HashMap<ConversationId, Vec<mpsc::UnboundedSender<ReceiptChange>>>,
}

/// In-memory remote store with call logging and failure scripting.
#[derive(Clone, Default)]
pub struct MockRemoteStore {
    state: Arc<Mutex<State>>,
    released: Arc<Notify>,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue outcomes for the next `put_message` calls, in order.
    /// Once the script runs out every put is accepted.
    pub fn script_puts(&self, outcomes: impl IntoIterator<Item = PutOutcome>) {
        self.state().script.extend(outcomes);
    }

    /// Fail the next `n` puts transiently.
    pub fn fail_next_puts(&self, n: usize) {
        self.script_puts(std::iter::repeat_n(PutOutcome::Fail, n));
    }

    /// Fail every put transiently until turned off.
    pub fn set_fail_all_puts(&self, fail: bool) {
        self.state().fail_all_puts = fail;
    }

    /// Fail the next `n` preview updates.
    pub fn fail_next_previews(&self, n: usize) {
        self.state().failing_previews = n;
    }

    /// Delay every preview update by `latency` before it is recorded.
    pub fn set_preview_latency(&self, latency: Duration) {
        self.state().preview_latency = Some(latency);
    }

    /// Make puts of `local_id` hang until [`release_hanging`](Self::release_hanging).
    pub fn hang_on(&self, local_id: impl Into<LocalId>) {
        self.state().hanging.insert(local_id.into());
    }

    pub fn release_hanging(&self) {
        self.state().hanging.clear();
        self.released.notify_waiters();
    }

    /// Every `put_message` call, including failed ones.
    pub fn put_attempts(&self) -> Vec<QueuedMessage> {
        self.state().put_log.clone()
    }

    pub fn put_attempts_for(&self, local_id: &str) -> usize {
        self.state()
            .put_log
            .iter()
            .filter(|m| m.local_id.as_str() == local_id)
            .count()
    }

    /// Accepted message documents in local-id order.
    pub fn documents(&self) -> Vec<QueuedMessage> {
        self.state().documents.values().cloned().collect()
    }

    pub fn document_count(&self) -> usize {
        self.state().documents.len()
    }

    /// Every accepted preview write, in order.
    pub fn preview_writes(&self) -> Vec<ConversationPreview> {
        self.state().previews.clone()
    }

    pub fn last_preview(&self, conversation_id: &str) -> Option<ConversationPreview> {
        self.state()
            .previews
            .iter()
            .rev()
            .find(|p| p.conversation_id.as_str() == conversation_id)
            .cloned()
    }

    /// Deliver a receipt change to every live subscriber of its conversation.
    pub fn push_receipt(&self, change: ReceiptChange) {
        let conversation = match &change {
            ReceiptChange::Upsert(r) => r.conversation_id.clone(),
            ReceiptChange::Removed {
                conversation_id, ..
            } => conversation_id.clone(),
        };
        let mut state = self.state();
        if let Some(senders) = state.subscribers.get_mut(&conversation) {
            senders.retain(|tx| tx.send(change.clone()).is_ok());
        }
    }

    /// Drop every receipt subscription, ending the streams.
    pub fn close_subscriptions(&self) {
        self.state().subscribers.clear();
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn put_message(&self, message: &QueuedMessage) -> Result<RemoteAck, CourierError> {
        loop {
            let released = self.released.notified();
            if !self.state().hanging.contains(&message.local_id) {
                break;
            }
            released.await;
        }

        let mut state = self.state();
        state.put_log.push(message.clone());
        let outcome = if state.fail_all_puts {
            PutOutcome::Fail
        } else {
            state.script.pop_front().unwrap_or(PutOutcome::Accept)
        };

        match outcome {
            PutOutcome::Accept => {
                let server_id = format!("srv-{}", message.local_id);
                state
                    .documents
                    .entry(message.local_id.clone())
                    .or_insert_with(|| message.clone());
                Ok(RemoteAck { server_id })
            }
            PutOutcome::Fail => Err(CourierError::remote("service unavailable")),
            PutOutcome::Reject => Err(CourierError::Remote {
                message: "permission denied".into(),
                retryable: false,
            }),
        }
    }

    async fn update_conversation(
        &self,
        preview: &ConversationPreview,
    ) -> Result<(), CourierError> {
        let latency = self.state().preview_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state();
        if state.failing_previews > 0 {
            state.failing_previews -= 1;
            return Err(CourierError::remote("conversation update failed"));
        }
        state.previews.push(preview.clone());
        Ok(())
    }

    async fn subscribe_receipts(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ReceiptStream, CourierError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state()
            .subscribers
            .entry(conversation_id.clone())
            .or_default()
            .push(tx);
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|change| (change, rx))
        });
        Ok(Box::pin(stream))
    }
}
