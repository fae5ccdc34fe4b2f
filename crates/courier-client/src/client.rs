// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The surface the UI layer talks to.

use std::sync::Arc;

use courier_batcher::{BatchedUpdate, FlushSummary, WriteBatcher};
use courier_config::CourierConfig;
use courier_core::{
    CachedMessage, Clock, ConversationId, ConversationPreview, CourierError, KeyValueStore,
    LocalId, LocalIdGenerator, MessageId, QueuedMessage, RemoteStore, UserId,
};
use courier_outbox::{DeliveryEvent, DurableQueue, LoadReport, RetryPolicy, RetryScheduler};
use courier_receipts::{DeliveryTracker, PresenceRegistry};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::network::NetworkMonitor;

/// External collaborators of a [`CourierClient`].
pub struct ClientDeps {
    pub remote: Arc<dyn RemoteStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    /// Connectivity at startup.
    pub online: bool,
}

/// One signed-in user on one device.
///
/// Outgoing messages go through the durable outbox; conversation previews and
/// the local message cache go through the write batcher; receipts and
/// presence are tracked in memory.
pub struct CourierClient {
    user_id: UserId,
    clock: Arc<dyn Clock>,
    ids: LocalIdGenerator,
    remote: Arc<dyn RemoteStore>,
    network: Arc<NetworkMonitor>,
    scheduler: RetryScheduler,
    batcher: WriteBatcher,
    receipts: DeliveryTracker,
    presence: PresenceRegistry,
}

impl CourierClient {
    /// Restore the outbox and wire the components together.
    ///
    /// Call [`start`](Self::start) to begin delivering.
    pub async fn open(
        user_id: UserId,
        deps: ClientDeps,
        config: &CourierConfig,
    ) -> Result<(Self, LoadReport), CourierError> {
        let (queue, report) = DurableQueue::open(deps.kv.clone(), config.delivery.max_retries).await?;
        if report.data_lost() {
            error!(user_id = %user_id, "outbox was corrupted and reset, unsent messages may be lost");
        }

        let network = Arc::new(NetworkMonitor::new(deps.online));
        let scheduler = RetryScheduler::new(
            Arc::new(queue),
            deps.remote.clone(),
            network.clone(),
            RetryPolicy::from_config(&config.delivery),
        );
        let batcher = WriteBatcher::new(deps.remote.clone(), deps.kv, &config.batcher);

        info!(
            user_id = %user_id,
            device_id = %config.client.device_id,
            pending = report.pending,
            failed = report.failed,
            "courier client ready"
        );

        let client = Self {
            user_id,
            ids: LocalIdGenerator::new(config.client.device_id.clone(), deps.clock.clone()),
            clock: deps.clock,
            remote: deps.remote,
            network,
            scheduler,
            batcher,
            receipts: DeliveryTracker::new(),
            presence: PresenceRegistry::new(),
        };
        Ok((client, report))
    }

    /// Spawn the retry scheduler. It stops when `cancel` fires.
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.scheduler.spawn(cancel)
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Queue a message for delivery and update the local views.
    ///
    /// Returns once the message is persisted in the outbox. The preview
    /// and local cache writes follow on their debounce windows.
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<QueuedMessage, CourierError> {
        let local_id = self.ids.next_id();
        let message = QueuedMessage::new(
            local_id.clone(),
            conversation_id.clone(),
            self.user_id.clone(),
            text,
            self.clock.now(),
        );
        self.scheduler.submit(message.clone()).await?;

        self.receipts.register_message(
            conversation_id.clone(),
            MessageId::from(local_id.as_str()),
            self.user_id.clone(),
        );
        let preview = ConversationPreview {
            conversation_id: conversation_id.clone(),
            last_message_id: local_id.to_string(),
            last_message_text: message.text.clone(),
            sender_id: self.user_id.clone(),
            sent_at: message.created_at,
        };
        self.batcher
            .previews()
            .submit(BatchedUpdate::from_preview(preview, message.created_at));
        self.batcher.local_cache().submit(CachedMessage {
            id: local_id.to_string(),
            conversation_id: conversation_id.clone(),
            sender_id: self.user_id.clone(),
            text: message.text.clone(),
            created_at: message.created_at,
        });

        debug!(local_id = %local_id, conversation_id = %conversation_id, "message queued");
        Ok(message)
    }

    /// Record a message delivered to this device by the listener.
    ///
    /// It counts as read at once when the user is viewing its conversation.
    pub fn receive_message(&self, message: CachedMessage) -> Result<(), CourierError> {
        let message_id = MessageId::from(message.id.as_str());
        self.receipts.register_message(
            message.conversation_id.clone(),
            message_id.clone(),
            message.sender_id.clone(),
        );
        if self.presence.is_viewing(&self.user_id, &message.conversation_id) {
            self.receipts.mark_read(&message_id, &self.user_id)?;
        } else {
            self.receipts.mark_delivered(&message_id, &self.user_id)?;
        }
        self.batcher.local_cache().submit(message);
        Ok(())
    }

    /// The user opened a conversation. Returns the messages newly marked read.
    pub fn open_conversation(&self, conversation_id: &ConversationId) -> Vec<MessageId> {
        self.presence.enter(&self.user_id, conversation_id);
        self.receipts
            .mark_conversation_read(conversation_id, &self.user_id)
    }

    /// The conversation view is going away: flush its pending writes.
    pub async fn on_view_teardown(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<FlushSummary, CourierError> {
        self.presence.leave(&self.user_id, conversation_id);
        self.batcher.flush_conversation(conversation_id).await
    }

    /// The process is about to be suspended: flush every pending write.
    pub async fn on_background(&self) -> Result<FlushSummary, CourierError> {
        self.batcher.flush().await
    }

    /// Forward a platform connectivity report.
    pub fn set_online(&self, online: bool) {
        self.network.set_online(online);
    }

    pub fn events(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.scheduler.subscribe()
    }

    pub async fn pending(&self) -> Vec<QueuedMessage> {
        self.scheduler.queue().list_pending().await
    }

    pub async fn failed(&self) -> Vec<QueuedMessage> {
        self.scheduler.queue().list_failed().await
    }

    /// Return a failed message to the outbox.
    pub async fn resend(&self, local_id: &LocalId) -> Result<QueuedMessage, CourierError> {
        self.scheduler.resend(local_id).await
    }

    pub fn unread_count(&self, conversation_id: &ConversationId) -> usize {
        self.receipts.unread_count_for(&self.user_id, conversation_id)
    }

    /// Messages in the device-local cache for a conversation, oldest first.
    pub async fn cached_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<CachedMessage>, CourierError> {
        self.batcher.local_cache().cached(conversation_id).await
    }

    /// Apply the conversation's receipt changes until `cancel` fires.
    pub async fn follow_receipts(
        &self,
        conversation_id: &ConversationId,
        cancel: CancellationToken,
    ) -> Result<usize, CourierError> {
        self.receipts
            .follow_conversation(self.remote.as_ref(), conversation_id, cancel)
            .await
    }

    pub fn receipts(&self) -> &DeliveryTracker {
        &self.receipts
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn batcher(&self) -> &WriteBatcher {
        &self.batcher
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }
}
