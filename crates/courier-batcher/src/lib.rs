// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debounced write coalescing for Courier.
//!
//! Two independent channels sit on top of a per-key [`TaskTable`]:
//!
//! - [`PreviewChannel`] collapses conversation-preview updates into one remote
//!   write per window, applying only the candidate with the greatest message id.
//! - [`LocalCacheChannel`] accumulates every received message during a window
//!   and writes them to the device-local message cache as one batch.
//!
//! [`WriteBatcher::flush`] bypasses both timers. Call it before the process is
//! suspended or a conversation view is torn down; a failed flush leaves the
//! data pending for a later attempt.

pub mod local_cache;
pub mod metrics;
pub mod preview;
pub mod task_table;

use std::sync::Arc;

use courier_config::BatcherConfig;
use courier_core::{ConversationId, CourierError, KeyValueStore, RemoteStore};
use tracing::{info, warn};

pub use local_cache::{LocalCacheChannel, MESSAGE_CACHE_PREFIX, message_cache_key, read_cached};
pub use metrics::register_metrics;
pub use preview::{BatchedUpdate, PreviewChannel};
pub use task_table::TaskTable;

/// Writes issued by one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub previews: usize,
    pub cached_messages: usize,
}

impl FlushSummary {
    pub fn is_empty(&self) -> bool {
        self.previews == 0 && self.cached_messages == 0
    }
}

/// Both debounce channels behind one lifecycle surface.
#[derive(Clone)]
pub struct WriteBatcher {
    previews: PreviewChannel,
    local_cache: LocalCacheChannel,
}

impl WriteBatcher {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        kv: Arc<dyn KeyValueStore>,
        config: &BatcherConfig,
    ) -> Self {
        Self {
            previews: PreviewChannel::new(remote, config.preview_window()),
            local_cache: LocalCacheChannel::new(
                kv,
                config.local_cache_window(),
                config.local_cache_limit,
            ),
        }
    }

    pub fn previews(&self) -> &PreviewChannel {
        &self.previews
    }

    pub fn local_cache(&self) -> &LocalCacheChannel {
        &self.local_cache
    }

    /// Flush both channels for every key.
    ///
    /// Both channels are attempted even if the first fails.
    pub async fn flush(&self) -> Result<FlushSummary, CourierError> {
        let previews = self.previews.flush().await;
        let cached = self.local_cache.flush().await;
        let summary = finish(previews, cached)?;
        if !summary.is_empty() {
            info!(
                previews = summary.previews,
                cached_messages = summary.cached_messages,
                "batcher flushed"
            );
        }
        Ok(summary)
    }

    /// Flush both channels for one conversation.
    pub async fn flush_conversation(
        &self,
        conversation: &ConversationId,
    ) -> Result<FlushSummary, CourierError> {
        let previews = self
            .previews
            .flush_key(conversation)
            .await
            .map(usize::from);
        let cached = self.local_cache.flush_key(conversation).await;
        finish(previews, cached)
    }
}

fn finish(
    previews: Result<usize, CourierError>,
    cached: Result<usize, CourierError>,
) -> Result<FlushSummary, CourierError> {
    match (previews, cached) {
        (Ok(previews), Ok(cached_messages)) => Ok(FlushSummary {
            previews,
            cached_messages,
        }),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "batcher flush incomplete, data kept pending");
            Err(e)
        }
    }
}
