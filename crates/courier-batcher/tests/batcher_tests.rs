// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle flush behavior of the combined batcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_batcher::{BatchedUpdate, FlushSummary, WriteBatcher};
use courier_config::BatcherConfig;
use courier_core::{CachedMessage, ConversationPreview};
use courier_test_utils::{FlakyKvStore, MockRemoteStore};

fn preview(conversation: &str, id: &str) -> BatchedUpdate {
    BatchedUpdate::from_preview(
        ConversationPreview {
            conversation_id: conversation.into(),
            last_message_id: id.into(),
            last_message_text: format!("text {id}"),
            sender_id: "alice".into(),
            sent_at: Utc::now(),
        },
        Utc::now(),
    )
}

fn cached(conversation: &str, id: &str) -> CachedMessage {
    CachedMessage {
        id: id.into(),
        conversation_id: conversation.into(),
        sender_id: "alice".into(),
        text: format!("text {id}"),
        created_at: Utc::now(),
    }
}

fn batcher() -> (Arc<MockRemoteStore>, FlakyKvStore, WriteBatcher) {
    let remote = Arc::new(MockRemoteStore::new());
    let kv = FlakyKvStore::new();
    let batcher = WriteBatcher::new(
        remote.clone(),
        Arc::new(kv.clone()),
        &BatcherConfig::default(),
    );
    (remote, kv, batcher)
}

#[tokio::test(start_paused = true)]
async fn background_flush_writes_everything_before_the_timers() {
    let (remote, kv, batcher) = batcher();
    batcher.previews().submit(preview("c1", "m1"));
    batcher.previews().submit(preview("c2", "m1"));
    batcher.local_cache().submit(cached("c1", "m1"));
    batcher.local_cache().submit(cached("c1", "m2"));

    let summary = batcher.flush().await.unwrap();
    assert_eq!(
        summary,
        FlushSummary {
            previews: 2,
            cached_messages: 2
        }
    );
    assert_eq!(remote.preview_writes().len(), 2);
    assert_eq!(kv.write_count(), 1);

    // Timers were cancelled; nothing is written twice.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(remote.preview_writes().len(), 2);
    assert_eq!(kv.write_count(), 1);

    assert!(batcher.flush().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn view_teardown_flushes_only_that_conversation() {
    let (remote, _kv, batcher) = batcher();
    batcher.previews().submit(preview("c1", "m1"));
    batcher.previews().submit(preview("c2", "m1"));
    batcher.local_cache().submit(cached("c1", "m1"));

    let summary = batcher.flush_conversation(&"c1".into()).await.unwrap();
    assert_eq!(summary.previews, 1);
    assert_eq!(summary.cached_messages, 1);
    assert!(remote.last_preview("c1").is_some());
    assert!(remote.last_preview("c2").is_none());
    assert!(batcher.previews().is_scheduled(&"c2".into()));
}

#[tokio::test(start_paused = true)]
async fn failed_cache_write_does_not_stop_preview_flush() {
    let (remote, kv, batcher) = batcher();
    kv.set_fail_writes(true);
    batcher.previews().submit(preview("c1", "m1"));
    batcher.local_cache().submit(cached("c1", "m1"));

    assert!(batcher.flush().await.is_err());
    assert_eq!(remote.preview_writes().len(), 1);
    assert_eq!(batcher.local_cache().pending_len(), 1);

    kv.set_fail_writes(false);
    let summary = batcher.flush().await.unwrap();
    assert_eq!(summary.cached_messages, 1);
}
