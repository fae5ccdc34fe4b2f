// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier resend` command implementation.

use std::sync::Arc;

use courier_config::model::CourierConfig;
use courier_core::{CourierError, LocalId};
use courier_outbox::DurableQueue;
use courier_storage::{Database, SqliteKvStore};

/// Move a failed message back to the outbox with a fresh retry budget.
///
/// Delivery happens the next time the client runs while online.
pub async fn run_resend(
    db: Arc<Database>,
    config: &CourierConfig,
    local_id: &LocalId,
) -> Result<(), CourierError> {
    let kv = Arc::new(SqliteKvStore::new(db));
    let (queue, _) = DurableQueue::open(kv, config.delivery.max_retries).await?;
    let message = queue.resend(local_id).await?;
    println!(
        "{} returned to the outbox ({} pending)",
        message.local_id,
        queue.pending_len().await
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{KeyValueStore, MessageStatus, QueuedMessage};
    use courier_outbox::FAILED_KEY;

    async fn database(dir: &tempfile::TempDir) -> Arc<Database> {
        let path = dir.path().join("courier.db");
        Arc::new(Database::open(path.to_str().unwrap()).await.unwrap())
    }

    #[tokio::test]
    async fn resend_moves_the_message_back_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(&dir).await;
        let mut failed = QueuedMessage::new(
            "m1".into(),
            "c1".into(),
            "alice".into(),
            "hello",
            chrono::Utc::now(),
        );
        failed.status = MessageStatus::Failed;
        failed.retry_count = 3;
        SqliteKvStore::new(db.clone())
            .set(FAILED_KEY, &serde_json::to_string(&vec![failed]).unwrap())
            .await
            .unwrap();

        let config = CourierConfig::default();
        run_resend(db.clone(), &config, &"m1".into()).await.unwrap();

        let (queue, _) = DurableQueue::open(Arc::new(SqliteKvStore::new(db)), 3)
            .await
            .unwrap();
        let pending = queue.list_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 0);
        assert!(queue.list_failed().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(&dir).await;
        let err = run_resend(db, &CourierConfig::default(), &"missing".into())
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NotFound { .. }));
    }
}
