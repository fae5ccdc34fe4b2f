// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status` command implementation.
//!
//! Loads the persisted outbox and reports what is still waiting for delivery
//! and what needs a manual resend.

use std::io::IsTerminal;
use std::sync::Arc;

use courier_config::model::CourierConfig;
use courier_core::{CourierError, QueuedMessage};
use courier_outbox::{DurableQueue, LoadReport};
use courier_storage::{Database, SqliteKvStore};
use serde::Serialize;

/// One failed message as shown to the operator.
#[derive(Debug, Serialize)]
pub struct FailedEntry {
    pub local_id: String,
    pub conversation_id: String,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub database_path: String,
    pub pending: usize,
    pub failed: Vec<FailedEntry>,
    pub recovered_in_flight: usize,
    /// Stores found corrupted and reset while loading.
    pub corrupted: Vec<&'static str>,
}

impl StatusResponse {
    fn build(
        database_path: &str,
        pending: &[QueuedMessage],
        failed: &[QueuedMessage],
        report: LoadReport,
    ) -> Self {
        Self {
            database_path: database_path.to_string(),
            pending: pending.len(),
            failed: failed
                .iter()
                .map(|m| FailedEntry {
                    local_id: m.local_id.to_string(),
                    conversation_id: m.conversation_id.to_string(),
                    retry_count: m.retry_count,
                    last_error: m.last_error.clone(),
                })
                .collect(),
            recovered_in_flight: report.recovered_in_flight,
            corrupted: report.corrupted,
        }
    }
}

/// Gather the outbox state from the database.
pub async fn collect_status(
    db: Arc<Database>,
    config: &CourierConfig,
) -> Result<StatusResponse, CourierError> {
    let kv = Arc::new(SqliteKvStore::new(db));
    let (queue, report) = DurableQueue::open(kv, config.delivery.max_retries).await?;
    let pending = queue.list_pending().await;
    let failed = queue.list_failed().await;
    Ok(StatusResponse::build(
        &config.storage.database_path,
        &pending,
        &failed,
        report,
    ))
}

/// Run the `courier status` command.
///
/// With `--json`, prints structured output for scripting. With `--plain`, or
/// when stdout is not a TTY, disables colors.
pub async fn run_status(
    db: Arc<Database>,
    config: &CourierConfig,
    json: bool,
    plain: bool,
) -> Result<(), CourierError> {
    let status = collect_status(db, config).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&status, use_color);
    }
    Ok(())
}

fn print_status(status: &StatusResponse, use_color: bool) {
    println!();
    println!("  courier status");
    println!("  {}", "-".repeat(35));
    println!("    Database: {}", status.database_path);
    println!("    Pending:  {}", status.pending);

    if status.failed.is_empty() {
        println!("    Failed:   0");
    } else if use_color {
        use colored::Colorize;
        println!("    Failed:   {}", status.failed.len().to_string().red());
    } else {
        println!("    Failed:   {} [FAIL]", status.failed.len());
    }

    if status.recovered_in_flight > 0 {
        println!("    Recovered in-flight: {}", status.recovered_in_flight);
    }
    for store in &status.corrupted {
        if use_color {
            use colored::Colorize;
            println!("    {} {store} was corrupted and reset", "✗".red());
        } else {
            println!("    [FAIL] {store} was corrupted and reset");
        }
    }

    if !status.failed.is_empty() {
        println!();
        for entry in &status.failed {
            println!(
                "    {}  {}  retries={}  {}",
                entry.local_id,
                entry.conversation_id,
                entry.retry_count,
                entry.last_error.as_deref().unwrap_or("-")
            );
        }
        println!();
        println!("  Resend with: courier resend <local_id>");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{KeyValueStore, MessageStatus};
    use courier_outbox::FAILED_KEY;

    fn message(id: &str, status: MessageStatus) -> QueuedMessage {
        let mut msg = QueuedMessage::new(
            id.into(),
            "c1".into(),
            "alice".into(),
            "hello",
            chrono::Utc::now(),
        );
        msg.status = status;
        msg
    }

    #[tokio::test]
    async fn status_reports_pending_and_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.db");
        let db = Arc::new(Database::open(path.to_str().unwrap()).await.unwrap());

        let kv = SqliteKvStore::new(db.clone());
        let mut failed = message("m2", MessageStatus::Failed);
        failed.retry_count = 3;
        failed.last_error = Some("service unavailable".into());
        kv.set(FAILED_KEY, &serde_json::to_string(&vec![failed]).unwrap())
            .await
            .unwrap();

        let config = CourierConfig::default();
        let (queue, _) = DurableQueue::open(Arc::new(kv), 3).await.unwrap();
        queue.enqueue(message("m1", MessageStatus::Pending)).await.unwrap();

        let status = collect_status(db, &config).await.unwrap();
        assert_eq!(status.pending, 1);
        assert_eq!(status.failed.len(), 1);
        assert_eq!(status.failed[0].local_id, "m2");
        assert_eq!(status.failed[0].last_error.as_deref(), Some("service unavailable"));
        assert!(status.corrupted.is_empty());
    }

    #[test]
    fn status_response_serializes() {
        let report = LoadReport {
            recovered_in_flight: 1,
            ..LoadReport::default()
        };
        let status = StatusResponse::build(
            "/tmp/courier.db",
            &[message("m1", MessageStatus::Pending)],
            &[],
            report,
        );
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"pending\":1"));
        assert!(json.contains("\"recovered_in_flight\":1"));
        assert!(json.contains("\"failed\":[]"));
    }
}
