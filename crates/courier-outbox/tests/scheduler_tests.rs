// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduler behavior against the scripted remote store, on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_core::{LocalId, MessageStatus, QueuedMessage};
use courier_outbox::{DeliveryEvent, DurableQueue, RetryPolicy, RetryScheduler};
use courier_test_utils::{PutOutcome, TestHarness};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Running {
    scheduler: RetryScheduler,
    events: broadcast::Receiver<DeliveryEvent>,
    cancel: CancellationToken,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start(harness: &TestHarness) -> Running {
    let (queue, _) = DurableQueue::open(harness.kv_store(), 3).await.unwrap();
    let scheduler = RetryScheduler::new(
        Arc::new(queue),
        harness.remote_store(),
        harness.connectivity_signal(),
        RetryPolicy::default(),
    );
    let events = scheduler.subscribe();
    let cancel = CancellationToken::new();
    scheduler.spawn(cancel.clone());
    Running {
        scheduler,
        events,
        cancel,
    }
}

fn message(harness: &TestHarness, text: &str) -> QueuedMessage {
    QueuedMessage::new(
        harness.ids.next_id(),
        "conv-1".into(),
        "alice".into(),
        text,
        Utc::now(),
    )
}

async fn next_event(events: &mut broadcast::Receiver<DeliveryEvent>) -> DeliveryEvent {
    tokio::time::timeout(Duration::from_secs(120), events.recv())
        .await
        .expect("timed out waiting for delivery event")
        .expect("event channel closed")
}

#[tokio::test(start_paused = true)]
async fn offline_backlog_drains_in_fifo_order_on_reconnect() {
    let harness = TestHarness::builder().offline().build();
    let mut run = start(&harness).await;

    let mut ids = Vec::new();
    for i in 1..=10 {
        let msg = message(&harness, &format!("message {i}"));
        ids.push(msg.local_id.clone());
        assert!(run.scheduler.submit(msg).await.unwrap());
    }

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.remote.put_attempts().is_empty(), "no sends while offline");

    harness.go_online();
    for _ in 0..10 {
        assert!(matches!(
            next_event(&mut run.events).await,
            DeliveryEvent::Sent { .. }
        ));
    }

    let sent: Vec<LocalId> = harness
        .remote
        .put_attempts()
        .into_iter()
        .map(|m| m.local_id)
        .collect();
    assert_eq!(sent, ids);
    assert_eq!(harness.remote.document_count(), 10);
    assert!(run.scheduler.queue().list_pending().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_one_then_two_seconds() {
    let harness = TestHarness::builder().with_failing_puts(2).build();
    let mut run = start(&harness).await;
    let started = Instant::now();

    let msg = message(&harness, "hello");
    run.scheduler.submit(msg.clone()).await.unwrap();

    match next_event(&mut run.events).await {
        DeliveryEvent::Retrying {
            retry_count, delay, ..
        } => {
            assert_eq!(retry_count, 1);
            assert_eq!(delay, Duration::from_secs(1));
        }
        other => panic!("unexpected {other:?}"),
    }
    match next_event(&mut run.events).await {
        DeliveryEvent::Retrying {
            retry_count, delay, ..
        } => {
            assert_eq!(retry_count, 2);
            assert_eq!(delay, Duration::from_secs(2));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        next_event(&mut run.events).await,
        DeliveryEvent::Sent { .. }
    ));

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
    assert_eq!(harness.remote.put_attempts_for(msg.local_id.as_str()), 3);
    assert_eq!(harness.remote.document_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_message_moves_to_failed_and_is_not_retried() {
    let harness = TestHarness::builder().build();
    harness.remote.set_fail_all_puts(true);
    let mut run = start(&harness).await;
    let started = Instant::now();

    let msg = message(&harness, "doomed");
    run.scheduler.submit(msg.clone()).await.unwrap();

    let mut retries = Vec::new();
    loop {
        match next_event(&mut run.events).await {
            DeliveryEvent::Retrying { retry_count, .. } => retries.push(retry_count),
            DeliveryEvent::Failed { local_id, .. } => {
                assert_eq!(local_id, msg.local_id);
                break;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(retries, [1, 2, 3]);
    // Attempts at 0 s, 1 s, 3 s, 7 s.
    assert!(started.elapsed() >= Duration::from_secs(7));

    let failed = run.scheduler.queue().list_failed().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retry_count, 3);
    assert_eq!(failed[0].status, MessageStatus::Failed);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.remote.put_attempts_for(msg.local_id.as_str()), 4);
}

#[tokio::test(start_paused = true)]
async fn resend_delivers_a_failed_message() {
    let harness = TestHarness::builder().build();
    harness.remote.script_puts([PutOutcome::Reject]);
    let mut run = start(&harness).await;

    let msg = message(&harness, "retry me");
    run.scheduler.submit(msg.clone()).await.unwrap();
    assert!(matches!(
        next_event(&mut run.events).await,
        DeliveryEvent::Failed { .. }
    ));
    assert_eq!(harness.remote.put_attempts_for(msg.local_id.as_str()), 1);

    let resent = run.scheduler.resend(&msg.local_id).await.unwrap();
    assert_eq!(resent.retry_count, 0);
    assert!(matches!(
        next_event(&mut run.events).await,
        DeliveryEvent::Sent { .. }
    ));
    assert!(run.scheduler.queue().list_failed().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn hung_attempt_blocks_only_its_own_message() {
    let harness = TestHarness::builder().offline().build();
    let mut run = start(&harness).await;

    let stuck = message(&harness, "stuck");
    let free = message(&harness, "free");
    harness.remote.hang_on(stuck.local_id.clone());
    run.scheduler.submit(stuck.clone()).await.unwrap();
    run.scheduler.submit(free.clone()).await.unwrap();
    harness.go_online();

    match next_event(&mut run.events).await {
        DeliveryEvent::Sent { local_id, .. } => assert_eq!(local_id, free.local_id),
        other => panic!("unexpected {other:?}"),
    }

    // Later passes must not start a second attempt for the hung message.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(run.scheduler.in_flight(), 1);

    harness.remote.release_hanging();
    match next_event(&mut run.events).await {
        DeliveryEvent::Sent { local_id, .. } => assert_eq!(local_id, stuck.local_id),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(harness.remote.put_attempts_for(stuck.local_id.as_str()), 1);
    assert_eq!(harness.remote.document_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn reconnect_skips_remaining_backoff() {
    let harness = TestHarness::builder().with_failing_puts(3).build();
    let mut run = start(&harness).await;

    let msg = message(&harness, "patience");
    run.scheduler.submit(msg.clone()).await.unwrap();
    for _ in 0..3 {
        assert!(matches!(
            next_event(&mut run.events).await,
            DeliveryEvent::Retrying { .. }
        ));
    }
    // Third retry is due 4 s from now; reconnecting drains immediately.
    let before = Instant::now();
    harness.go_offline();
    tokio::time::sleep(Duration::from_millis(10)).await;
    harness.go_online();
    assert!(matches!(
        next_event(&mut run.events).await,
        DeliveryEvent::Sent { .. }
    ));
    assert!(before.elapsed() < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn duplicate_submit_sends_once() {
    let harness = TestHarness::builder().offline().build();
    let mut run = start(&harness).await;

    let msg = message(&harness, "once");
    assert!(run.scheduler.submit(msg.clone()).await.unwrap());
    assert!(!run.scheduler.submit(msg.clone()).await.unwrap());
    harness.go_online();

    assert!(matches!(
        next_event(&mut run.events).await,
        DeliveryEvent::Sent { .. }
    ));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.remote.put_attempts().len(), 1);
}
