// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Receipts fed from a live listener match receipts rebuilt from a batch read.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use courier_core::{MessageReceipts, ReceiptChange, UserId};
use courier_receipts::DeliveryTracker;
use courier_test_utils::MockRemoteStore;
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

const USERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

fn receipts(id: usize, sender: usize, readers: &[usize]) -> MessageReceipts {
    MessageReceipts {
        message_id: format!("m{id:03}").into(),
        conversation_id: "c1".into(),
        sender_id: USERS[sender].into(),
        delivered_to: BTreeSet::new(),
        read_by: readers.iter().map(|r| UserId::from(USERS[*r])).collect(),
    }
}

#[tokio::test]
async fn listener_stream_updates_unread_counts() {
    let remote = Arc::new(MockRemoteStore::new());
    let tracker = Arc::new(DeliveryTracker::new());
    let cancel = CancellationToken::new();

    let stream = {
        use courier_core::RemoteStore;
        remote.subscribe_receipts(&"c1".into()).await.unwrap()
    };
    let follower = {
        let tracker = tracker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { tracker.follow(stream, cancel).await })
    };

    remote.push_receipt(ReceiptChange::Upsert(receipts(1, 0, &[])));
    remote.push_receipt(ReceiptChange::Upsert(receipts(2, 0, &[])));
    remote.push_receipt(ReceiptChange::Upsert(receipts(1, 0, &[1])));
    // At-least-once: a replayed older change must not undo the read.
    remote.push_receipt(ReceiptChange::Upsert(receipts(1, 0, &[])));
    remote.close_subscriptions();

    let applied = tokio::time::timeout(Duration::from_secs(5), follower)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(applied, 4);
    assert_eq!(tracker.unread_count_for(&"bob".into(), &"c1".into()), 1);
    assert_eq!(tracker.unread_count_for(&"alice".into(), &"c1".into()), 0);
    assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn follow_stops_on_cancel() {
    let remote = MockRemoteStore::new();
    let tracker = DeliveryTracker::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let applied = tracker
        .follow_conversation(&remote, &"c1".into(), cancel)
        .await
        .unwrap();
    assert_eq!(applied, 0);
}

fn message_strategy() -> impl Strategy<Value = Vec<(usize, Vec<usize>)>> {
    prop::collection::vec(
        (0..USERS.len(), prop::collection::vec(0..USERS.len(), 0..4)),
        1..20,
    )
}

proptest! {
    #[test]
    fn live_stream_and_snapshot_agree(messages in message_strategy()) {
        let all: Vec<MessageReceipts> = messages
            .iter()
            .enumerate()
            .map(|(i, (sender, readers))| receipts(i, *sender, readers))
            .collect();

        let live = DeliveryTracker::new();
        for r in &all {
            // Deliver each change twice, as a listener may.
            live.apply_change(ReceiptChange::Upsert(r.clone()));
            live.apply_change(ReceiptChange::Upsert(r.clone()));
        }
        let batch = DeliveryTracker::new();
        batch.apply_snapshot(&"c1".into(), all.clone());

        for user in USERS {
            let user = UserId::from(user);
            prop_assert_eq!(
                live.unread_count_for(&user, &"c1".into()),
                batch.unread_count_for(&user, &"c1".into())
            );
        }
    }

    #[test]
    fn unread_counts_reach_zero_after_reading_everything(messages in message_strategy()) {
        let tracker = DeliveryTracker::new();
        for (i, (sender, _)) in messages.iter().enumerate() {
            tracker.register_message("c1".into(), format!("m{i:03}").into(), USERS[*sender].into());
        }

        for (u, user) in USERS.iter().enumerate() {
            let user = UserId::from(*user);
            let authored = messages.iter().filter(|(s, _)| *s == u).count();
            prop_assert_eq!(
                tracker.unread_count_for(&user, &"c1".into()),
                messages.len() - authored
            );
        }

        let bob = UserId::from("bob");
        for i in 0..messages.len() {
            tracker.mark_read(&format!("m{i:03}").into(), &bob).unwrap();
        }
        prop_assert_eq!(tracker.unread_count_for(&bob, &"c1".into()), 0);
    }
}
