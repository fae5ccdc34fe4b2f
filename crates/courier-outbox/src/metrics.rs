// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery metrics recorded through the `metrics` facade.

use metrics::{describe_counter, describe_gauge};

/// Register outbox metric descriptions. Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(
        "courier_messages_sent_total",
        "Messages accepted by the remote store"
    );
    describe_counter!(
        "courier_messages_failed_total",
        "Messages moved to the failed store"
    );
    describe_counter!(
        "courier_send_retries_total",
        "Delivery attempts scheduled for retry"
    );
    describe_gauge!("courier_outbox_pending", "Messages waiting in the outbox");
}

pub(crate) fn record_sent() {
    metrics::counter!("courier_messages_sent_total").increment(1);
}

pub(crate) fn record_failed(reason: &'static str) {
    metrics::counter!("courier_messages_failed_total", "reason" => reason).increment(1);
}

pub(crate) fn record_retry() {
    metrics::counter!("courier_send_retries_total").increment(1);
}

pub(crate) fn set_pending(count: usize) {
    metrics::gauge!("courier_outbox_pending").set(count as f64);
}
