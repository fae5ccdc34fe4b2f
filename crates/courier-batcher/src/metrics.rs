// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use metrics::describe_counter;

/// Register batcher metric descriptions. Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(
        "courier_batcher_writes_total",
        "Coalesced downstream writes issued, by channel"
    );
    describe_counter!(
        "courier_batcher_stale_dropped_total",
        "Preview candidates dropped by the message-id guard"
    );
}

pub(crate) fn record_write(channel: &'static str) {
    metrics::counter!("courier_batcher_writes_total", "channel" => channel).increment(1);
}

pub(crate) fn record_stale_drop() {
    metrics::counter!("courier_batcher_stale_dropped_total").increment(1);
}
