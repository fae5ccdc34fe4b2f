// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response cache metrics.

use courier_core::CacheType;
use metrics::describe_counter;

/// Register cache metric descriptions. Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(
        "courier_cache_hits_total",
        "Cache lookups served from an unexpired entry"
    );
    describe_counter!(
        "courier_cache_misses_total",
        "Cache lookups that invoked the generator"
    );
    describe_counter!(
        "courier_cache_swept_total",
        "Expired entries deleted by the janitor"
    );
    describe_counter!(
        "courier_cache_write_failures_total",
        "Generated values that could not be stored"
    );
}

pub(crate) fn record_hit(kind: CacheType) {
    metrics::counter!("courier_cache_hits_total", "cache_type" => kind.to_string()).increment(1);
}

pub(crate) fn record_miss(kind: CacheType) {
    metrics::counter!("courier_cache_misses_total", "cache_type" => kind.to_string()).increment(1);
}

pub(crate) fn record_swept(count: usize) {
    metrics::counter!("courier_cache_swept_total").increment(count as u64);
}

pub(crate) fn record_write_failure(kind: CacheType) {
    metrics::counter!("courier_cache_write_failures_total", "cache_type" => kind.to_string())
        .increment(1);
}
