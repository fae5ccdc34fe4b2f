// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outgoing message delivery for Courier.
//!
//! [`DurableQueue`] owns every outgoing message until the remote store accepts
//! it, persisting the full queue image on each mutation. [`RetryScheduler`]
//! drains it while online, retrying transient failures with exponential
//! backoff and parking exhausted messages in a failed store for manual resend.
//! Each message's local id is its idempotency key, so delivery is
//! at-least-once with duplicates collapsed by the remote store.

pub mod metrics;
pub mod queue;
pub mod scheduler;

pub use metrics::register_metrics;
pub use queue::{DurableQueue, FAILED_KEY, FailureOutcome, LoadReport, PENDING_KEY};
pub use scheduler::{DeliveryEvent, RetryPolicy, RetryScheduler};
