// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response cache for expensive generated artifacts.
//!
//! [`ResponseCache`] stores typed values as JSON with a time-to-live chosen
//! by [`CacheType`](courier_core::CacheType), counts accesses, deletes by key
//! prefix, and sweeps expired entries in bounded batches.
//! [`CachedFeatures`] layers the conversation features (summaries,
//! decisions, action items, semantic search, reply suggestions) on top.
//!
//! The cache does not sweep on its own. A long-lived host runs
//! [`spawn_janitor`] (the `courier cache janitor` command does this for a
//! shared database), and short-lived callers use [`ResponseCache::sweep_all`].
//! Call [`register_metrics`] once after installing a metrics recorder.

pub mod cache;
pub mod features;
pub mod janitor;
pub mod key;
pub mod metrics;

pub use cache::{BatchRequest, CacheStats, ResponseCache, SweepReport};
pub use features::CachedFeatures;
pub use janitor::spawn_janitor;
pub use key::{CacheKey, conversation_prefix, normalize};
pub use metrics::register_metrics;
