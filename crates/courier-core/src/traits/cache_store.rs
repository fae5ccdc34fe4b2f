// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backing store for the response cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CourierError;
use crate::types::CacheEntry;

/// Keyed storage of [`CacheEntry`] values.
///
/// Per-key operations are independent; no cross-key transaction is required.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetches the entry for `key`, expired or not.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CourierError>;

    /// Inserts or replaces the entry under `entry.key`.
    async fn put(&self, entry: CacheEntry) -> Result<(), CourierError>;

    /// Increments the access count and sets `last_accessed` for `key`.
    async fn record_access(&self, key: &str, at: DateTime<Utc>) -> Result<(), CourierError>;

    /// Deletes `key`. Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, CourierError>;

    /// Deletes `key` only if its stored entry has expired at `now`.
    ///
    /// An entry replaced since it was read is left alone. Returns whether
    /// an entry was removed.
    async fn delete_if_expired(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CourierError>;

    /// Deletes every entry whose key starts with `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CourierError>;

    /// Returns up to `limit` entries with keys strictly greater than `after`, in key order.
    async fn scan(&self, after: Option<&str>, limit: usize)
    -> Result<Vec<CacheEntry>, CourierError>;
}
