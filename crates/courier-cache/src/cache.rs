// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed, typed, TTL-by-kind cache over an injected store and clock.
//!
//! Reads are advisory: a store read failure or an undecodable entry is a
//! miss. A store write failure is logged and the generated value is still
//! returned. A generator failure propagates and nothing is stored, so the
//! next call generates again.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use courier_config::CacheConfig;
use courier_core::{CacheEntry, CacheStore, CacheType, Clock, CourierError, Priority};
use futures::future::{BoxFuture, join_all};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::metrics;

/// One sub-request of [`ResponseCache::get_batch`].
///
/// The generator is a future that is only polled on a miss.
pub struct BatchRequest<'a, T> {
    pub key: String,
    pub cache_type: CacheType,
    pub priority: Priority,
    pub ttl_override: Option<Duration>,
    generator: BoxFuture<'a, Result<T, CourierError>>,
}

impl<'a, T> BatchRequest<'a, T> {
    pub fn new(
        key: impl Into<String>,
        cache_type: CacheType,
        priority: Priority,
        generator: impl Future<Output = Result<T, CourierError>> + Send + 'a,
    ) -> Self {
        Self {
            key: key.into(),
            cache_type,
            priority,
            ttl_override: None,
            generator: Box::pin(generator),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }
}

/// Result of one janitor batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub removed: usize,
    /// The batch reached the end of the key space; the next run starts over.
    pub wrapped: bool,
}

/// Snapshot of cache contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_accesses: u64,
    /// Mean access count per entry, a proxy for hit rate.
    pub average_accesses: f64,
    /// Most-accessed keys, highest first.
    pub top_keys: Vec<(String, u64)>,
    /// Expired entries the janitor has not deleted yet.
    pub expired_entries: usize,
    pub entries_by_type: BTreeMap<CacheType, usize>,
}

pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    /// Last key examined by the janitor.
    sweep_cursor: Mutex<Option<String>>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
            sweep_cursor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn cursor(&self) -> MutexGuard<'_, Option<String>> {
        self.sweep_cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expiry(&self, now: DateTime<Utc>, kind: CacheType, ttl_override: Option<Duration>) -> DateTime<Utc> {
        let ttl = ttl_override.unwrap_or_else(|| self.config.ttl_secs.ttl_for(kind));
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Return the cached value for `key`, or generate, store and return it.
    pub async fn get<T, F, Fut>(
        &self,
        key: &str,
        cache_type: CacheType,
        generator: F,
        ttl_override: Option<Duration>,
    ) -> Result<T, CourierError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CourierError>>,
    {
        if let Some(value) = self.lookup(key, cache_type).await {
            return Ok(value);
        }

        metrics::record_miss(cache_type);
        debug!(key, cache_type = %cache_type, "cache miss");
        let value = generator().await?;
        self.store_value(key, cache_type, &value, ttl_override).await;
        Ok(value)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str, cache_type: CacheType) -> Option<T> {
        let entry = match self.store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let now = self.clock.now();
        if entry.is_expired(now) {
            // Lazy expiry; the janitor catches it if this delete fails. A fresh
            // entry written by a concurrent miss since the read survives.
            if let Err(e) = self.store.delete_if_expired(key, now).await {
                debug!(key, error = %e, "could not delete expired entry");
            }
            return None;
        }

        let value = match serde_json::from_value(entry.value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "cached value has unexpected shape, regenerating");
                return None;
            }
        };

        if let Err(e) = self.store.record_access(key, now).await {
            warn!(key, error = %e, "could not record cache access");
        }
        metrics::record_hit(cache_type);
        debug!(key, cache_type = %cache_type, "cache hit");
        Some(value)
    }

    async fn store_value<T: Serialize>(
        &self,
        key: &str,
        cache_type: CacheType,
        value: &T,
        ttl_override: Option<Duration>,
    ) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "generated value is not serializable, not cached");
                metrics::record_write_failure(cache_type);
                return;
            }
        };
        let now = self.clock.now();
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            cache_type,
            created_at: now,
            expires_at: self.expiry(now, cache_type, ttl_override),
            access_count: 0,
            last_accessed: now,
        };
        if let Err(e) = self.store.put(entry).await {
            warn!(key, error = %e, "cache write failed, value not cached");
            metrics::record_write_failure(cache_type);
        }
    }

    /// Resolve many requests, highest priority first.
    ///
    /// Requests run in chunks of `batch_chunk_size`: the requests of one chunk
    /// run concurrently, chunks run one after another. Results come back in
    /// input order, each with its own success or error.
    pub async fn get_batch<'a, T>(
        &self,
        requests: Vec<BatchRequest<'a, T>>,
    ) -> Vec<Result<T, CourierError>>
    where
        T: Serialize + DeserializeOwned,
    {
        let total = requests.len();
        let mut ordered: Vec<(usize, BatchRequest<'a, T>)> = requests.into_iter().enumerate().collect();
        // Stable: equal priorities keep input order.
        ordered.sort_by(|a, b| b.1.priority.cmp(&a.1.priority));

        let chunk_size = self.config.batch_chunk_size.max(1);
        let mut results: Vec<Option<Result<T, CourierError>>> = (0..total).map(|_| None).collect();
        let mut remaining = ordered.into_iter();
        loop {
            let chunk: Vec<_> = remaining.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let resolved = join_all(chunk.into_iter().map(|(index, request)| async move {
                let BatchRequest {
                    key,
                    cache_type,
                    ttl_override,
                    generator,
                    ..
                } = request;
                let result = self.get(&key, cache_type, || generator, ttl_override).await;
                (index, result)
            }))
            .await;
            for (index, result) in resolved {
                results[index] = Some(result);
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(CourierError::Internal("batch request was not resolved".into()))))
            .collect()
    }

    /// Delete every entry whose key starts with `prefix`. Returns the number removed.
    pub async fn invalidate_pattern(&self, prefix: &str) -> Result<usize, CourierError> {
        let removed = self.store.delete_prefix(prefix).await?;
        info!(prefix, removed, "cache entries invalidated");
        Ok(removed)
    }

    /// Examine the next `cleanup_batch_size` entries and delete the expired ones.
    ///
    /// Each call continues where the previous one stopped, so a full pass over
    /// a large cache spans several runs.
    pub async fn cleanup_expired(&self) -> Result<SweepReport, CourierError> {
        let limit = self.config.cleanup_batch_size.max(1);
        let after = self.cursor().clone();
        let batch = self.store.scan(after.as_deref(), limit).await?;
        let now = self.clock.now();

        let mut report = SweepReport {
            examined: batch.len(),
            wrapped: batch.len() < limit,
            ..SweepReport::default()
        };
        for entry in &batch {
            if entry.is_expired(now) && self.store.delete_if_expired(&entry.key, now).await? {
                report.removed += 1;
            }
        }

        *self.cursor() = if report.wrapped {
            None
        } else {
            batch.last().map(|e| e.key.clone())
        };
        if report.removed > 0 {
            metrics::record_swept(report.removed);
        }
        debug!(
            examined = report.examined,
            removed = report.removed,
            wrapped = report.wrapped,
            "cache sweep batch"
        );
        Ok(report)
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) until one full pass completes.
    /// Returns the number of entries removed.
    pub async fn sweep_all(&self) -> Result<usize, CourierError> {
        *self.cursor() = None;
        let mut removed = 0;
        loop {
            let report = self.cleanup_expired().await?;
            removed += report.removed;
            if report.wrapped {
                return Ok(removed);
            }
        }
    }

    /// Scan the whole cache and summarize it.
    pub async fn stats(&self) -> Result<CacheStats, CourierError> {
        let page = self.config.cleanup_batch_size.max(1);
        let now = self.clock.now();
        let mut stats = CacheStats::default();
        let mut accesses: Vec<(String, u64)> = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let batch = self.store.scan(after.as_deref(), page).await?;
            for entry in &batch {
                stats.total_entries += 1;
                stats.total_accesses += entry.access_count;
                if entry.is_expired(now) {
                    stats.expired_entries += 1;
                }
                *stats.entries_by_type.entry(entry.cache_type).or_default() += 1;
                accesses.push((entry.key.clone(), entry.access_count));
            }
            if batch.len() < page {
                break;
            }
            after = batch.last().map(|e| e.key.clone());
        }

        if stats.total_entries > 0 {
            stats.average_accesses = stats.total_accesses as f64 / stats.total_entries as f64;
        }
        accesses.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        accesses.truncate(self.config.top_keys);
        stats.top_keys = accesses;
        Ok(stats)
    }
}
