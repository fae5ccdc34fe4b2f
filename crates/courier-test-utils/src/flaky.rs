// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store wrappers whose reads or writes can be switched to fail.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::{CacheEntry, CacheStore, CourierError, KeyValueStore};
use courier_storage::{MemoryCacheStore, MemoryKvStore};

#[derive(Default)]
struct Switches {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    write_latency: Mutex<Option<Duration>>,
}

impl Switches {
    fn read(&self) -> Result<(), CourierError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CourierError::storage(std::io::Error::other("read failed")));
        }
        Ok(())
    }

    async fn delay_write(&self) {
        let latency = *self.write_latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn write(&self) -> Result<(), CourierError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CourierError::storage(std::io::Error::other("disk full")));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A [`MemoryKvStore`] with failure switches and a write counter.
#[derive(Clone, Default)]
pub struct FlakyKvStore {
    inner: MemoryKvStore,
    switches: Arc<Switches>,
}

impl FlakyKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing store so its contents stay shared.
    pub fn wrapping(inner: MemoryKvStore) -> Self {
        Self {
            inner,
            switches: Arc::default(),
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.switches.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.switches.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every `set` by `latency` before it applies.
    pub fn set_write_latency(&self, latency: Duration) {
        *self
            .switches
            .write_latency
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(latency);
    }

    /// Successful `set`/`remove` calls so far.
    pub fn write_count(&self) -> usize {
        self.switches.writes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryKvStore {
        &self.inner
    }
}

#[async_trait]
impl KeyValueStore for FlakyKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError> {
        self.switches.read()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CourierError> {
        self.switches.delay_write().await;
        self.switches.write()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), CourierError> {
        self.switches.write()?;
        self.inner.remove(key).await
    }
}

/// A [`MemoryCacheStore`] with failure switches.
#[derive(Clone, Default)]
pub struct FlakyCacheStore {
    inner: MemoryCacheStore,
    switches: Arc<Switches>,
}

impl FlakyCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.switches.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.switches.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryCacheStore {
        &self.inner
    }
}

#[async_trait]
impl CacheStore for FlakyCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CourierError> {
        self.switches.read()?;
        self.inner.get(key).await
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CourierError> {
        self.switches.write()?;
        self.inner.put(entry).await
    }

    async fn record_access(&self, key: &str, at: DateTime<Utc>) -> Result<(), CourierError> {
        self.switches.write()?;
        self.inner.record_access(key, at).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CourierError> {
        self.switches.write()?;
        self.inner.delete(key).await
    }

    async fn delete_if_expired(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CourierError> {
        self.switches.write()?;
        self.inner.delete_if_expired(key, now).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CourierError> {
        self.switches.write()?;
        self.inner.delete_prefix(prefix).await
    }

    async fn scan(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CacheEntry>, CourierError> {
        self.switches.read()?;
        self.inner.scan(after, limit).await
    }
}
