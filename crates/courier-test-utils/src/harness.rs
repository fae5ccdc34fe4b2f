// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bundles every fake collaborator behind one builder.
//!
//! Tests hand the `Arc`s to the component under test and keep the harness to
//! drive connectivity, script the remote, and inspect writes.

use std::sync::Arc;

use courier_core::{
    CacheStore, Clock, ConnectivitySignal, GenerationService, KeyValueStore, LocalIdGenerator,
    RemoteStore, VectorSearch,
};

use crate::clock::ManualClock;
use crate::connectivity::MockConnectivity;
use crate::flaky::{FlakyCacheStore, FlakyKvStore};
use crate::generator::CountingGenerator;
use crate::mock_remote::MockRemoteStore;
use crate::vector::InMemoryVectorIndex;

/// Builder for a [`TestHarness`].
pub struct TestHarnessBuilder {
    online: bool,
    failing_puts: usize,
    device_id: String,
    kv: Option<FlakyKvStore>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            online: true,
            failing_puts: 0,
            device_id: "test".to_string(),
            kv: None,
        }
    }

    /// Start with the device offline.
    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    /// Fail the first `n` remote puts transiently.
    pub fn with_failing_puts(mut self, n: usize) -> Self {
        self.failing_puts = n;
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    /// Reuse a key-value store, e.g. to simulate a process restart.
    pub fn with_kv(mut self, kv: FlakyKvStore) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn build(self) -> TestHarness {
        let remote = Arc::new(MockRemoteStore::new());
        remote.fail_next_puts(self.failing_puts);
        let clock = Arc::new(ManualClock::new());
        let ids = Arc::new(LocalIdGenerator::new(
            self.device_id,
            clock.clone() as Arc<dyn Clock>,
        ));
        TestHarness {
            remote,
            connectivity: Arc::new(MockConnectivity::new(self.online)),
            clock,
            ids,
            kv: self.kv.unwrap_or_default(),
            cache_store: FlakyCacheStore::new(),
            generator: CountingGenerator::new(),
            vectors: InMemoryVectorIndex::new(),
        }
    }
}

/// Shared fakes for one test.
pub struct TestHarness {
    pub remote: Arc<MockRemoteStore>,
    pub connectivity: Arc<MockConnectivity>,
    pub clock: Arc<ManualClock>,
    pub ids: Arc<LocalIdGenerator>,
    pub kv: FlakyKvStore,
    pub cache_store: FlakyCacheStore,
    pub generator: CountingGenerator,
    pub vectors: InMemoryVectorIndex,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn remote_store(&self) -> Arc<dyn RemoteStore> {
        self.remote.clone()
    }

    pub fn connectivity_signal(&self) -> Arc<dyn ConnectivitySignal> {
        self.connectivity.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn kv_store(&self) -> Arc<dyn KeyValueStore> {
        Arc::new(self.kv.clone())
    }

    pub fn cache(&self) -> Arc<dyn CacheStore> {
        Arc::new(self.cache_store.clone())
    }

    pub fn generation(&self) -> Arc<dyn GenerationService> {
        Arc::new(self.generator.clone())
    }

    pub fn vector_search(&self) -> Arc<dyn VectorSearch> {
        Arc::new(self.vectors.clone())
    }

    pub fn go_online(&self) {
        self.connectivity.set_online(true);
    }

    pub fn go_offline(&self) {
        self.connectivity.set_online(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_applies_options() {
        let harness = TestHarness::builder()
            .offline()
            .with_failing_puts(1)
            .with_device_id("tab")
            .build();
        assert!(!harness.connectivity_signal().is_online());
        assert!(harness.ids.next_id().as_str().ends_with("-tab"));
        harness.go_online();
        assert!(harness.connectivity_signal().is_online());
    }

    #[tokio::test]
    async fn shared_kv_survives_rebuild() {
        let first = TestHarness::builder().build();
        first.kv_store().set("k", "v").await.unwrap();
        let second = TestHarness::builder().with_kv(first.kv.clone()).build();
        assert_eq!(second.kv_store().get("k").await.unwrap().as_deref(), Some("v"));
    }
}
