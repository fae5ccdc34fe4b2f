// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier.
//!
//! Deterministic stand-ins for every external collaborator so delivery and
//! cache behavior can be tested without a network, a model, or a real clock.
//!
//! # Components
//!
//! - [`MockRemoteStore`] - idempotent remote store with scripted failures and call logs
//! - [`MockConnectivity`] - online/offline switch
//! - [`ManualClock`] - wall clock that only moves on request
//! - [`CountingGenerator`] - generation service that counts calls
//! - [`InMemoryVectorIndex`] - cosine-similarity vector search
//! - [`FlakyKvStore`], [`FlakyCacheStore`] - stores with failure switches
//! - [`TestHarness`] - all of the above behind one builder

pub mod clock;
pub mod connectivity;
pub mod flaky;
pub mod generator;
pub mod harness;
pub mod mock_remote;
pub mod vector;

pub use clock::ManualClock;
pub use connectivity::MockConnectivity;
pub use flaky::{FlakyCacheStore, FlakyKvStore};
pub use generator::{CountingGenerator, fake_embedding};
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_remote::{MockRemoteStore, PutOutcome};
pub use vector::InMemoryVectorIndex;
