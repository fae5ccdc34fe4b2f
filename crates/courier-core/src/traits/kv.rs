// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device-local persistent key-value store contract.

use async_trait::async_trait;

use crate::error::CourierError;

/// String blobs keyed by string, surviving process restart.
///
/// No transactional guarantees beyond last-write-wins per key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored blob, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), CourierError>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CourierError>;
}
