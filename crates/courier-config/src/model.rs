// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Courier.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use courier_core::CacheType;
use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Device identity and logging.
    #[serde(default)]
    pub client: ClientConfig,

    /// Local storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outgoing message delivery and retry settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Debounced write settings.
    #[serde(default)]
    pub batcher: BatcherConfig,

    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Device identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Device identifier appended to every generated local message id.
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            log_level: default_log_level(),
        }
    }
}

fn default_device_id() -> String {
    "device".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "courier.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Delivery pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Retry attempts after the first try before a message is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles for every later retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// How often the scheduler re-checks the queue for messages whose backoff elapsed.
    #[serde(default = "default_retry_tick_ms")]
    pub retry_tick_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            retry_tick_ms: default_retry_tick_ms(),
        }
    }
}

impl DeliveryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn retry_tick(&self) -> Duration {
        Duration::from_millis(self.retry_tick_ms)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_retry_tick_ms() -> u64 {
    1000
}

/// Write batcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatcherConfig {
    /// Debounce window for conversation-preview writes.
    #[serde(default = "default_preview_debounce_ms")]
    pub preview_debounce_ms: u64,

    /// Accumulation window for local message-cache writes.
    #[serde(default = "default_local_cache_debounce_ms")]
    pub local_cache_debounce_ms: u64,

    /// Newest messages kept per conversation in the local message cache.
    #[serde(default = "default_local_cache_limit")]
    pub local_cache_limit: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            preview_debounce_ms: default_preview_debounce_ms(),
            local_cache_debounce_ms: default_local_cache_debounce_ms(),
            local_cache_limit: default_local_cache_limit(),
        }
    }
}

impl BatcherConfig {
    pub fn preview_window(&self) -> Duration {
        Duration::from_millis(self.preview_debounce_ms)
    }

    pub fn local_cache_window(&self) -> Duration {
        Duration::from_millis(self.local_cache_debounce_ms)
    }
}

fn default_preview_debounce_ms() -> u64 {
    300
}

fn default_local_cache_debounce_ms() -> u64 {
    200
}

fn default_local_cache_limit() -> usize {
    100
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Per-kind TTL overrides in seconds.
    #[serde(default)]
    pub ttl_secs: CacheTtlConfig,

    /// Sub-requests resolved concurrently per `get_batch` chunk.
    #[serde(default = "default_batch_chunk_size")]
    pub batch_chunk_size: usize,

    /// Entries examined per janitor run.
    #[serde(default = "default_cleanup_batch_size")]
    pub cleanup_batch_size: usize,

    /// Interval between janitor runs.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Number of most-accessed keys reported by cache statistics.
    #[serde(default = "default_top_keys")]
    pub top_keys: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: CacheTtlConfig::default(),
            batch_chunk_size: default_batch_chunk_size(),
            cleanup_batch_size: default_cleanup_batch_size(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            top_keys: default_top_keys(),
        }
    }
}

impl CacheConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn default_batch_chunk_size() -> usize {
    5
}

fn default_cleanup_batch_size() -> usize {
    100
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_top_keys() -> usize {
    10
}

/// Time-to-live per cache kind, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheTtlConfig {
    #[serde(default = "default_ttl_ai_reply")]
    pub ai_reply: u64,
    #[serde(default = "default_ttl_search_results")]
    pub search_results: u64,
    #[serde(default = "default_ttl_summary")]
    pub summary: u64,
    #[serde(default = "default_ttl_priority")]
    pub priority: u64,
    #[serde(default = "default_ttl_action_items")]
    pub action_items: u64,
    #[serde(default = "default_ttl_decisions")]
    pub decisions: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            ai_reply: default_ttl_ai_reply(),
            search_results: default_ttl_search_results(),
            summary: default_ttl_summary(),
            priority: default_ttl_priority(),
            action_items: default_ttl_action_items(),
            decisions: default_ttl_decisions(),
        }
    }
}

impl CacheTtlConfig {
    /// TTL configured for `kind`.
    pub fn ttl_for(&self, kind: CacheType) -> Duration {
        let secs = match kind {
            CacheType::AiReply => self.ai_reply,
            CacheType::SearchResults => self.search_results,
            CacheType::Summary => self.summary,
            CacheType::Priority => self.priority,
            CacheType::ActionItems => self.action_items,
            CacheType::Decisions => self.decisions,
        };
        Duration::from_secs(secs)
    }
}

fn default_ttl_ai_reply() -> u64 {
    CacheType::AiReply.default_ttl().as_secs()
}

fn default_ttl_search_results() -> u64 {
    CacheType::SearchResults.default_ttl().as_secs()
}

fn default_ttl_summary() -> u64 {
    CacheType::Summary.default_ttl().as_secs()
}

fn default_ttl_priority() -> u64 {
    CacheType::Priority.default_ttl().as_secs()
}

fn default_ttl_action_items() -> u64 {
    CacheType::ActionItems.default_ttl().as_secs()
}

fn default_ttl_decisions() -> u64 {
    CacheType::Decisions.default_ttl().as_secs()
}
