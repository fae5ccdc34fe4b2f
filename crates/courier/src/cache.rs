// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier cache` subcommands.

use std::sync::Arc;
use std::time::Duration;

use courier_cache::{CacheStats, ResponseCache, spawn_janitor};
use courier_config::model::CourierConfig;
use courier_core::{CourierError, SystemClock};
use courier_storage::{Database, SqliteCacheStore};
use tokio_util::sync::CancellationToken;

fn open_cache(db: Arc<Database>, config: &CourierConfig) -> ResponseCache {
    ResponseCache::new(
        Arc::new(SqliteCacheStore::new(db)),
        Arc::new(SystemClock),
        config.cache.clone(),
    )
}

pub async fn run_stats(
    db: Arc<Database>,
    config: &CourierConfig,
    json: bool,
) -> Result<(), CourierError> {
    let stats = open_cache(db, config).stats().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }
    Ok(())
}

fn print_stats(stats: &CacheStats) {
    println!();
    println!("  courier cache stats");
    println!("  {}", "-".repeat(35));
    println!("    Entries:  {}", stats.total_entries);
    println!("    Expired:  {}", stats.expired_entries);
    println!(
        "    Accesses: {} ({:.2} per entry)",
        stats.total_accesses, stats.average_accesses
    );
    if !stats.entries_by_type.is_empty() {
        println!();
        for (kind, count) in &stats.entries_by_type {
            println!("    {kind:<15} {count}");
        }
    }
    if !stats.top_keys.is_empty() {
        println!();
        println!("  Most used:");
        for (key, accesses) in &stats.top_keys {
            println!("    {accesses:>6}  {key}");
        }
    }
    println!();
}

/// Delete every expired entry in one full pass.
pub async fn run_sweep(db: Arc<Database>, config: &CourierConfig) -> Result<(), CourierError> {
    let removed = open_cache(db, config).sweep_all().await?;
    println!("removed {removed} expired cache entries");
    Ok(())
}

/// Run the periodic cleanup in the foreground until `cancel` fires.
///
/// Clients sweep with [`ResponseCache::sweep_all`] or their own janitor; this
/// hosts one for a shared database.
pub async fn run_janitor(
    db: Arc<Database>,
    config: &CourierConfig,
    cancel: CancellationToken,
) -> Result<(), CourierError> {
    let cache = Arc::new(open_cache(db, config));
    let interval = Duration::from_secs(config.cache.cleanup_interval_secs.max(1));
    println!(
        "cache janitor running every {}s, press Ctrl+C to stop",
        interval.as_secs()
    );
    spawn_janitor(cache, interval, cancel)
        .await
        .map_err(|e| CourierError::Internal(format!("cache janitor task failed: {e}")))
}

pub async fn run_invalidate(
    db: Arc<Database>,
    config: &CourierConfig,
    prefix: &str,
) -> Result<(), CourierError> {
    if prefix.is_empty() {
        return Err(CourierError::Config(
            "refusing to invalidate with an empty prefix".into(),
        ));
    }
    let removed = open_cache(db, config).invalidate_pattern(prefix).await?;
    println!("removed {removed} cache entries under {prefix}");
    Ok(())
}
