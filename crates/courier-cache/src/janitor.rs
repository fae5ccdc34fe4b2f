// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;

/// Run one cleanup batch every `interval` until `cancel` fires.
pub fn spawn_janitor(
    cache: Arc<ResponseCache>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick.
        ticker.tick().await;
        info!(interval_secs = interval.as_secs(), "cache janitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match cache.cleanup_expired().await {
                        Ok(report) if report.removed > 0 => {
                            info!(removed = report.removed, examined = report.examined, "expired cache entries swept");
                        }
                        Ok(_) => debug!("cache janitor found nothing to sweep"),
                        Err(e) => warn!(error = %e, "cache sweep failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("cache janitor shutting down");
                    break;
                }
            }
        }
    })
}
