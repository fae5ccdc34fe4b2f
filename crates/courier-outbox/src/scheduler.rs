// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry scheduler: drains the durable queue into the remote store.
//!
//! Per message: `pending -> sending -> {sent | pending(retry_count + 1) | failed}`.
//! The scheduler only drains while the connectivity signal reports online.
//! A transition to online clears all backoff and drains the whole pending
//! list in FIFO order. Each attempt runs in its own task; a drain pass waits
//! for it up to one tick, so a hung remote call holds only its own message.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use courier_config::DeliveryConfig;
use courier_core::{
    ConnectivitySignal, CourierError, LocalId, QueuedMessage, RemoteAck, RemoteStore,
};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::queue::{DurableQueue, FailureOutcome};

const EVENT_CAPACITY: usize = 256;

/// Cap for backoff deadlines that would overflow the clock.
const MAX_DEFERRAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Backoff and retry limits.
///
/// The first try goes out as soon as the message is drained, so the backoff
/// sequence starts at the first retry: retry `r` waits `base * 2^(r-1)`. With
/// the defaults that is 1 s, 2 s and 4 s; the 8 s step of
/// [`backoff_delay`](Self::backoff_delay) would only be reached with a fourth
/// retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first try.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub backoff_base: Duration,
    /// Re-check interval, and how long a drain pass waits on one attempt.
    pub tick: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base(),
            tick: config.retry_tick(),
        }
    }

    /// `base * 2^n`: 1 s, 2 s, 4 s, 8 s with the default base.
    pub fn backoff_delay(&self, n: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(n))
    }

    /// Wait before retry number `retry` (1-based).
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        self.backoff_delay(retry.saturating_sub(1))
    }
}

/// Delivery state changes published to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    Sent {
        local_id: LocalId,
        server_id: String,
    },
    Retrying {
        local_id: LocalId,
        retry_count: u32,
        delay: Duration,
        error: String,
    },
    /// Exhausted or rejected; the message is in the failed store awaiting manual resend.
    Failed { local_id: LocalId, error: String },
}

struct Inner {
    queue: Arc<DurableQueue>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<dyn ConnectivitySignal>,
    policy: RetryPolicy,
    in_flight: Mutex<HashSet<LocalId>>,
    not_before: Mutex<HashMap<LocalId, Instant>>,
    events: broadcast::Sender<DeliveryEvent>,
    wake: Notify,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Exclusive right to attempt one message; released on drop.
struct Claim {
    inner: Arc<Inner>,
    local_id: LocalId,
}

impl Claim {
    fn acquire(inner: &Arc<Inner>, local_id: &LocalId) -> Option<Self> {
        if !lock(&inner.in_flight).insert(local_id.clone()) {
            return None;
        }
        Some(Self {
            inner: inner.clone(),
            local_id: local_id.clone(),
        })
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        lock(&self.inner.in_flight).remove(&self.local_id);
        self.inner.wake.notify_one();
    }
}

impl Inner {
    fn publish(&self, event: DeliveryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn is_deferred(&self, local_id: &LocalId) -> bool {
        let mut not_before = lock(&self.not_before);
        match not_before.get(local_id) {
            Some(at) if *at > Instant::now() => true,
            Some(_) => {
                not_before.remove(local_id);
                false
            }
            None => false,
        }
    }

    fn next_wake(&self, online: bool) -> Option<Duration> {
        if !online {
            return None;
        }
        let now = Instant::now();
        let earliest = lock(&self.not_before)
            .values()
            .map(|at| at.saturating_duration_since(now))
            .min();
        Some(earliest.map_or(self.policy.tick, |d| d.min(self.policy.tick)))
    }

    async fn attempt(self: Arc<Self>, claim: Claim) {
        let local_id = &claim.local_id;
        let msg = match self.queue.mark_sending(local_id).await {
            Ok(msg) => msg,
            Err(CourierError::NotFound { .. }) => return,
            Err(e) => {
                warn!(local_id = %local_id, error = %e, "could not mark message as sending");
                return;
            }
        };
        debug!(local_id = %local_id, retry_count = msg.retry_count, "delivery attempt");

        match self.remote.put_message(&msg).await {
            Ok(ack) => self.on_sent(&msg, ack).await,
            Err(e) if e.is_retryable() => self.on_transient_failure(&msg, e).await,
            Err(e) => self.on_rejected(&msg, e).await,
        }
    }

    async fn on_sent(&self, msg: &QueuedMessage, ack: RemoteAck) {
        let local_id = &msg.local_id;
        if let Err(e) = self
            .queue
            .dequeue_succeeded(local_id, Some(ack.server_id.clone()))
            .await
        {
            // Stays queued; the next pass re-sends and the remote dedupes by local id.
            error!(local_id = %local_id, error = %e, "sent message could not be removed from outbox");
            return;
        }
        info!(local_id = %local_id, server_id = %ack.server_id, "message delivered");
        metrics::record_sent();
        self.publish(DeliveryEvent::Sent {
            local_id: local_id.clone(),
            server_id: ack.server_id,
        });
    }

    async fn on_transient_failure(&self, msg: &QueuedMessage, err: CourierError) {
        let local_id = &msg.local_id;
        let reason = err.to_string();
        match self.queue.record_failure(local_id, &reason).await {
            Ok(FailureOutcome::Retry { retry_count }) => {
                let delay = self.policy.delay_before_retry(retry_count);
                let now = Instant::now();
                let due = now.checked_add(delay).unwrap_or(now + MAX_DEFERRAL);
                lock(&self.not_before).insert(local_id.clone(), due);
                warn!(
                    local_id = %local_id,
                    retry_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "delivery failed, retry scheduled"
                );
                metrics::record_retry();
                self.publish(DeliveryEvent::Retrying {
                    local_id: local_id.clone(),
                    retry_count,
                    delay,
                    error: reason,
                });
            }
            Ok(FailureOutcome::Exhausted) => {
                warn!(
                    local_id = %local_id,
                    max_retries = self.policy.max_retries,
                    error = %reason,
                    "delivery retries exhausted, message failed"
                );
                metrics::record_failed("exhausted");
                self.publish(DeliveryEvent::Failed {
                    local_id: local_id.clone(),
                    error: reason,
                });
            }
            Err(e) => {
                error!(local_id = %local_id, error = %e, "could not record delivery failure");
            }
        }
    }

    async fn on_rejected(&self, msg: &QueuedMessage, err: CourierError) {
        let local_id = &msg.local_id;
        let reason = err.to_string();
        if let Err(e) = self.queue.fail_permanently(local_id, &reason).await {
            error!(local_id = %local_id, error = %e, "could not move rejected message to failed store");
            return;
        }
        warn!(local_id = %local_id, error = %reason, "remote store rejected message");
        metrics::record_failed("rejected");
        self.publish(DeliveryEvent::Failed {
            local_id: local_id.clone(),
            error: reason,
        });
    }
}

/// Drains a [`DurableQueue`] into a [`RemoteStore`] with exponential backoff.
#[derive(Clone)]
pub struct RetryScheduler {
    inner: Arc<Inner>,
}

impl RetryScheduler {
    pub fn new(
        queue: Arc<DurableQueue>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn ConnectivitySignal>,
        policy: RetryPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                queue,
                remote,
                connectivity,
                policy,
                in_flight: Mutex::new(HashSet::new()),
                not_before: Mutex::new(HashMap::new()),
                events,
                wake: Notify::new(),
            }),
        }
    }

    pub fn queue(&self) -> &Arc<DurableQueue> {
        &self.inner.queue
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    /// Delivery events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.inner.events.subscribe()
    }

    /// Enqueue a message and wake the scheduler. Returns `false` for a duplicate local id.
    pub async fn submit(&self, message: QueuedMessage) -> Result<bool, CourierError> {
        let added = self.inner.queue.enqueue(message).await?;
        if added {
            metrics::set_pending(self.inner.queue.pending_len().await);
            self.inner.wake.notify_one();
        }
        Ok(added)
    }

    /// Move a failed message back to the queue and wake the scheduler.
    pub async fn resend(&self, local_id: &LocalId) -> Result<QueuedMessage, CourierError> {
        let msg = self.inner.queue.resend(local_id).await?;
        lock(&self.inner.not_before).remove(local_id);
        self.inner.wake.notify_one();
        Ok(msg)
    }

    /// Number of attempts currently awaiting the remote store.
    pub fn in_flight(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }

    /// Run one drain pass over the pending list in FIFO order.
    ///
    /// Skips entries in backoff or already in flight, and stops early if the
    /// device goes offline. Returns the number of attempts started.
    pub async fn drain(&self) -> usize {
        let inner = &self.inner;
        let mut started = 0;
        for msg in inner.queue.list_pending().await {
            if !inner.connectivity.is_online() {
                debug!("went offline during drain");
                break;
            }
            if inner.is_deferred(&msg.local_id) {
                continue;
            }
            let Some(claim) = Claim::acquire(inner, &msg.local_id) else {
                continue;
            };
            started += 1;
            let handle = tokio::spawn(inner.clone().attempt(claim));
            match tokio::time::timeout(inner.policy.tick, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(local_id = %msg.local_id, error = %e, "delivery task failed"),
                Err(_) => debug!(
                    local_id = %msg.local_id,
                    "attempt still outstanding, continuing drain"
                ),
            }
        }
        metrics::set_pending(inner.queue.pending_len().await);
        started
    }

    /// Drive the queue until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut online = self.inner.connectivity.subscribe();
        let mut was_online = false;
        info!(
            max_retries = self.inner.policy.max_retries,
            backoff_base_ms = self.inner.policy.backoff_base.as_millis() as u64,
            "retry scheduler started"
        );

        loop {
            let is_online = *online.borrow_and_update();
            if is_online {
                if !was_online {
                    info!("connectivity available, draining outbox");
                    lock(&self.inner.not_before).clear();
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.drain() => {}
                }
            }
            was_online = is_online;

            let wait = self.inner.next_wake(is_online);
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = online.changed() => {
                    if changed.is_err() {
                        warn!("connectivity signal closed, stopping scheduler");
                        break;
                    }
                }
                _ = self.inner.wake.notified() => {}
                _ = sleep_for(wait) => {}
            }
        }

        info!("retry scheduler stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(cancel))
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
