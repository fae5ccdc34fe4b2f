// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-key table of delayed tasks.
//!
//! Each key holds at most one scheduled task. A task removes its own slot
//! before it starts running, so [`TaskTable::cancel`] only ever aborts a task
//! that is still sleeping, never one that is halfway through a write.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Slots<K> {
    next_generation: u64,
    tasks: HashMap<K, Slot>,
}

impl<K> Drop for Slots<K> {
    fn drop(&mut self) {
        for slot in self.tasks.values() {
            slot.handle.abort();
        }
    }
}

fn lock<K>(slots: &Mutex<Slots<K>>) -> MutexGuard<'_, Slots<K>> {
    slots.lock().unwrap_or_else(|e| e.into_inner())
}

/// Delayed tasks keyed by `K`, at most one per key.
///
/// Dropping the last handle aborts every task that has not started yet.
pub struct TaskTable<K> {
    slots: Arc<Mutex<Slots<K>>>,
}

impl<K> Clone for TaskTable<K> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }
}

impl<K> Default for TaskTable<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TaskTable<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_generation: 0,
                tasks: HashMap::new(),
            })),
        }
    }

    /// Run `task` after `delay`, replacing any task already scheduled for `key`.
    ///
    /// This is a trailing debounce: every call restarts the window.
    pub fn schedule_or_replace<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slots = lock(&self.slots);
        if let Some(old) = slots.tasks.remove(&key) {
            old.handle.abort();
        }
        self.insert(&mut slots, key, delay, task);
    }

    /// Run `task` after `delay` unless a task is already scheduled for `key`.
    ///
    /// The window is fixed from the first call. Returns whether `task` was scheduled.
    pub fn schedule_if_absent<F>(&self, key: K, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slots = lock(&self.slots);
        if slots.tasks.contains_key(&key) {
            return false;
        }
        self.insert(&mut slots, key, delay, task);
        true
    }

    /// Abort the task scheduled for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.slots).tasks.remove(key) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every scheduled task. Returns how many were pending.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Slot> = lock(&self.slots).tasks.drain().map(|(_, s)| s).collect();
        for slot in &drained {
            slot.handle.abort();
        }
        drained.len()
    }

    pub fn is_scheduled(&self, key: &K) -> bool {
        lock(&self.slots).tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert<F>(&self, slots: &mut Slots<K>, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        slots.next_generation += 1;
        let generation = slots.next_generation;
        let table = Arc::downgrade(&self.slots);
        let owned_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if take_slot(&table, &owned_key, generation) {
                task.await;
            }
        });
        slots.tasks.insert(key, Slot { generation, handle });
    }
}

/// Remove the slot for `key` if it still belongs to `generation`.
fn take_slot<K: Eq + Hash>(table: &Weak<Mutex<Slots<K>>>, key: &K, generation: u64) -> bool {
    let Some(slots) = table.upgrade() else {
        return false;
    };
    let mut slots = lock(&slots);
    match slots.tasks.get(key) {
        Some(slot) if slot.generation == generation => {
            slots.tasks.remove(key);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Task) {
        let hits = Arc::new(AtomicUsize::new(0));
        let task_hits = hits.clone();
        let make = move || -> Task {
            let hits = task_hits.clone();
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        (hits, make)
    }

    #[tokio::test(start_paused = true)]
    async fn replace_restarts_the_window() {
        let table = TaskTable::new();
        let (hits, task) = counter();

        table.schedule_or_replace("k", Duration::from_millis(300), task());
        tokio::time::sleep(Duration::from_millis(200)).await;
        table.schedule_or_replace("k", Duration::from_millis(300), task());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(table.is_scheduled(&"k"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!table.is_scheduled(&"k"));
    }

    #[tokio::test(start_paused = true)]
    async fn if_absent_keeps_the_first_deadline() {
        let table = TaskTable::new();
        let (hits, task) = counter();

        assert!(table.schedule_if_absent("k", Duration::from_millis(200), task()));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!table.schedule_if_absent("k", Duration::from_millis(200), task()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_task() {
        let table = TaskTable::new();
        let (hits, task) = counter();

        table.schedule_or_replace(1u32, Duration::from_millis(100), task());
        table.schedule_or_replace(2u32, Duration::from_millis(100), task());
        assert!(table.cancel(&1));
        assert!(!table.cancel(&1));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        table.schedule_or_replace(3u32, Duration::from_millis(100), task());
        table.schedule_or_replace(4u32, Duration::from_millis(100), task());
        assert_eq!(table.cancel_all(), 2);
        assert!(table.is_empty());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_table_aborts_sleeping_tasks() {
        let (hits, task) = counter();
        {
            let table = TaskTable::new();
            table.schedule_or_replace("k", Duration::from_millis(100), task());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
