//! Per-slot execution locks
//!
//! At most one execution per cache slot runs at a time inside a process.
//! A second requester suspends on the slot's async mutex and, once the
//! first execution has written its entry, sees that entry as a cache hit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Table of slot locks shared by every request of one executor
#[derive(Debug, Default)]
pub struct KeyLocks {
    slots: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of a slot
    pub async fn acquire(&self, slot: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop locks nobody holds or waits on
            slots.retain(|_, lock| Arc::strong_count(lock) > 1);
            slots
                .entry(slot.to_path_buf())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    /// Number of slots currently held or awaited
    pub fn in_use(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.values().filter(|lock| Arc::strong_count(lock) > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_slot_serializes() {
        let locks = Arc::new(KeyLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(Path::new("/store/fetch/a.json")).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_slots_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.acquire(Path::new("/store/a.json")).await;
        let _b = locks.acquire(Path::new("/store/b.json")).await;

        assert_eq!(locks.in_use(), 2);
    }

    #[tokio::test]
    async fn released_slots_are_pruned() {
        let locks = KeyLocks::new();
        {
            let _guard = locks.acquire(Path::new("/store/a.json")).await;
        }
        let _b = locks.acquire(Path::new("/store/b.json")).await;

        assert_eq!(locks.in_use(), 1);
    }
}
