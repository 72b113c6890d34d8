//! Per-key async serialization.
//!
//! Turns racing on the same conversation perform read full sequence ->
//! append -> overwrite full sequence; without serialization a concurrent
//! writer's messages are silently discarded. The same applies to lead score
//! merges. `KeyedLocks` hands out one async mutex per key so those
//! read-modify-write sections run one at a time per id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// A registry of per-id async mutexes.
///
/// Entries are dropped opportunistically once nothing references them, so
/// the map stays bounded by the number of keys under contention rather than
/// every id ever seen.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `key`, waiting if another task holds it.
    pub async fn acquire(&self, key: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("keyed lock registry poisoned");
            // Drop entries nobody outside the map references anymore
            map.retain(|_, m| Arc::strong_count(m) > 1);
            map.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_mutually_exclusive() {
        let locks = KeyedLocks::new();
        let key = Uuid::new_v4();
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_section = in_section.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(key).await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = KeyedLocks::new();
        let guard_a = locks.acquire(Uuid::new_v4()).await;
        // Second acquire would hang forever if keys shared a mutex
        let guard_b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(Uuid::new_v4()),
        )
        .await
        .expect("independent key should not block");
        drop(guard_a);
        drop(guard_b);
    }

    #[tokio::test]
    async fn released_entries_are_cleaned_up() {
        let locks = KeyedLocks::new();
        for _ in 0..32 {
            let guard = locks.acquire(Uuid::new_v4()).await;
            drop(guard);
        }
        // The next acquire sweeps everything no longer referenced
        let _guard = locks.acquire(Uuid::new_v4()).await;
        assert!(locks.tracked_keys() <= 2);
    }
}
