use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-process mutual exclusion per string key.
///
/// Guards writes to a single ledger row (or a single fundraiser's payouts) so
/// concurrent deliveries for the same key are applied one at a time. Entries
/// are removed when the last guard for a key is dropped.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

pub struct KeyedGuard {
    key: String,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> KeyedGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.clone().lock_owned().await;
        KeyedGuard {
            key: key.to_string(),
            lock,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Under contention the entry is simply left for the next holder.
        if let Ok(mut locks) = self.locks.try_lock() {
            // map entry + our handle
            if Arc::strong_count(&self.lock) == 2 {
                if let Some(existing) = locks.get(&self.key) {
                    if Arc::ptr_eq(existing, &self.lock) {
                        locks.remove(&self.key);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = KeyedLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let guard = locks.acquire("stripe:pi_1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                drop(guard);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len().await, 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = KeyedLocks::new();
        let a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire("b")).await;
        assert!(b.is_ok());
        drop(a);
    }
}
