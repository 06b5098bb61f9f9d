//! Keyed mutual exclusion for lifecycle operations.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::trace;

/// Key held for the duration of a fleet-wide rebuild. Not a valid profile name.
pub const REBUILD_KEY: &str = "*rebuild*";

/// One lock per key, created on demand and dropped when released.
#[derive(Debug, Default)]
pub struct ProfileLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl ProfileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block until `key` is free, then hold it until the guard is dropped.
    pub fn acquire(&self, key: &str) -> ProfileGuard<'_> {
        let mut held = self.held();
        while held.contains(key) {
            trace!(key, "waiting for lifecycle lock");
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(key.to_string());
        ProfileGuard {
            locks: self,
            key: key.to_string(),
        }
    }

    pub fn try_acquire(&self, key: &str) -> Option<ProfileGuard<'_>> {
        let mut held = self.held();
        if !held.insert(key.to_string()) {
            return None;
        }
        Some(ProfileGuard {
            locks: self,
            key: key.to_string(),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held().contains(key)
    }
}

#[derive(Debug)]
pub struct ProfileGuard<'a> {
    locks: &'a ProfileLocks,
    key: String,
}

impl ProfileGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ProfileGuard<'_> {
    fn drop(&mut self) {
        self.locks.held().remove(&self.key);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_key_is_serialized() {
        let locks = Arc::new(ProfileLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    let _guard = locks.acquire("alpha");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(!locks.is_held("alpha"));
    }

    #[test]
    fn test_distinct_keys_do_not_block() {
        let locks = ProfileLocks::new();
        let alpha = locks.acquire("alpha");
        let beta = locks.try_acquire("beta");
        assert!(beta.is_some());
        assert!(locks.try_acquire("alpha").is_none());
        assert_eq!(alpha.key(), "alpha");
        drop(alpha);
        assert!(locks.try_acquire("alpha").is_some());
    }
}
