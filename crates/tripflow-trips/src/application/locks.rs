//! Per-key async locks used to serialize commands.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type Slots<K> = Arc<Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>>;

/// A map of async mutexes created on demand and removed once nobody holds
/// or waits on them.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Slots<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> KeyedLockGuard<K> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let guard = slot.lock_owned().await;
        KeyedLockGuard {
            key,
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no key is held or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one key; released on drop.
#[derive(Debug)]
pub struct KeyedLockGuard<K>
where
    K: Eq + Hash,
{
    key: K,
    slots: Slots<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyedLockGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Release while holding the table lock so no waiter can slip in
        // between the release and the count check.
        drop(self.guard.take());
        if let Some(slot) = slots.get(&self.key) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.key);
            }
        }
    }
}
