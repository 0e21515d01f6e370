//! Per-key serialization of async work.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A lazily created async mutex per key.
///
/// Holders of the guard for one key exclude each other; different keys never
/// contend beyond the brief map lookup. A key's entry is dropped once its last
/// holder releases and nobody is queued behind it.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
  locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash> Default for KeyedLocks<K> {
  fn default() -> Self {
    Self {
      locks: Mutex::new(HashMap::new()),
    }
  }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn lock(&self, key: &K) -> KeyGuard<'_, K> {
    let lock = {
      let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
      Arc::clone(locks.entry(key.clone()).or_default())
    };
    KeyGuard {
      owner: self,
      key: key.clone(),
      guard: Some(lock.lock_owned().await),
    }
  }

  fn release(&self, key: &K) {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    // Waiters clone the Arc under this map lock, so a count of one means only
    // the map still refers to it.
    if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
      locks.remove(key);
    }
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
  }
}

/// Exclusive hold on one key of a [`KeyedLocks`].
pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
  owner: &'a KeyedLocks<K>,
  key: K,
  guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
  fn drop(&mut self) {
    drop(self.guard.take());
    self.owner.release(&self.key);
  }
}
