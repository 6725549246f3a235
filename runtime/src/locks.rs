//! Keyed async locks with bounded acquisition.
//!
//! [`KeyedLocks`] hands out one async mutex per key (a session id, a user id, an
//! equipment id) so operations on different keys never wait on each other. Every
//! acquisition has a deadline; hitting it yields [`LockError::Timeout`] instead of
//! waiting forever.
//!
//! # Ordering
//!
//! Deadlock freedom relies on a global acquisition order. Callers that need several
//! resource classes acquire them class by class in a fixed order, and within one class
//! [`KeyedLocks::acquire_all_until`] locks keys in ascending order.
//!
//! # Example
//!
//! ```rust
//! use gym_runtime::locks::KeyedLocks;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), gym_runtime::locks::LockError> {
//! let locks: KeyedLocks<u32> = KeyedLocks::new("session");
//! let guard = locks.acquire(7, Duration::from_millis(100)).await?;
//! assert_eq!(*guard.key(), 7);
//! assert!(locks.acquire(7, Duration::from_millis(10)).await.is_err());
//! drop(guard);
//! assert!(locks.acquire(7, Duration::from_millis(10)).await.is_ok());
//! # Ok(())
//! # }
//! ```

use crate::metrics::LockMetrics;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

/// Idle entries are swept once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 1024;

/// Lock acquisition failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The deadline passed before the lock was granted
    #[error("Timed out waiting for {resource} lock on {key}")]
    Timeout {
        /// Resource class (`"schedule"`, `"user"`, `"session"`, `"equipment"`)
        resource: &'static str,
        /// Key that could not be locked
        key: String,
    },
}

impl LockError {
    /// Resource class of the failed acquisition
    #[must_use]
    pub const fn resource(&self) -> &'static str {
        match self {
            Self::Timeout { resource, .. } => resource,
        }
    }
}

/// Exclusive hold on one key. Released on drop.
pub struct KeyGuard<K> {
    key: K,
    _guard: OwnedMutexGuard<()>,
}

impl<K> KeyGuard<K> {
    /// The locked key
    pub const fn key(&self) -> &K {
        &self.key
    }
}

impl<K: fmt::Debug> fmt::Debug for KeyGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGuard").field("key", &self.key).finish()
    }
}

/// One async mutex per key, created on first use.
pub struct KeyedLocks<K> {
    resource: &'static str,
    entries: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K> fmt::Debug for KeyedLocks<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLocks")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone + fmt::Display,
{
    /// Creates an empty lock table for a resource class.
    #[must_use]
    pub fn new(resource: &'static str) -> Self {
        Self {
            resource,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resource class name used in errors and metrics
    #[must_use]
    pub const fn resource(&self) -> &'static str {
        self.resource
    }

    /// Lock `key`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock is not granted in time.
    pub async fn acquire(&self, key: K, timeout: Duration) -> Result<KeyGuard<K>, LockError> {
        self.acquire_until(key, Instant::now() + timeout).await
    }

    /// Lock `key`, waiting until `deadline` at the latest.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock is not granted by `deadline`.
    pub async fn acquire_until(&self, key: K, deadline: Instant) -> Result<KeyGuard<K>, LockError> {
        let mutex = self.entry(&key);
        let started = Instant::now();

        if let Ok(guard) = tokio::time::timeout_at(deadline, mutex.lock_owned()).await {
            LockMetrics::record_wait(self.resource, started.elapsed());
            Ok(KeyGuard { key, _guard: guard })
        } else {
            LockMetrics::record_timeout(self.resource);
            tracing::debug!(resource = self.resource, key = %key, "Lock acquisition timed out");
            Err(LockError::Timeout {
                resource: self.resource,
                key: key.to_string(),
            })
        }
    }

    /// Lock every key, in ascending order with duplicates collapsed, sharing one deadline.
    ///
    /// On failure every guard acquired so far is released before returning.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] for the first key not granted by `deadline`.
    pub async fn acquire_all_until(
        &self,
        keys: impl IntoIterator<Item = K>,
        deadline: Instant,
    ) -> Result<Vec<KeyGuard<K>>, LockError> {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.acquire_until(key, deadline).await?);
        }
        Ok(guards)
    }

    /// Number of keys currently tracked
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    /// Checks if no key is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune(&self) {
        Self::prune_idle(&mut self.lock_entries());
    }

    fn entry(&self, key: &K) -> Arc<tokio::sync::Mutex<()>> {
        let mut entries = self.lock_entries();
        if entries.len() >= PRUNE_THRESHOLD {
            Self::prune_idle(&mut entries);
        }
        Arc::clone(entries.entry(key.clone()).or_default())
    }

    // Held guards and pending waiters each own a clone of the Arc, so a count of one
    // means only the map refers to the mutex.
    fn prune_idle(entries: &mut HashMap<K, Arc<tokio::sync::Mutex<()>>>) {
        entries.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<K, Arc<tokio::sync::Mutex<()>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
