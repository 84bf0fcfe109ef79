//! Mutual-exclusion lock over a shared transient store.
//!
//! The reconciliation loop must never run twice concurrently across
//! processes (overlapping cron runs, an admin-triggered run racing the cron
//! run). This module provides that guarantee with:
//!
//! - **Atomic acquisition**: `set_if_absent` against a shared transient store
//! - **TTL**: automatic expiry bounds how long a crashed holder can block
//!   subsequent runs
//! - **Token-checked release**: a holder only deletes its own lock entry,
//!   never one taken over after its TTL lapsed
//!
//! Acquisition is try-once: callers that lose the race are expected to skip
//! their run entirely and rely on the next tick, not to retry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ulid::Ulid;

use crate::clock::Clock;
use crate::error::{Error, Result};

/// A shared key/value store with per-entry expiry.
///
/// This is the seam to whatever transient storage the deployment offers
/// (an options/transients table, Redis, memcache). Correctness of the lock
/// requires `set_if_absent` to be atomic.
#[async_trait]
pub trait TransientStore: Send + Sync {
    /// Atomically stores `value` under `key` with the given TTL, only if the
    /// key is absent (or its previous entry has expired).
    ///
    /// Returns `true` if the value was stored, `false` if a live entry
    /// already exists.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Returns the live value under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Removes the entry under `key`. No-op if absent.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// One stored entry with its expiry deadline.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("transient store lock poisoned")
}

/// In-memory transient store for testing.
///
/// Expiry is evaluated lazily against the injected clock, so tests can
/// advance a [`crate::clock::ManualClock`] past a TTL instead of sleeping.
pub struct MemoryTransientStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryTransientStore {
    /// Creates an empty store reading time from the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl TransientStore for MemoryTransientStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        let now = self.clock.now();

        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
            // Expired entry - fall through and overwrite.
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(poison_err)?;
        let now = self.clock.now();

        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        entries.remove(key);
        Ok(())
    }
}

/// A named mutual-exclusion lock over a [`TransientStore`].
///
/// Each acquisition stores a unique token; release only deletes the entry
/// while the token still matches, so a successor that took over after TTL
/// expiry is never evicted by the stale holder.
pub struct ProcessLock {
    store: Arc<dyn TransientStore>,
    key: String,
}

impl ProcessLock {
    /// Creates a lock identified by `key`.
    #[must_use]
    pub fn new(store: Arc<dyn TransientStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Returns the lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Attempts to acquire the lock once.
    ///
    /// Returns `Ok(None)` when the lock is held by someone else; the caller
    /// should skip its critical section.
    ///
    /// # Errors
    ///
    /// Returns an error if the transient store fails.
    pub async fn try_acquire(&self, ttl: Duration) -> Result<Option<LockLease>> {
        let token = Ulid::new().to_string();

        if self.store.set_if_absent(&self.key, &token, ttl).await? {
            Ok(Some(LockLease {
                store: Arc::clone(&self.store),
                key: self.key.clone(),
                token,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Returns whether the lock is currently held by anyone.
    ///
    /// # Errors
    ///
    /// Returns an error if the transient store fails.
    pub async fn is_held(&self) -> Result<bool> {
        Ok(self.store.get(&self.key).await?.is_some())
    }
}

/// A held lock.
///
/// Call [`LockLease::release`] on every exit path; the TTL is the backstop
/// for holders that crash before releasing, not a substitute for it.
pub struct LockLease {
    store: Arc<dyn TransientStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockLease {
    /// Releases the lock if this lease still owns it.
    ///
    /// If the entry was taken over after TTL expiry, the successor's entry
    /// is left intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the transient store fails.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match self.store.get(&self.key).await? {
            Some(value) if value == self.token => self.store.delete(&self.key).await,
            _ => Ok(()),
        }
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if !self.released {
            // TTL expiry will reclaim the entry.
            tracing::warn!(key = %self.key, "lock lease dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn fixtures() -> (Arc<ManualClock>, Arc<MemoryTransientStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryTransientStore::new(clock.clone()));
        (clock, store)
    }

    #[tokio::test]
    async fn acquire_and_release() {
        let (_clock, store) = fixtures();
        let lock = ProcessLock::new(store, "test.lock");

        let lease = lock
            .try_acquire(Duration::seconds(60))
            .await
            .unwrap()
            .expect("should acquire");
        assert!(lock.is_held().await.unwrap());

        lease.release().await.unwrap();
        assert!(!lock.is_held().await.unwrap());
    }

    #[tokio::test]
    async fn second_acquire_is_refused_while_held() {
        let (_clock, store) = fixtures();
        let lock_a = ProcessLock::new(store.clone(), "test.lock");
        let lock_b = ProcessLock::new(store, "test.lock");

        let lease = lock_a.try_acquire(Duration::seconds(60)).await.unwrap();
        assert!(lease.is_some());

        let refused = lock_b.try_acquire(Duration::seconds(60)).await.unwrap();
        assert!(refused.is_none());

        lease.unwrap().release().await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_can_be_taken_over() {
        let (clock, store) = fixtures();
        let lock_a = ProcessLock::new(store.clone(), "test.lock");
        let lock_b = ProcessLock::new(store.clone(), "test.lock");

        let stale = lock_a
            .try_acquire(Duration::seconds(60))
            .await
            .unwrap()
            .expect("first acquire");

        clock.advance(Duration::seconds(61));

        let lease = lock_b
            .try_acquire(Duration::seconds(60))
            .await
            .unwrap()
            .expect("TTL expiry should allow takeover");

        // The stale holder's release must not evict the successor.
        stale.release().await.unwrap();
        let observer = ProcessLock::new(store, "test.lock");
        assert!(observer.is_held().await.unwrap());

        lease.release().await.unwrap();
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_clock, store) = fixtures();
        store.delete("missing").await.unwrap();
        store.delete("missing").await.unwrap();
    }
}
