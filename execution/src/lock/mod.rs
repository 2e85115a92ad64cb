//! Per-account exclusive access.
//!
//! Every balance-affecting operation on an account runs while holding that
//! account's [KeyGuard]. Entries are created lazily, reference counted (holders
//! and waiters), and parked on a bounded free list once nothing refers to
//! them, so account churn does not grow the map without bound.

mod pair;

pub use pair::PairGuard;

use crate::Error;
use parlor_types::AccountId;
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Maximum number of idle entries kept for reuse.
const DEFAULT_POOL_CAPACITY: usize = 1_024;

struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    refs: usize,
}

struct Slots {
    active: HashMap<AccountId, Slot>,
    free: Vec<Arc<AsyncMutex<()>>>,
    capacity: usize,
}

struct Pool {
    slots: Mutex<Slots>,
}

impl Pool {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        // Critical sections never await and never panic mid-update, so a
        // poisoned map is still consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A counted reference to a key's entry. Dropping it gives the reference back
/// and recycles the entry when it was the last one.
struct Lease {
    key: AccountId,
    pool: Arc<Pool>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut slots = self.pool.slots();
        let Some(slot) = slots.active.get_mut(&self.key) else {
            panic!("lease for account {} outlived its entry", self.key);
        };
        assert!(slot.refs > 0, "unbalanced release on account {}", self.key);
        slot.refs -= 1;
        if slot.refs > 0 {
            return;
        }
        let Some(slot) = slots.active.remove(&self.key) else {
            return;
        };

        // Only recycle when no guard or pending lock future still points at it.
        if Arc::strong_count(&slot.mutex) == 1 && slots.free.len() < slots.capacity {
            slots.free.push(slot.mutex);
        }
    }
}

/// Exclusive access to one account. Released on drop.
#[must_use = "the account is unlocked as soon as the guard is dropped"]
pub struct KeyGuard {
    // Field order matters: the permit is released before the lease is returned.
    permit: OwnedMutexGuard<()>,
    lease: Lease,
}

impl KeyGuard {
    pub fn key(&self) -> AccountId {
        self.lease.key
    }

    /// Release explicitly (equivalent to dropping the guard).
    pub fn release(self) {
        drop(self);
    }
}

impl std::fmt::Debug for KeyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyGuard").field("key", &self.key()).finish()
    }
}

/// Registry of per-account locks.
///
/// Cloning is cheap and every clone shares the same entries; construct one per
/// process (or per test) and hand clones to whoever mutates balances.
#[derive(Clone)]
pub struct KeyLocks {
    pool: Arc<Pool>,
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    /// Create a registry that keeps at most `capacity` idle entries for reuse.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: Arc::new(Pool {
                slots: Mutex::new(Slots {
                    active: HashMap::new(),
                    free: Vec::new(),
                    capacity,
                }),
            }),
        }
    }

    /// Take a reference on `key`'s entry, creating (or recycling) it if needed.
    fn checkout(&self, key: AccountId) -> (Lease, Arc<AsyncMutex<()>>) {
        let mut slots = self.pool.slots();
        let mutex = match slots.active.get_mut(&key) {
            Some(slot) => {
                slot.refs += 1;
                slot.mutex.clone()
            }
            None => {
                let mutex = slots
                    .free
                    .pop()
                    .unwrap_or_else(|| Arc::new(AsyncMutex::new(())));
                slots.active.insert(
                    key,
                    Slot {
                        mutex: mutex.clone(),
                        refs: 1,
                    },
                );
                mutex
            }
        };
        drop(slots);
        (
            Lease {
                key,
                pool: self.pool.clone(),
            },
            mutex,
        )
    }

    /// Wait until the caller holds `key` exclusively.
    pub async fn acquire(&self, key: AccountId) -> KeyGuard {
        let (lease, mutex) = self.checkout(key);
        let permit = mutex.lock_owned().await;
        KeyGuard { permit, lease }
    }

    /// Take `key` only if nobody holds it right now.
    pub fn try_acquire(&self, key: AccountId) -> Option<KeyGuard> {
        let (lease, mutex) = self.checkout(key);
        let permit = mutex.try_lock_owned().ok()?;
        Some(KeyGuard { permit, lease })
    }

    /// Wait at most `timeout` for `key`.
    ///
    /// On timeout the pending acquisition is dropped with the timer, so the
    /// key is left exactly as it would be had this call never happened.
    pub async fn acquire_timeout(&self, key: AccountId, timeout: Duration) -> Option<KeyGuard> {
        let (lease, mutex) = self.checkout(key);
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(permit) => Some(KeyGuard { permit, lease }),
            Err(_) => {
                debug!(account = key, ?timeout, "lock acquisition timed out");
                None
            }
        }
    }

    /// Run `f` while holding `key`. The lock is released on every exit path,
    /// including `f` returning an error or panicking.
    pub async fn with_lock<F, Fut, T>(&self, key: AccountId, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        f().await
    }

    /// Like [KeyLocks::with_lock], but gives up with [Error::LockTimeout].
    pub async fn with_lock_timeout<F, Fut, T>(
        &self,
        key: AccountId,
        timeout: Duration,
        f: F,
    ) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(_guard) = self.acquire_timeout(key, timeout).await else {
            return Err(Error::LockTimeout(key));
        };
        Ok(f().await)
    }

    /// Point-in-time check; may be stale as soon as it returns.
    pub fn is_locked(&self, key: AccountId) -> bool {
        let slots = self.pool.slots();
        slots
            .active
            .get(&key)
            .is_some_and(|slot| slot.mutex.try_lock().is_err())
    }

    /// Number of keys currently held or awaited.
    pub fn tracked(&self) -> usize {
        self.pool.slots().active.len()
    }

    /// Number of idle entries parked for reuse.
    pub fn pooled(&self) -> usize {
        self.pool.slots().free.len()
    }

    #[cfg(test)]
    fn references(&self, key: AccountId) -> usize {
        self.pool
            .slots()
            .active
            .get(&key)
            .map_or(0, |slot| slot.refs)
    }
}
