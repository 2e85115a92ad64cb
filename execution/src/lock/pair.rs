use super::{KeyGuard, KeyLocks};
use parlor_types::AccountId;

/// Exclusive access to two accounts, taken in ascending key order.
///
/// Dropping the guard releases the higher key first, then the lower one.
#[must_use = "both accounts are unlocked as soon as the guard is dropped"]
#[derive(Debug)]
pub struct PairGuard {
    // Fields drop in declaration order: high, then low.
    high: Option<KeyGuard>,
    low: KeyGuard,
}

impl PairGuard {
    /// Keys held, lowest first. Both entries are equal for a self-pair.
    pub fn keys(&self) -> (AccountId, AccountId) {
        let low = self.low.key();
        (low, self.high.as_ref().map_or(low, KeyGuard::key))
    }

    pub fn release(self) {
        drop(self);
    }
}

fn ordered(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl KeyLocks {
    /// Hold both `a` and `b`. The acquisition order only depends on the keys,
    /// so concurrent `(a, b)` and `(b, a)` callers cannot deadlock.
    pub async fn acquire_pair(&self, a: AccountId, b: AccountId) -> PairGuard {
        let (low, high) = ordered(a, b);
        let low = self.acquire(low).await;
        let high = if high == low.key() {
            None
        } else {
            Some(self.acquire(high).await)
        };
        PairGuard { high, low }
    }

    /// Take both keys without waiting, or neither.
    pub fn try_acquire_pair(&self, a: AccountId, b: AccountId) -> Option<PairGuard> {
        let (low, high) = ordered(a, b);
        let low = self.try_acquire(low)?;
        let high = if high == low.key() {
            None
        } else {
            // On failure `low` is dropped here, so nothing stays held.
            Some(self.try_acquire(high)?)
        };
        Some(PairGuard { high, low })
    }
}
