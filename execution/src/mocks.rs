//! Test doubles for the ledger boundary.

use crate::ledger::{Ledger, LedgerError, Memory};
use parlor_types::{ledger::Category, AccountId};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

/// Creates an in-memory ledger with the given opening balances.
pub fn create_ledger(balances: &[(AccountId, i64)]) -> Arc<Memory> {
    let ledger = Arc::new(Memory::new());
    for &(account, balance) in balances {
        ledger.create(account, balance);
    }
    ledger
}

/// Ledger whose credits to chosen accounts fail a set number of times.
///
/// Only positive adjustments are affected, so debits always go through and
/// the failures model a store that drops writes during settlement.
#[derive(Default)]
pub struct FlakyLedger {
    pub inner: Memory,
    failures: Mutex<HashMap<AccountId, u32>>,
}

impl FlakyLedger {
    pub fn new(inner: Memory) -> Self {
        Self {
            inner,
            failures: Mutex::default(),
        }
    }

    /// Fail the next `times` credits to `account`.
    pub fn fail_credits(&self, account: AccountId, times: u32) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account, times);
    }

    fn should_fail(&self, account: AccountId) -> bool {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        match failures.get_mut(&account) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl Ledger for FlakyLedger {
    async fn balance(&self, account: AccountId) -> Result<i64, LedgerError> {
        self.inner.balance(account).await
    }

    async fn adjust(
        &self,
        account: AccountId,
        delta: i64,
        category: Category,
        note: Option<String>,
    ) -> Result<i64, LedgerError> {
        if delta > 0 && self.should_fail(account) {
            return Err(LedgerError::Unavailable(format!(
                "credit to {account} dropped"
            )));
        }
        self.inner.adjust(account, delta, category, note).await
    }

    async fn exists(&self, account: AccountId) -> bool {
        self.inner.exists(account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_ledger_fails_then_recovers() {
        let ledger = FlakyLedger::new(Memory::new());
        ledger.inner.create(1, 100);
        ledger.fail_credits(1, 2);

        assert_eq!(ledger.adjust(1, -10, Category::SicBoBet, None).await, Ok(90));
        for _ in 0..2 {
            assert!(matches!(
                ledger.adjust(1, 10, Category::SicBoWin, None).await,
                Err(LedgerError::Unavailable(_))
            ));
        }
        assert_eq!(ledger.adjust(1, 10, Category::SicBoWin, None).await, Ok(100));
    }
}
