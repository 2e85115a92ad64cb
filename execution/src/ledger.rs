//! Balance store boundary.
//!
//! Callers must hold the account's [crate::KeyLocks] guard across every
//! read-modify-write; the ledger itself only makes single calls atomic.

use parlor_types::{
    ledger::{Category, Entry},
    AccountId,
};
use std::{
    collections::HashMap,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {0} not found")]
    NotFound(AccountId),
    #[error("adjusting account {account} by {delta} would overdraw balance {balance}")]
    Overdraft {
        account: AccountId,
        balance: i64,
        delta: i64,
    },
    #[error("adjusting account {account} by {delta} would overflow balance {balance}")]
    Overflow {
        account: AccountId,
        balance: i64,
        delta: i64,
    },
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

pub trait Ledger: Send + Sync + 'static {
    fn balance(&self, account: AccountId) -> impl Future<Output = Result<i64, LedgerError>> + Send;

    /// Apply `delta` and record it under `category`, returning the new balance.
    fn adjust(
        &self,
        account: AccountId,
        delta: i64,
        category: Category,
        note: Option<String>,
    ) -> impl Future<Output = Result<i64, LedgerError>> + Send;

    fn exists(&self, account: AccountId) -> impl Future<Output = bool> + Send;
}

#[derive(Default)]
struct Book {
    balances: HashMap<AccountId, i64>,
    entries: Vec<Entry>,
}

impl Book {
    fn record(
        &mut self,
        account: AccountId,
        amount: i64,
        category: Category,
        note: Option<String>,
        balance: i64,
    ) {
        let sequence = self.entries.len() as u64;
        self.entries.push(Entry {
            sequence,
            account,
            amount,
            category,
            note,
            balance,
        });
    }
}

/// In-memory ledger with a full transaction history.
#[derive(Default)]
pub struct Memory {
    book: Mutex<Book>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open (or reset) an account with an initial grant.
    pub fn create(&self, account: AccountId, initial: i64) {
        let mut book = self.book();
        book.balances.insert(account, initial);
        book.record(account, initial, Category::Initial, None, initial);
    }

    /// Every entry recorded for `account`, oldest first.
    pub fn history(&self, account: AccountId) -> Vec<Entry> {
        self.book()
            .entries
            .iter()
            .filter(|entry| entry.account == account)
            .cloned()
            .collect()
    }

    /// Sum of all balances.
    pub fn total(&self) -> i64 {
        self.book()
            .balances
            .values()
            .fold(0i64, |total, balance| total.saturating_add(*balance))
    }

    pub fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<_> = self.book().balances.keys().copied().collect();
        accounts.sort_unstable();
        accounts
    }
}

impl Ledger for Memory {
    async fn balance(&self, account: AccountId) -> Result<i64, LedgerError> {
        self.book()
            .balances
            .get(&account)
            .copied()
            .ok_or(LedgerError::NotFound(account))
    }

    async fn adjust(
        &self,
        account: AccountId,
        delta: i64,
        category: Category,
        note: Option<String>,
    ) -> Result<i64, LedgerError> {
        let mut book = self.book();
        let balance = *book
            .balances
            .get(&account)
            .ok_or(LedgerError::NotFound(account))?;
        let updated = balance.checked_add(delta).ok_or(LedgerError::Overflow {
            account,
            balance,
            delta,
        })?;
        if updated < 0 {
            return Err(LedgerError::Overdraft {
                account,
                balance,
                delta,
            });
        }
        book.balances.insert(account, updated);
        book.record(account, delta, category, note, updated);
        debug!(account, delta, %category, balance = updated, "balance adjusted");
        Ok(updated)
    }

    async fn exists(&self, account: AccountId) -> bool {
        self.book().balances.contains_key(&account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_adjust_records_history() {
        let ledger = Memory::new();
        ledger.create(1, 500);

        assert_eq!(
            ledger
                .adjust(1, -200, Category::SicBoBet, Some("big".into()))
                .await,
            Ok(300)
        );
        assert_eq!(ledger.adjust(1, 400, Category::SicBoWin, None).await, Ok(700));
        assert_eq!(ledger.balance(1).await, Ok(700));

        let history = ledger.history(1);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].category, Category::Initial);
        assert_eq!(history[1].amount, -200);
        assert_eq!(history[1].note.as_deref(), Some("big"));
        assert_eq!(history[2].balance, 700);
        assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let ledger = Memory::new();
        assert!(!ledger.exists(9).await);
        assert_eq!(ledger.balance(9).await, Err(LedgerError::NotFound(9)));
        assert_eq!(
            ledger.adjust(9, 10, Category::AdminAdd, None).await,
            Err(LedgerError::NotFound(9))
        );
    }

    #[tokio::test]
    async fn test_overdraft_rejected_without_change() {
        let ledger = Memory::new();
        ledger.create(2, 100);
        assert_eq!(
            ledger.adjust(2, -101, Category::Transfer, None).await,
            Err(LedgerError::Overdraft {
                account: 2,
                balance: 100,
                delta: -101
            })
        );
        assert_eq!(ledger.balance(2).await, Ok(100));
        assert_eq!(ledger.history(2).len(), 1);
    }

    #[tokio::test]
    async fn test_overflow_rejected_without_change() {
        let ledger = Memory::new();
        ledger.create(3, i64::MAX - 5);
        assert_eq!(
            ledger.adjust(3, 6, Category::SicBoWin, None).await,
            Err(LedgerError::Overflow {
                account: 3,
                balance: i64::MAX - 5,
                delta: 6
            })
        );
        assert_eq!(ledger.balance(3).await, Ok(i64::MAX - 5));
        assert_eq!(ledger.history(3).len(), 1);
        assert_eq!(ledger.adjust(3, 5, Category::SicBoWin, None).await, Ok(i64::MAX));
    }
}
