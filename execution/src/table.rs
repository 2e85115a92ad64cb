//! A chat's sic bo table: rounds wired to account locks and the ledger.
//!
//! Bets are debited before they are placed and refunded if placement is
//! rejected. A refund the ledger keeps refusing is parked as a
//! [PendingCredit] until [Table::take_pending_refunds] collects it.
//! Settlement credits each account in turn, each under its own lock, after
//! the round has been removed from the directory.

use crate::{
    ledger::Ledger,
    lock::KeyLocks,
    session::{BettingSession, SessionDirectory, Settlement},
    Error,
};
use parlor_types::{
    casino::{BetOption, Outcome, FIXED_BET_AMOUNT},
    ledger::Category,
    AccountId, ChatId,
};
use std::{
    collections::BTreeMap,
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableConfig {
    /// Amount debited per bet.
    pub stake: i64,
    /// Attempts per credit before it is handed back as pending.
    pub credit_attempts: u32,
    /// Pause between credit attempts.
    pub credit_backoff: Duration,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            stake: FIXED_BET_AMOUNT,
            credit_attempts: 3,
            credit_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BetReceipt {
    pub option: BetOption,
    /// Accumulated stake on this option.
    pub accumulated: i64,
    /// Balance after the debit.
    pub balance: i64,
}

/// A settlement credit or bet refund that could not be applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCredit {
    pub chat: ChatId,
    pub account: AccountId,
    pub amount: i64,
    pub category: Category,
    pub note: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettleReport {
    pub settlement: Settlement,
    /// New balance of every account that was credited.
    pub credited: BTreeMap<AccountId, i64>,
    pub pending_credits: Vec<PendingCredit>,
}

pub struct Table<L: Ledger> {
    locks: KeyLocks,
    ledger: Arc<L>,
    directory: SessionDirectory,
    config: TableConfig,
    pending_refunds: Mutex<Vec<PendingCredit>>,
}

impl<L: Ledger> Table<L> {
    pub fn new(locks: KeyLocks, ledger: Arc<L>, directory: SessionDirectory) -> Self {
        Self {
            locks,
            ledger,
            directory,
            config: TableConfig::default(),
            pending_refunds: Mutex::default(),
        }
    }

    pub fn with_config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Open a round started by `starter`. A zero window uses the default.
    pub fn open(
        &self,
        chat: ChatId,
        starter: AccountId,
        window: Duration,
    ) -> Result<Arc<BettingSession>, Error> {
        self.directory.open_session(chat, window, Some(starter))
    }

    /// Debit the fixed stake from `account` and bet it on `option`.
    pub async fn bet(
        &self,
        chat: ChatId,
        account: AccountId,
        option: &str,
    ) -> Result<BetReceipt, Error> {
        if !self.directory.is_active(chat) {
            return Err(Error::NoActiveSession(chat));
        }
        let parsed: BetOption = option
            .parse()
            .map_err(|_| Error::InvalidOption(option.to_string()))?;
        let stake = self.config.stake;
        let note = format!("sicbo {parsed} in {chat}");

        let guard = self.locks.acquire(account).await;
        let balance = self.ledger.balance(account).await.map_err(Error::lookup)?;
        if balance < stake {
            return Err(Error::InsufficientBalance {
                account,
                balance,
                required: stake,
            });
        }
        let balance = self
            .ledger
            .adjust(account, -stake, Category::SicBoBet, Some(note))
            .await?;
        drop(guard);

        match self.directory.place_bet(chat, account, option, stake) {
            Ok(accumulated) => Ok(BetReceipt {
                option: parsed,
                accumulated,
                balance,
            }),
            Err(err) => {
                debug!(chat, account, ?err, "bet rejected, refunding");
                let note = format!("sicbo refund in {chat}");
                if let Err(refund) = self
                    .credit(chat, account, stake, Category::SicBoBet, &note)
                    .await
                {
                    warn!(chat, account, stake, ?refund, "refund left pending");
                    self.refunds().push(PendingCredit {
                        chat,
                        account,
                        amount: stake,
                        category: Category::SicBoBet,
                        note,
                        error: refund.to_string(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Drain the refunds of rejected bets that could not be applied yet.
    pub fn take_pending_refunds(&self) -> Vec<PendingCredit> {
        mem::take(&mut *self.refunds())
    }

    fn refunds(&self) -> MutexGuard<'_, Vec<PendingCredit>> {
        self.pending_refunds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn settle(&self, chat: ChatId) -> Result<SettleReport, Error> {
        let settlement = self.directory.settle(chat)?;
        Ok(self.pay(settlement).await)
    }

    /// Settle with predetermined dice.
    pub async fn settle_with(&self, chat: ChatId, outcome: Outcome) -> Result<SettleReport, Error> {
        let settlement = self.directory.settle_with(chat, outcome)?;
        Ok(self.pay(settlement).await)
    }

    /// Settle before the window ends on the starter's request.
    pub async fn settle_early(
        &self,
        chat: ChatId,
        requester: AccountId,
    ) -> Result<SettleReport, Error> {
        let settlement = self.directory.settle_early(chat, requester)?;
        Ok(self.pay(settlement).await)
    }

    /// Settle `session` once its window closes, unless someone settles it
    /// first (then the task yields [Error::NoActiveSession]).
    pub fn auto_settle(
        self: &Arc<Self>,
        session: Arc<BettingSession>,
    ) -> JoinHandle<Result<SettleReport, Error>> {
        let table = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(session.closes()).await;
            let settlement = table.directory.settle_session(&session)?;
            Ok(table.pay(settlement).await)
        })
    }

    /// Credit every winner of `settlement`, one account at a time.
    async fn pay(&self, settlement: Settlement) -> SettleReport {
        let chat = settlement.chat;
        let mut credited = BTreeMap::new();
        let mut pending_credits = Vec::new();

        for (&account, payout) in &settlement.payouts {
            let amount = payout.credit();
            if amount <= 0 {
                continue;
            }
            let note = format!("sicbo win in {chat}");
            match self
                .credit(chat, account, amount, Category::SicBoWin, &note)
                .await
            {
                Ok(balance) => {
                    credited.insert(account, balance);
                }
                Err(err) => {
                    warn!(chat, account, amount, ?err, "credit left pending");
                    pending_credits.push(PendingCredit {
                        chat,
                        account,
                        amount,
                        category: Category::SicBoWin,
                        note,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            chat,
            outcome = %settlement.outcome,
            credited = credited.len(),
            pending = pending_credits.len(),
            "round paid"
        );
        SettleReport {
            settlement,
            credited,
            pending_credits,
        }
    }

    async fn credit(
        &self,
        chat: ChatId,
        account: AccountId,
        amount: i64,
        category: Category,
        note: &str,
    ) -> Result<i64, Error> {
        let attempts = self.config.credit_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = self
                .locks
                .with_lock(account, || {
                    self.ledger
                        .adjust(account, amount, category, Some(note.to_string()))
                })
                .await;
            match result {
                Ok(balance) => return Ok(balance),
                Err(err) if attempt >= attempts => return Err(err.into()),
                Err(err) => {
                    debug!(chat, account, attempt, ?err, "credit failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.config.credit_backoff).await;
                }
            }
        }
    }

    /// Apply a credit left pending by an earlier settlement or refund. Does
    /// not touch the round or any other account.
    pub async fn retry_credit(&self, pending: &PendingCredit) -> Result<i64, Error> {
        self.credit(
            pending.chat,
            pending.account,
            pending.amount,
            pending.category,
            &pending.note,
        )
        .await
    }
}
