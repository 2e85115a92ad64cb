//! Concurrency core of parlor.
//!
//! [lock::KeyLocks] serialises every balance mutation on an account (and, via
//! [lock::PairGuard], every two-account operation). [session::SessionDirectory]
//! runs timed multiplayer sic bo rounds whose settlement happens exactly once.
//! [table::Table], [pending::Requests] and [versus] wire those primitives to a
//! [ledger::Ledger] the way the chat handlers use them.

pub mod casino;
pub mod ledger;
pub mod lock;
pub mod pending;
pub mod session;
pub mod table;
pub mod versus;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

use parlor_types::{AccountId, ChatId};
use thiserror::Error;

pub use ledger::{Ledger, LedgerError, Memory};
pub use lock::{KeyGuard, KeyLocks, PairGuard};
pub use pending::{Handle, Request, Requests};
pub use session::{BettingSession, SessionDirectory, Settlement};
pub use table::{PendingCredit, SettleReport, Table, TableConfig};
pub use versus::{RobRules, Versus};

/// Expected, recoverable rejections. None of them change any state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("lock on account {0} not acquired in time")]
    LockTimeout(AccountId),
    #[error("a round is already running in chat {0}")]
    SessionExists(ChatId),
    #[error("no active round in chat {0}")]
    NoActiveSession(ChatId),
    #[error("betting has closed in chat {0}")]
    BettingClosed(ChatId),
    #[error("invalid bet option: {0}")]
    InvalidOption(String),
    #[error("stake must be positive and within the round limit (got {0})")]
    InvalidStake(i64),
    #[error("round in chat {0} is already settled")]
    SessionAlreadySettled(ChatId),
    #[error("only the starter of the round in chat {chat} may settle early")]
    NotStarter { chat: ChatId, requester: AccountId },
    #[error("a request involving account {0} is already pending")]
    RequestPending(AccountId),
    #[error("no pending request for account {0}")]
    RequestNotFound(AccountId),
    #[error("the request for account {0} has expired")]
    RequestExpired(AccountId),
    #[error("account {resolver} cannot resolve a request addressed to {target}")]
    RequestNotYours {
        target: AccountId,
        resolver: AccountId,
    },
    #[error("account {0} cannot target itself")]
    SelfTarget(AccountId),
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("account {0} is busy with another operation")]
    AccountBusy(AccountId),
    #[error("account {account} holds {balance}, needs {required}")]
    InsufficientBalance {
        account: AccountId,
        balance: i64,
        required: i64,
    },
    #[error("account {account} is cooling down for {remaining_secs}s")]
    Cooldown {
        account: AccountId,
        remaining_secs: u64,
    },
    #[error("account {account} is protected for {remaining_secs}s")]
    Protected {
        account: AccountId,
        remaining_secs: u64,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl Error {
    /// Like the `From` conversion, but reports a missing account as
    /// [Error::AccountNotFound].
    pub(crate) fn lookup(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(account) => Error::AccountNotFound(account),
            other => Error::Ledger(other),
        }
    }
}
