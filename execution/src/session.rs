//! Timed multiplayer rounds.
//!
//! A [BettingSession] is Open until its window ends, then Closed (bets are
//! rejected but nothing is paid), then Settled once somebody calls settle. The
//! [SessionDirectory] keeps at most one unsettled session per chat.

use crate::{
    casino::{
        sic_bo::{account_payout, AccountPayout},
        GameRng,
    },
    Error,
};
use parlor_types::{
    casino::{BetOption, Outcome, DEFAULT_BETTING_SECS, MAX_ROUND_STAKE},
    AccountId, ChatId,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, info};

/// Bets of one round: account -> option -> accumulated stake.
pub type Bets = BTreeMap<AccountId, BTreeMap<BetOption, i64>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Open,
    Closed,
    Settled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub players: usize,
    pub total: i64,
    /// Distinct (account, option) pairs.
    pub bets: usize,
}

/// Result of a settled round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub chat: ChatId,
    pub starter: Option<AccountId>,
    pub outcome: Outcome,
    pub payouts: BTreeMap<AccountId, AccountPayout>,
}

impl Settlement {
    /// Net result per account.
    pub fn nets(&self) -> BTreeMap<AccountId, i64> {
        self.payouts
            .iter()
            .map(|(&account, payout)| (account, payout.net))
            .collect()
    }
}

#[derive(Default)]
struct Round {
    bets: Bets,
    outcome: Option<Outcome>,
}

pub struct BettingSession {
    chat: ChatId,
    starter: Option<AccountId>,
    opened: Instant,
    closes: Instant,
    round: Mutex<Round>,
}

impl BettingSession {
    pub fn new(chat: ChatId, window: Duration, starter: Option<AccountId>) -> Self {
        let opened = Instant::now();
        Self {
            chat,
            starter,
            opened,
            closes: opened + window,
            round: Mutex::new(Round::default()),
        }
    }

    fn round(&self) -> MutexGuard<'_, Round> {
        self.round.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }

    pub fn starter(&self) -> Option<AccountId> {
        self.starter
    }

    pub fn opened(&self) -> Instant {
        self.opened
    }

    pub fn closes(&self) -> Instant {
        self.closes
    }

    pub fn phase(&self) -> Phase {
        if self.round().outcome.is_some() {
            Phase::Settled
        } else if Instant::now() >= self.closes {
            Phase::Closed
        } else {
            Phase::Open
        }
    }

    pub fn is_settled(&self) -> bool {
        self.round().outcome.is_some()
    }

    /// Time left in the betting window (zero once closed or settled).
    pub fn time_remaining(&self) -> Duration {
        if self.is_settled() {
            return Duration::ZERO;
        }
        self.closes.saturating_duration_since(Instant::now())
    }

    /// Add `stake` on `option` for `account`, returning the accumulated stake
    /// for that pair.
    pub fn place_bet(
        &self,
        account: AccountId,
        option: BetOption,
        stake: i64,
    ) -> Result<i64, Error> {
        let mut round = self.round();
        if round.outcome.is_some() {
            return Err(Error::NoActiveSession(self.chat));
        }
        if Instant::now() >= self.closes {
            return Err(Error::BettingClosed(self.chat));
        }
        if stake <= 0 {
            return Err(Error::InvalidStake(stake));
        }
        let placed = round.bets.get(&account);
        let staked: i64 = placed.map_or(0, |options| options.values().sum());
        if staked
            .checked_add(stake)
            .map_or(true, |total| total > MAX_ROUND_STAKE)
        {
            return Err(Error::InvalidStake(stake));
        }
        let accumulated = placed
            .and_then(|options| options.get(&option))
            .copied()
            .unwrap_or(0)
            + stake;
        round
            .bets
            .entry(account)
            .or_default()
            .insert(option, accumulated);
        Ok(accumulated)
    }

    pub fn stats(&self) -> SessionStats {
        let round = self.round();
        round
            .bets
            .values()
            .fold(SessionStats::default(), |mut stats, options| {
                stats.players += 1;
                stats.bets += options.len();
                stats.total = options
                    .values()
                    .fold(stats.total, |total, stake| total.saturating_add(*stake));
                stats
            })
    }

    pub fn bets(&self) -> Bets {
        self.round().bets.clone()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.round().outcome
    }

    /// Settle with an outcome drawn by `draw`, which runs at most once and
    /// only if the session has not been settled yet.
    pub fn settle(&self, draw: impl FnOnce() -> Outcome) -> Result<Settlement, Error> {
        let mut round = self.round();
        if round.outcome.is_some() {
            return Err(Error::SessionAlreadySettled(self.chat));
        }
        let outcome = draw();
        let payouts = round
            .bets
            .iter()
            .map(|(&account, options)| (account, account_payout(options, &outcome)))
            .collect();
        round.outcome = Some(outcome);
        Ok(Settlement {
            chat: self.chat,
            starter: self.starter,
            outcome,
            payouts,
        })
    }

    pub fn settle_with(&self, outcome: Outcome) -> Result<Settlement, Error> {
        self.settle(|| outcome)
    }
}

/// Chat-keyed registry of running rounds.
///
/// Cheap to clone; clones share the same sessions.
#[derive(Clone)]
pub struct SessionDirectory {
    sessions: Arc<Mutex<HashMap<ChatId, Arc<BettingSession>>>>,
    rng: Arc<Mutex<GameRng>>,
    default_window: Duration,
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new(GameRng::from_entropy())
    }
}

impl SessionDirectory {
    pub fn new(rng: GameRng) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            rng: Arc::new(Mutex::new(rng)),
            default_window: Duration::from_secs(DEFAULT_BETTING_SECS),
        }
    }

    /// Window used when a session is opened with a zero duration.
    pub fn with_default_window(mut self, window: Duration) -> Self {
        self.default_window = window;
        self
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ChatId, Arc<BettingSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The unsettled session registered for `chat`, if any.
    pub fn get(&self, chat: ChatId) -> Option<Arc<BettingSession>> {
        self.sessions()
            .get(&chat)
            .filter(|session| !session.is_settled())
            .cloned()
    }

    pub fn open_session(
        &self,
        chat: ChatId,
        window: Duration,
        starter: Option<AccountId>,
    ) -> Result<Arc<BettingSession>, Error> {
        let window = if window.is_zero() {
            self.default_window
        } else {
            window
        };

        let mut sessions = self.sessions();
        if sessions.get(&chat).is_some_and(|s| !s.is_settled()) {
            return Err(Error::SessionExists(chat));
        }
        let session = Arc::new(BettingSession::new(chat, window, starter));
        sessions.insert(chat, session.clone());
        drop(sessions);

        info!(chat, ?starter, ?window, "round opened");
        Ok(session)
    }

    /// Place a bet given its option key (`big`, `small`, `single:N`, ...).
    pub fn place_bet(
        &self,
        chat: ChatId,
        account: AccountId,
        option: &str,
        stake: i64,
    ) -> Result<i64, Error> {
        let session = self.get(chat).ok_or(Error::NoActiveSession(chat))?;
        if session.phase() == Phase::Closed {
            return Err(Error::BettingClosed(chat));
        }
        let option: BetOption = option
            .parse()
            .map_err(|_| Error::InvalidOption(option.to_string()))?;
        let accumulated = session.place_bet(account, option, stake)?;
        debug!(chat, account, %option, stake, accumulated, "bet placed");
        Ok(accumulated)
    }

    fn roll(&self) -> Outcome {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .roll()
    }

    /// Settle the round in `chat` with freshly rolled dice.
    pub fn settle(&self, chat: ChatId) -> Result<Settlement, Error> {
        let session = self.get(chat).ok_or(Error::NoActiveSession(chat))?;
        self.finish(session, || self.roll())
    }

    /// Settle the round in `chat` with a predetermined outcome.
    pub fn settle_with(&self, chat: ChatId, outcome: Outcome) -> Result<Settlement, Error> {
        let session = self.get(chat).ok_or(Error::NoActiveSession(chat))?;
        self.finish(session, || outcome)
    }

    /// Settle exactly `session`, which must not have been settled yet. Used by
    /// timers that must not touch a newer round in the same chat.
    pub fn settle_session(&self, session: &Arc<BettingSession>) -> Result<Settlement, Error> {
        self.finish(session.clone(), || self.roll())
    }

    /// Settle before the window ends. Only the starter may do this.
    pub fn settle_early(&self, chat: ChatId, requester: AccountId) -> Result<Settlement, Error> {
        let session = self.get(chat).ok_or(Error::NoActiveSession(chat))?;
        if session.starter() != Some(requester) {
            return Err(Error::NotStarter { chat, requester });
        }
        self.finish(session, || self.roll())
    }

    fn finish(
        &self,
        session: Arc<BettingSession>,
        draw: impl FnOnce() -> Outcome,
    ) -> Result<Settlement, Error> {
        let chat = session.chat();
        let settlement = session.settle(draw).map_err(|err| match err {
            // Lost the race to a concurrent settle.
            Error::SessionAlreadySettled(chat) => Error::NoActiveSession(chat),
            other => other,
        })?;

        // Deregister unless a new round already took the slot.
        let mut sessions = self.sessions();
        if sessions
            .get(&chat)
            .is_some_and(|current| Arc::ptr_eq(current, &session))
        {
            sessions.remove(&chat);
        }
        drop(sessions);

        info!(
            chat,
            outcome = %settlement.outcome,
            players = settlement.payouts.len(),
            "round settled"
        );
        Ok(settlement)
    }

    pub fn is_active(&self, chat: ChatId) -> bool {
        self.get(chat).is_some()
    }

    pub fn time_remaining(&self, chat: ChatId) -> Duration {
        self.get(chat)
            .map_or(Duration::ZERO, |session| session.time_remaining())
    }

    pub fn stats(&self, chat: ChatId) -> SessionStats {
        self.get(chat).map(|session| session.stats()).unwrap_or_default()
    }

    pub fn bets(&self, chat: ChatId) -> Result<Bets, Error> {
        self.get(chat)
            .map(|session| session.bets())
            .ok_or(Error::NoActiveSession(chat))
    }

    pub fn starter(&self, chat: ChatId) -> Option<AccountId> {
        self.get(chat).and_then(|session| session.starter())
    }

    /// Chats with a running round.
    pub fn active(&self) -> Vec<ChatId> {
        let mut chats: Vec<_> = self
            .sessions()
            .iter()
            .filter(|(_, session)| !session.is_settled())
            .map(|(&chat, _)| chat)
            .collect();
        chats.sort_unstable();
        chats
    }
}
