//! Operations touching two accounts: transfers, robberies and duels.
//!
//! Every balance read and write happens while holding the [PairGuard] of both
//! accounts, taken through [KeyLocks::acquire_pair] (or its non-blocking
//! variant for all-in robberies).

use crate::{
    casino::GameRng,
    ledger::Ledger,
    lock::{KeyLocks, PairGuard},
    pending::{Handle, Request, Requests},
    Error,
};
use parlor_types::{
    casino::{
        ALL_IN_ROB_COOLDOWN_SECS, ALL_IN_SUCCESS_CHANCE, MAX_ROB_AMOUNT, MIN_ALL_IN_BALANCE,
        MIN_ROB_AMOUNT, ROB_COOLDOWN_SECS, ROB_FAIL_CHANCE, ROB_PROTECTION_MINS,
        ROB_PROTECTION_THRESHOLD, ROB_SUCCESS_CHANCE,
    },
    ledger::Category,
    AccountId,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{info, warn};

/// Tunables for robberies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RobRules {
    pub cooldown: Duration,
    pub all_in_cooldown: Duration,
    pub min_amount: i64,
    pub max_amount: i64,
    pub protection_threshold: u32,
    pub protection: Duration,
}

impl Default for RobRules {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(ROB_COOLDOWN_SECS),
            all_in_cooldown: Duration::from_secs(ALL_IN_ROB_COOLDOWN_SECS),
            min_amount: MIN_ROB_AMOUNT,
            max_amount: MAX_ROB_AMOUNT,
            protection_threshold: ROB_PROTECTION_THRESHOLD,
            protection: Duration::from_secs(ROB_PROTECTION_MINS * 60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RobOutcome {
    /// Victim pays the robber.
    Success,
    /// Nothing moves.
    Fail,
    /// Robber pays the victim.
    CounterAttack,
}

impl RobOutcome {
    /// Map a percentile roll (0..100) to an outcome.
    pub fn from_roll(roll: u8) -> Self {
        if roll < ROB_SUCCESS_CHANCE {
            RobOutcome::Success
        } else if roll < ROB_SUCCESS_CHANCE + ROB_FAIL_CHANCE {
            RobOutcome::Fail
        } else {
            RobOutcome::CounterAttack
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RobReport {
    pub outcome: RobOutcome,
    pub amount: i64,
    pub robber_balance: i64,
    pub victim_balance: i64,
    /// The victim just became protected.
    pub protection_granted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllInReport {
    pub won: bool,
    pub amount: i64,
    pub robber_balance: i64,
    pub victim_balance: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferReport {
    pub from_balance: i64,
    pub to_balance: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DuelReport {
    pub winner: AccountId,
    pub loser: AccountId,
    pub amount: i64,
    pub winner_balance: i64,
    pub loser_balance: i64,
}

#[derive(Default)]
struct Protection {
    streak: u32,
    until: Option<Instant>,
}

#[derive(Default)]
struct Robbery {
    last_rob: HashMap<AccountId, Instant>,
    last_all_in: HashMap<AccountId, Instant>,
    protection: HashMap<AccountId, Protection>,
}

fn secs_ceil(remaining: Duration) -> u64 {
    remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
}

/// Remaining cooldown, if `last` is within `cooldown` of `now`.
fn cooling(last: Option<&Instant>, cooldown: Duration, now: Instant) -> Option<Duration> {
    let elapsed = now.saturating_duration_since(*last?);
    (elapsed < cooldown).then(|| cooldown - elapsed)
}

pub struct Versus<L: Ledger> {
    locks: KeyLocks,
    ledger: Arc<L>,
    requests: Requests,
    rules: RobRules,
    rng: Mutex<GameRng>,
    robbery: Mutex<Robbery>,
}

impl<L: Ledger> Versus<L> {
    pub fn new(locks: KeyLocks, ledger: Arc<L>, requests: Requests, rng: GameRng) -> Self {
        Self {
            locks,
            ledger,
            requests,
            rules: RobRules::default(),
            rng: Mutex::new(rng),
            robbery: Mutex::new(Robbery::default()),
        }
    }

    pub fn with_rules(mut self, rules: RobRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn requests(&self) -> &Requests {
        &self.requests
    }

    pub fn rules(&self) -> &RobRules {
        &self.rules
    }

    fn rng(&self) -> MutexGuard<'_, GameRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn robbery(&self) -> MutexGuard<'_, Robbery> {
        self.robbery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn balance(&self, account: AccountId) -> Result<i64, Error> {
        self.ledger.balance(account).await.map_err(Error::lookup)
    }

    /// Move `amount` from `from` to `to`. Both accounts must be held by the
    /// caller's `_pair`. If the credit fails the debit is reversed.
    async fn shift(
        &self,
        _pair: &PairGuard,
        from: AccountId,
        to: AccountId,
        amount: i64,
        categories: (Category, Category),
        note: &str,
    ) -> Result<(i64, i64), Error> {
        let (debit, credit) = categories;
        let from_balance = self
            .ledger
            .adjust(from, -amount, debit, Some(note.to_string()))
            .await?;
        match self
            .ledger
            .adjust(to, amount, credit, Some(note.to_string()))
            .await
        {
            Ok(to_balance) => Ok((from_balance, to_balance)),
            Err(err) => {
                warn!(from, to, amount, ?err, "credit failed, reversing debit");
                self.ledger
                    .adjust(from, amount, debit, Some(format!("reversal: {note}")))
                    .await?;
                Err(err.into())
            }
        }
    }

    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> Result<TransferReport, Error> {
        if amount <= 0 {
            return Err(Error::InvalidStake(amount));
        }
        if from == to {
            return Err(Error::SelfTarget(from));
        }
        if !self.ledger.exists(to).await {
            return Err(Error::AccountNotFound(to));
        }

        let pair = self.locks.acquire_pair(from, to).await;
        let balance = self.balance(from).await?;
        if balance < amount {
            return Err(Error::InsufficientBalance {
                account: from,
                balance,
                required: amount,
            });
        }
        let (from_balance, to_balance) = self
            .shift(
                &pair,
                from,
                to,
                amount,
                (Category::Transfer, Category::Transfer),
                &format!("transfer {from} -> {to}"),
            )
            .await?;
        info!(from, to, amount, "transfer complete");
        Ok(TransferReport {
            from_balance,
            to_balance,
        })
    }

    /// Attempt a robbery with a random outcome and amount.
    pub async fn rob(&self, robber: AccountId, victim: AccountId) -> Result<RobReport, Error> {
        let (roll, amount) = {
            let mut rng = self.rng();
            let roll = rng.percent();
            (roll, rng.amount(self.rules.min_amount, self.rules.max_amount))
        };
        self.rob_with(robber, victim, RobOutcome::from_roll(roll), amount)
            .await
    }

    /// Attempt a robbery with a predetermined outcome and uncapped amount.
    pub async fn rob_with(
        &self,
        robber: AccountId,
        victim: AccountId,
        outcome: RobOutcome,
        amount: i64,
    ) -> Result<RobReport, Error> {
        if robber == victim {
            return Err(Error::SelfTarget(robber));
        }
        if !self.ledger.exists(victim).await {
            return Err(Error::AccountNotFound(victim));
        }

        let pair = self.locks.acquire_pair(robber, victim).await;
        let robber_balance = self.balance(robber).await?;
        let victim_balance = self.balance(victim).await?;
        let now = Instant::now();
        {
            let mut robbery = self.robbery();
            if let Some(remaining) = cooling(robbery.last_rob.get(&robber), self.rules.cooldown, now)
            {
                return Err(Error::Cooldown {
                    account: robber,
                    remaining_secs: secs_ceil(remaining),
                });
            }
            if let Some(until) = robbery.protection.get(&victim).and_then(|p| p.until) {
                if now < until {
                    return Err(Error::Protected {
                        account: victim,
                        remaining_secs: secs_ceil(until - now),
                    });
                }
            }
            robbery.last_rob.insert(robber, now);
        }

        let unchanged = RobReport {
            outcome,
            amount: 0,
            robber_balance,
            victim_balance,
            protection_granted: false,
        };

        match outcome {
            RobOutcome::Fail => Ok(unchanged),
            RobOutcome::CounterAttack => {
                let amount = amount.min(robber_balance);
                if amount <= 0 {
                    return Ok(unchanged);
                }
                let (robber_balance, victim_balance) = self
                    .shift(
                        &pair,
                        robber,
                        victim,
                        amount,
                        (Category::CounterAttack, Category::Rob),
                        &format!("counterattack on {robber} by {victim}"),
                    )
                    .await?;
                info!(robber, victim, amount, "robbery countered");
                Ok(RobReport {
                    outcome,
                    amount,
                    robber_balance,
                    victim_balance,
                    protection_granted: false,
                })
            }
            RobOutcome::Success => {
                let amount = amount.min(victim_balance);
                if amount <= 0 {
                    return Ok(RobReport {
                        outcome: RobOutcome::Fail,
                        ..unchanged
                    });
                }
                let (victim_balance, robber_balance) = self
                    .shift(
                        &pair,
                        victim,
                        robber,
                        amount,
                        (Category::Robbed, Category::Rob),
                        &format!("{robber} robbed {victim}"),
                    )
                    .await?;
                let protection_granted = self.record_robbery(victim, Instant::now());
                info!(robber, victim, amount, protection_granted, "robbery succeeded");
                Ok(RobReport {
                    outcome,
                    amount,
                    robber_balance,
                    victim_balance,
                    protection_granted,
                })
            }
        }
    }

    /// Count a successful robbery of `victim`; returns whether it triggered
    /// protection.
    fn record_robbery(&self, victim: AccountId, now: Instant) -> bool {
        let mut robbery = self.robbery();
        let state = robbery.protection.entry(victim).or_default();
        if state.until.is_some_and(|until| now >= until) {
            state.until = None;
        }
        state.streak += 1;
        if state.streak < self.rules.protection_threshold {
            return false;
        }
        state.streak = 0;
        state.until = Some(now + self.rules.protection);
        true
    }

    /// Remaining protection of `account`, if any.
    pub fn protection(&self, account: AccountId) -> Option<Duration> {
        let now = Instant::now();
        let until = self.robbery().protection.get(&account)?.until?;
        (now < until).then(|| until - now)
    }

    /// Remaining robbery cooldown of `account`, if any.
    pub fn cooldown(&self, account: AccountId) -> Option<Duration> {
        cooling(
            self.robbery().last_rob.get(&account),
            self.rules.cooldown,
            Instant::now(),
        )
    }

    /// Bet everything against a victim with a random result.
    pub async fn all_in_rob(
        &self,
        robber: AccountId,
        victim: AccountId,
    ) -> Result<AllInReport, Error> {
        let won = self.rng().percent() < ALL_IN_SUCCESS_CHANCE;
        self.all_in_rob_with(robber, victim, won).await
    }

    /// All-in robbery with a predetermined result. Fails with
    /// [Error::AccountBusy] instead of waiting if either account is locked.
    pub async fn all_in_rob_with(
        &self,
        robber: AccountId,
        victim: AccountId,
        won: bool,
    ) -> Result<AllInReport, Error> {
        if robber == victim {
            return Err(Error::SelfTarget(robber));
        }
        if !self.ledger.exists(victim).await {
            return Err(Error::AccountNotFound(victim));
        }
        let now = Instant::now();
        if let Some(remaining) = cooling(
            self.robbery().last_all_in.get(&robber),
            self.rules.all_in_cooldown,
            now,
        ) {
            return Err(Error::Cooldown {
                account: robber,
                remaining_secs: secs_ceil(remaining),
            });
        }

        let pair = self
            .locks
            .try_acquire_pair(robber, victim)
            .ok_or(Error::AccountBusy(victim))?;
        let robber_balance = self.balance(robber).await?;
        let victim_balance = self.balance(victim).await?;
        if robber_balance < MIN_ALL_IN_BALANCE {
            return Err(Error::InsufficientBalance {
                account: robber,
                balance: robber_balance,
                required: MIN_ALL_IN_BALANCE,
            });
        }
        self.robbery().last_all_in.insert(robber, now);

        let (from, to, amount) = if won {
            (victim, robber, robber_balance.min(victim_balance))
        } else {
            (robber, victim, robber_balance)
        };
        if amount == 0 {
            return Ok(AllInReport {
                won,
                amount,
                robber_balance,
                victim_balance,
            });
        }
        let (from_balance, to_balance) = self
            .shift(
                &pair,
                from,
                to,
                amount,
                (Category::AllInRobLose, Category::AllInRobWin),
                &format!("all-in robbery of {victim} by {robber}"),
            )
            .await?;
        let (robber_balance, victim_balance) = if won {
            (to_balance, from_balance)
        } else {
            (from_balance, to_balance)
        };
        info!(robber, victim, amount, won, "all-in robbery resolved");
        Ok(AllInReport {
            won,
            amount,
            robber_balance,
            victim_balance,
        })
    }

    /// Challenge `target` to a duel for the smaller of both balances.
    pub async fn challenge(
        &self,
        challenger: AccountId,
        target: AccountId,
        handle: Option<Handle>,
    ) -> Result<Request, Error> {
        if challenger == target {
            return Err(Error::SelfTarget(challenger));
        }
        if !self.ledger.exists(target).await {
            return Err(Error::AccountNotFound(target));
        }
        let mut stake = i64::MAX;
        for account in [challenger, target] {
            let balance = self.balance(account).await?;
            if balance < MIN_ALL_IN_BALANCE {
                return Err(Error::InsufficientBalance {
                    account,
                    balance,
                    required: MIN_ALL_IN_BALANCE,
                });
            }
            stake = stake.min(balance);
        }
        self.requests.create(challenger, target, stake, handle)
    }

    pub fn decline(&self, target: AccountId, resolver: AccountId) -> Result<Request, Error> {
        self.requests.decline(target, resolver)
    }

    /// Accept the duel addressed to `target` and flip for it.
    pub async fn accept(&self, target: AccountId, resolver: AccountId) -> Result<DuelReport, Error> {
        let challenger_wins = self.rng().coin();
        self.accept_with(target, resolver, challenger_wins).await
    }

    /// Accept with a predetermined winner. The stake is recomputed from the
    /// balances at acceptance time.
    pub async fn accept_with(
        &self,
        target: AccountId,
        resolver: AccountId,
        challenger_wins: bool,
    ) -> Result<DuelReport, Error> {
        let request = self.requests.accept(target, resolver)?;
        let challenger = request.challenger;

        let pair = self.locks.acquire_pair(challenger, target).await;
        let challenger_balance = self.balance(challenger).await?;
        let target_balance = self.balance(target).await?;
        let (poorer, amount) = if challenger_balance <= target_balance {
            (challenger, challenger_balance)
        } else {
            (target, target_balance)
        };
        if amount < MIN_ALL_IN_BALANCE {
            return Err(Error::InsufficientBalance {
                account: poorer,
                balance: amount,
                required: MIN_ALL_IN_BALANCE,
            });
        }

        let (winner, loser) = if challenger_wins {
            (challenger, target)
        } else {
            (target, challenger)
        };
        let (loser_balance, winner_balance) = self
            .shift(
                &pair,
                loser,
                winner,
                amount,
                (Category::DuelLose, Category::DuelWin),
                &format!("duel {challenger} vs {target}"),
            )
            .await?;
        info!(id = request.id, winner, loser, amount, "duel resolved");
        Ok(DuelReport {
            winner,
            loser,
            amount,
            winner_balance,
            loser_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ledger::Memory, mocks::create_ledger};

    fn setup(balances: &[(AccountId, i64)]) -> (Arc<Memory>, Versus<Memory>) {
        let ledger = create_ledger(balances);
        let versus = Versus::new(
            KeyLocks::new(),
            ledger.clone(),
            Requests::default(),
            GameRng::seeded(3),
        );
        (ledger, versus)
    }

    #[test]
    fn test_outcome_weights() {
        let counts = (0..100).fold([0; 3], |mut counts, roll| {
            match RobOutcome::from_roll(roll) {
                RobOutcome::Success => counts[0] += 1,
                RobOutcome::Fail => counts[1] += 1,
                RobOutcome::CounterAttack => counts[2] += 1,
            }
            counts
        });
        assert_eq!(counts, [50, 20, 30]);
    }

    #[tokio::test]
    async fn test_transfer() {
        let (ledger, versus) = setup(&[(1, 500), (2, 100)]);

        let report = versus.transfer(1, 2, 200).await.unwrap();
        assert_eq!(
            report,
            TransferReport {
                from_balance: 300,
                to_balance: 300
            }
        );
        assert_eq!(
            versus.transfer(1, 2, 301).await,
            Err(Error::InsufficientBalance {
                account: 1,
                balance: 300,
                required: 301
            })
        );
        assert_eq!(versus.transfer(1, 2, 0).await, Err(Error::InvalidStake(0)));
        assert_eq!(versus.transfer(1, 1, 10).await, Err(Error::SelfTarget(1)));
        assert_eq!(
            versus.transfer(1, 9, 10).await,
            Err(Error::AccountNotFound(9))
        );
        assert_eq!(
            versus.transfer(9, 1, 10).await,
            Err(Error::AccountNotFound(9))
        );
        assert_eq!(ledger.total(), 600);
        assert_eq!(ledger.history(2).last().unwrap().category, Category::Transfer);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_transfers_conserve_total() {
        let (ledger, versus) = setup(&[(1, 10_000), (2, 10_000)]);
        let versus = Arc::new(versus);

        let mut handles = Vec::new();
        for i in 0..100 {
            let versus = versus.clone();
            handles.push(tokio::spawn(async move {
                let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
                versus.transfer(from, to, 7).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(ledger.total(), 20_000);
        assert_eq!(ledger.balance(1).await, Ok(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rob_outcomes_move_capped_amounts() {
        let (ledger, versus) = setup(&[(1, 50), (2, 300)]);

        let report = versus.rob_with(1, 2, RobOutcome::Success, 1000).await.unwrap();
        assert_eq!(report.amount, 300);
        assert_eq!((report.robber_balance, report.victim_balance), (350, 0));
        assert_eq!(ledger.history(2).last().unwrap().category, Category::Robbed);

        tokio::time::advance(Duration::from_secs(21)).await;
        let report = versus
            .rob_with(1, 2, RobOutcome::Success, 500)
            .await
            .unwrap();
        // Nothing left to take.
        assert_eq!(report.outcome, RobOutcome::Fail);
        assert_eq!(report.amount, 0);

        tokio::time::advance(Duration::from_secs(21)).await;
        let report = versus
            .rob_with(1, 2, RobOutcome::CounterAttack, 1000)
            .await
            .unwrap();
        assert_eq!(report.amount, 350);
        assert_eq!((report.robber_balance, report.victim_balance), (0, 350));
        assert_eq!(
            ledger.history(1).last().unwrap().category,
            Category::CounterAttack
        );

        tokio::time::advance(Duration::from_secs(21)).await;
        let report = versus.rob_with(1, 2, RobOutcome::Fail, 1000).await.unwrap();
        assert_eq!(report.amount, 0);
        assert_eq!(ledger.total(), 350);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rob_cooldown() {
        let (_, versus) = setup(&[(1, 1000), (2, 1000), (3, 1000)]);
        versus.rob_with(1, 2, RobOutcome::Fail, 0).await.unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(
            versus.rob_with(1, 3, RobOutcome::Fail, 0).await,
            Err(Error::Cooldown {
                account: 1,
                remaining_secs: 21
            })
        );
        // Other robbers are unaffected.
        versus.rob_with(3, 2, RobOutcome::Fail, 0).await.unwrap();

        tokio::time::advance(Duration::from_millis(20_500)).await;
        assert_eq!(versus.cooldown(1), None);
        versus.rob_with(1, 3, RobOutcome::Fail, 0).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_protection_after_three_robberies() {
        let (_, versus) = setup(&[(1, 1000), (2, 1000), (3, 1000), (4, 1000), (9, 10_000)]);

        for robber in 1..=2 {
            let report = versus
                .rob_with(robber, 9, RobOutcome::Success, 100)
                .await
                .unwrap();
            assert!(!report.protection_granted);
        }
        let report = versus.rob_with(3, 9, RobOutcome::Success, 100).await.unwrap();
        assert!(report.protection_granted);
        assert_eq!(versus.protection(9), Some(Duration::from_secs(30 * 60)));

        assert_eq!(
            versus.rob_with(4, 9, RobOutcome::Success, 100).await,
            Err(Error::Protected {
                account: 9,
                remaining_secs: 30 * 60
            })
        );

        tokio::time::advance(Duration::from_secs(30 * 60)).await;
        assert_eq!(versus.protection(9), None);
        let report = versus.rob_with(4, 9, RobOutcome::Success, 100).await.unwrap();
        assert!(!report.protection_granted);
    }

    #[tokio::test]
    async fn test_rob_rejections() {
        let (_, versus) = setup(&[(1, 1000)]);
        assert_eq!(versus.rob(1, 1).await, Err(Error::SelfTarget(1)));
        assert_eq!(versus.rob(1, 2).await, Err(Error::AccountNotFound(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_rob_starts_no_cooldown() {
        let (ledger, versus) = setup(&[(2, 1000), (3, 1000)]);
        assert_eq!(
            versus.rob_with(99, 2, RobOutcome::Fail, 10).await,
            Err(Error::AccountNotFound(99))
        );
        assert_eq!(versus.cooldown(99), None);

        // Once the account exists it may rob right away.
        ledger.create(99, 500);
        versus.rob_with(99, 3, RobOutcome::Fail, 10).await.unwrap();
        assert!(versus.cooldown(99).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_in_rob() {
        let (ledger, versus) = setup(&[(1, 400), (2, 250), (3, 50)]);

        let report = versus.all_in_rob_with(1, 2, true).await.unwrap();
        assert_eq!(report.amount, 250);
        assert_eq!((report.robber_balance, report.victim_balance), (650, 0));
        assert!(matches!(
            versus.all_in_rob_with(1, 2, true).await,
            Err(Error::Cooldown { account: 1, .. })
        ));

        // A loss costs the robber everything.
        ledger.create(4, 200);
        let report = versus.all_in_rob_with(4, 1, false).await.unwrap();
        assert_eq!(report.amount, 200);
        assert_eq!((report.robber_balance, report.victim_balance), (0, 850));

        assert_eq!(
            versus.all_in_rob_with(3, 1, true).await,
            Err(Error::InsufficientBalance {
                account: 3,
                balance: 50,
                required: 100
            })
        );
    }

    #[tokio::test]
    async fn test_all_in_rob_does_not_wait() {
        let (ledger, versus) = setup(&[(1, 400), (2, 250)]);
        let busy = versus.locks.acquire(2).await;
        assert_eq!(
            versus.all_in_rob_with(1, 2, true).await,
            Err(Error::AccountBusy(2))
        );
        drop(busy);
        assert!(!versus.locks.is_locked(1));
        assert_eq!(ledger.balance(1).await, Ok(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duel_pending_then_expired() {
        let (ledger, versus) = setup(&[(1, 500), (2, 300), (3, 900)]);

        let request = versus.challenge(1, 2, None).await.unwrap();
        assert_eq!(request.stake, 300);
        assert_eq!(
            versus.challenge(1, 3, None).await,
            Err(Error::RequestPending(1))
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(versus.accept(2, 2).await, Err(Error::RequestExpired(2)));
        assert_eq!(ledger.total(), 1700);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duel_accept_recomputes_stake() {
        let (ledger, versus) = setup(&[(1, 500), (2, 300)]);
        versus.challenge(1, 2, None).await.unwrap();
        ledger.adjust(2, 100, Category::Daily, None).await.unwrap();

        assert_eq!(
            versus.accept_with(2, 1, true).await,
            Err(Error::RequestNotYours {
                target: 2,
                resolver: 1
            })
        );
        let report = versus.accept_with(2, 2, false).await.unwrap();
        assert_eq!(
            report,
            DuelReport {
                winner: 2,
                loser: 1,
                amount: 400,
                winner_balance: 800,
                loser_balance: 100,
            }
        );
        assert_eq!(ledger.history(2).last().unwrap().category, Category::DuelWin);
        assert_eq!(ledger.history(1).last().unwrap().category, Category::DuelLose);
        assert_eq!(versus.accept(2, 2).await, Err(Error::RequestNotFound(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duel_checks_balances() {
        let (_, versus) = setup(&[(1, 500), (2, 99)]);
        assert_eq!(
            versus.challenge(1, 2, None).await,
            Err(Error::InsufficientBalance {
                account: 2,
                balance: 99,
                required: 100
            })
        );
        assert_eq!(
            versus.challenge(1, 7, None).await,
            Err(Error::AccountNotFound(7))
        );
        assert_eq!(versus.challenge(1, 1, None).await, Err(Error::SelfTarget(1)));

        let (ledger, versus) = setup(&[(1, 500), (2, 200)]);
        versus.challenge(1, 2, None).await.unwrap();
        ledger.adjust(2, -150, Category::AdminSub, None).await.unwrap();
        assert_eq!(
            versus.accept_with(2, 2, true).await,
            Err(Error::InsufficientBalance {
                account: 2,
                balance: 50,
                required: 100
            })
        );
        // The request was consumed either way.
        assert!(versus.requests().is_empty());
        assert!(versus.decline(2, 2).is_err());
    }
}
