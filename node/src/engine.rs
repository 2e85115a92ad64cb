use crate::{SimulationConfig, ValidatedConfig};
use futures::future::join_all;
use parlor_execution::{
    casino::GameRng, Error, Handle, KeyLocks, Ledger, Memory, Request, Requests, RobRules,
    PendingCredit, SessionDirectory, SettleReport, Table, TableConfig, Versus,
};
use parlor_types::{casino::BetOption, AccountId, ChatId};
use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Chat ids handed to simulated tables start here (group chats are negative).
const FIRST_CHAT: ChatId = -1_000;

/// Configuration for the [Engine].
#[derive(Clone, Debug)]
pub struct Config {
    pub seed: Option<u64>,
    pub table: TableConfig,
    pub betting_window: Duration,
    pub lock_pool: usize,
    pub duel_timeout: Duration,
    pub rob: RobRules,
    pub simulation: SimulationConfig,
}

impl From<&ValidatedConfig> for Config {
    fn from(config: &ValidatedConfig) -> Self {
        Self {
            seed: config.seed,
            table: config.table.clone(),
            betting_window: config.betting_window,
            lock_pool: config.lock_pool,
            duel_timeout: config.duel_timeout,
            rob: config.rob.clone(),
            simulation: config.simulation.clone(),
        }
    }
}

/// Counters and gauges exported by the [Engine].
#[derive(Clone, Default)]
pub struct Metrics {
    pub rounds_settled: Counter,
    pub rounds_settled_early: Counter,
    pub bets_placed: Counter,
    pub bets_rejected: Counter,
    pub credits_pending: Counter,
    pub credits_recovered: Counter,
    pub transfers: Counter,
    pub robberies: Counter,
    pub duels: Counter,
    pub skirmishes_rejected: Counter,
    pub requests_expired: Counter,
    pub active_rounds: Gauge,
    pub tracked_locks: Gauge,
}

impl Metrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "rounds_settled",
            "Number of sic bo rounds settled",
            metrics.rounds_settled.clone(),
        );
        registry.register(
            "rounds_settled_early",
            "Number of rounds settled early by their starter",
            metrics.rounds_settled_early.clone(),
        );
        registry.register(
            "bets_placed",
            "Number of bets debited and placed",
            metrics.bets_placed.clone(),
        );
        registry.register(
            "bets_rejected",
            "Number of bets rejected before or after the debit",
            metrics.bets_rejected.clone(),
        );
        registry.register(
            "credits_pending",
            "Number of winner credits and bet refunds that exhausted their attempts",
            metrics.credits_pending.clone(),
        );
        registry.register(
            "credits_recovered",
            "Number of pending credits applied on retry",
            metrics.credits_recovered.clone(),
        );
        registry.register(
            "transfers",
            "Number of completed transfers",
            metrics.transfers.clone(),
        );
        registry.register(
            "robberies",
            "Number of robberies and all-in robberies resolved",
            metrics.robberies.clone(),
        );
        registry.register(
            "duels",
            "Number of duels resolved",
            metrics.duels.clone(),
        );
        registry.register(
            "skirmishes_rejected",
            "Number of two-party operations rejected",
            metrics.skirmishes_rejected.clone(),
        );
        registry.register(
            "requests_expired",
            "Number of duel challenges that expired unanswered",
            metrics.requests_expired.clone(),
        );
        registry.register(
            "active_rounds",
            "Number of rounds currently open",
            metrics.active_rounds.clone(),
        );
        registry.register(
            "tracked_locks",
            "Number of account locks held or awaited",
            metrics.tracked_locks.clone(),
        );
        metrics
    }
}

/// Totals of a finished simulation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub rounds: u64,
    pub rounds_early: u64,
    pub bets: u64,
    pub bets_rejected: u64,
    pub credits_pending: u64,
    pub transfers: u64,
    pub robberies: u64,
    pub duels: u64,
    pub skirmishes_rejected: u64,
    pub requests_expired: u64,
}

impl Summary {
    fn collect(metrics: &Metrics) -> Self {
        Self {
            rounds: metrics.rounds_settled.get(),
            rounds_early: metrics.rounds_settled_early.get(),
            bets: metrics.bets_placed.get(),
            bets_rejected: metrics.bets_rejected.get(),
            credits_pending: metrics.credits_pending.get(),
            transfers: metrics.transfers.get(),
            robberies: metrics.robberies.get(),
            duels: metrics.duels.get(),
            skirmishes_rejected: metrics.skirmishes_rejected.get(),
            requests_expired: metrics.requests_expired.get(),
        }
    }
}

/// Open an in-memory ledger holding every simulated account.
pub fn seed_ledger(simulation: &SimulationConfig) -> Arc<Memory> {
    let ledger = Arc::new(Memory::new());
    for account in accounts(simulation) {
        ledger.create(account, simulation.initial_balance);
    }
    ledger
}

fn accounts(simulation: &SimulationConfig) -> impl Iterator<Item = AccountId> {
    1..=simulation.accounts as AccountId
}

/// Drives tables and two-party operations for a set of simulated chats.
pub struct Engine<L: Ledger> {
    config: Config,
    locks: KeyLocks,
    table: Arc<Table<L>>,
    versus: Arc<Versus<L>>,
    expired: mpsc::UnboundedReceiver<Request>,
    metrics: Metrics,
    rng: StdRng,
}

impl<L: Ledger> Engine<L> {
    pub fn new(config: Config, ledger: Arc<L>, registry: &mut Registry) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let locks = KeyLocks::with_capacity(config.lock_pool);
        let directory = SessionDirectory::new(GameRng::seeded(rng.gen()))
            .with_default_window(config.betting_window);
        let table = Table::new(locks.clone(), ledger.clone(), directory)
            .with_config(config.table.clone());
        let (requests, expired) =
            Requests::new(config.duel_timeout).with_expiry_notifications();
        let versus = Versus::new(locks.clone(), ledger, requests, GameRng::seeded(rng.gen()))
            .with_rules(config.rob.clone());

        Self {
            config,
            locks,
            table: Arc::new(table),
            versus: Arc::new(versus),
            expired,
            metrics: Metrics::register(registry),
            rng,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Play every chat to completion, then wait out the last challenges.
    pub async fn run(self) -> Summary {
        let Self {
            config,
            locks,
            table,
            versus,
            mut expired,
            metrics,
            mut rng,
        } = self;
        let simulation = Arc::new(config.simulation);
        info!(
            chats = simulation.chats,
            rounds = simulation.rounds,
            accounts = simulation.accounts,
            "simulation starting"
        );

        let drain = {
            let metrics = metrics.clone();
            tokio::spawn(async move {
                while let Some(request) = expired.recv().await {
                    debug!(
                        id = request.id,
                        challenger = request.challenger,
                        target = request.target,
                        "challenge expired"
                    );
                    metrics.requests_expired.inc();
                }
            })
        };

        let chats: Vec<JoinHandle<()>> = (0..simulation.chats)
            .map(|index| {
                let chat = Chat {
                    id: FIRST_CHAT - index as ChatId,
                    table: table.clone(),
                    versus: versus.clone(),
                    locks: locks.clone(),
                    simulation: simulation.clone(),
                    metrics: metrics.clone(),
                    rng: StdRng::seed_from_u64(rng.gen()),
                };
                tokio::spawn(chat.play())
            })
            .collect();
        for result in join_all(chats).await {
            if let Err(err) = result {
                warn!(?err, "chat task failed");
            }
        }

        // Unanswered challenges still hold the registry until their timers
        // fire; the drain ends once the last one is gone.
        drop(versus);
        if let Err(err) = drain.await {
            warn!(?err, "expiry drain failed");
        }

        let summary = Summary::collect(&metrics);
        info!(?summary, "simulation finished");
        summary
    }
}

/// One simulated chat: a table running rounds plus members picking fights.
struct Chat<L: Ledger> {
    id: ChatId,
    table: Arc<Table<L>>,
    versus: Arc<Versus<L>>,
    locks: KeyLocks,
    simulation: Arc<SimulationConfig>,
    metrics: Metrics,
    rng: StdRng,
}

impl<L: Ledger> Chat<L> {
    fn account(&mut self) -> AccountId {
        self.rng.gen_range(1..=self.simulation.accounts as AccountId)
    }

    /// Two distinct accounts.
    fn pair(&mut self) -> (AccountId, AccountId) {
        let first = self.account();
        loop {
            let second = self.account();
            if second != first {
                return (first, second);
            }
        }
    }

    fn option(&mut self) -> String {
        match self.rng.gen_range(0..8u8) {
            0 => "big".to_string(),
            1 => "small".to_string(),
            n => BetOption::Single(n - 1).to_string(),
        }
    }

    async fn play(mut self) {
        for round in 0..self.simulation.rounds {
            if let Err(err) = self.round(round).await {
                warn!(chat = self.id, round, ?err, "round failed to open");
            }
        }
    }

    async fn round(&mut self, round: usize) -> Result<(), Error> {
        let starter = self.account();
        let session = self.table.open(self.id, starter, Duration::ZERO)?;
        let window = session.time_remaining();
        self.metrics.active_rounds.inc();
        debug!(chat = self.id, round, starter, "round opened");
        let settler = self.table.auto_settle(session.clone());

        let bettors: Vec<_> = (0..self.simulation.bettors)
            .map(|_| {
                let account = self.account();
                let option = self.option();
                let delay = self.delay(window);
                let table = self.table.clone();
                let metrics = self.metrics.clone();
                let chat = self.id;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    match table.bet(chat, account, &option).await {
                        Ok(receipt) => {
                            debug!(
                                chat,
                                account,
                                option = %receipt.option,
                                accumulated = receipt.accumulated,
                                "bet placed"
                            );
                            metrics.bets_placed.inc();
                        }
                        Err(err) => {
                            debug!(chat, account, %err, "bet rejected");
                            metrics.bets_rejected.inc();
                        }
                    }
                })
            })
            .collect();

        let (bettors, ()) = futures::join!(join_all(bettors), self.skirmish(window));
        for result in bettors {
            if let Err(err) = result {
                warn!(chat = self.id, ?err, "bettor task failed");
            }
        }
        self.recover(&self.table.take_pending_refunds()).await;

        let early = self.rng.gen_range(0..100u8) < self.simulation.early_settle_percent;
        if early && !session.is_settled() {
            match self.table.settle_early(self.id, starter).await {
                Ok(report) => {
                    self.metrics.rounds_settled_early.inc();
                    self.settled(report).await;
                }
                Err(err) => debug!(chat = self.id, %err, "early settle lost the race"),
            }
        }

        match settler.await {
            Ok(Ok(report)) => self.settled(report).await,
            // Already settled early.
            Ok(Err(Error::NoActiveSession(_))) => {}
            Ok(Err(err)) => warn!(chat = self.id, ?err, "auto settle failed"),
            Err(err) => warn!(chat = self.id, ?err, "auto settle task failed"),
        }
        self.metrics.active_rounds.dec();
        self.metrics.tracked_locks.set(self.locks.tracked() as i64);
        Ok(())
    }

    /// Record a settlement and retry any credits it could not apply.
    async fn settled(&self, report: SettleReport) {
        self.metrics.rounds_settled.inc();
        info!(
            chat = self.id,
            outcome = %report.settlement.outcome,
            players = report.settlement.payouts.len(),
            "round settled"
        );
        self.recover(&report.pending_credits).await;
    }

    /// Retry credits the table could not apply, once each.
    async fn recover(&self, pending_credits: &[PendingCredit]) {
        for pending in pending_credits {
            self.metrics.credits_pending.inc();
            match self.table.retry_credit(pending).await {
                Ok(balance) => {
                    self.metrics.credits_recovered.inc();
                    debug!(
                        chat = self.id,
                        account = pending.account,
                        category = %pending.category,
                        balance,
                        "credit recovered"
                    );
                }
                Err(err) => warn!(
                    chat = self.id,
                    account = pending.account,
                    amount = pending.amount,
                    %err,
                    "credit still pending"
                ),
            }
        }
    }

    fn delay(&mut self, window: Duration) -> Duration {
        let millis = window.as_millis().max(1) as u64;
        Duration::from_millis(self.rng.gen_range(0..millis))
    }

    /// Two-party operations spread over one betting window.
    async fn skirmish(&mut self, window: Duration) {
        let step = window / (self.simulation.skirmishes as u32 + 1);
        for message in 0..self.simulation.skirmishes {
            tokio::time::sleep(step).await;
            let (first, second) = self.pair();
            let result = match self.rng.gen_range(0..10u8) {
                0..=3 => {
                    let amount = self.rng.gen_range(1..=self.table.config().stake);
                    self.versus.transfer(first, second, amount).await.map(|_| {
                        self.metrics.transfers.inc();
                    })
                }
                4..=6 => self.versus.rob(first, second).await.map(|report| {
                    debug!(
                        chat = self.id,
                        robber = first,
                        victim = second,
                        outcome = ?report.outcome,
                        "robbery"
                    );
                    self.metrics.robberies.inc();
                }),
                7 => self.versus.all_in_rob(first, second).await.map(|report| {
                    debug!(
                        chat = self.id,
                        robber = first,
                        victim = second,
                        won = report.won,
                        "all-in robbery"
                    );
                    self.metrics.robberies.inc();
                }),
                _ => self.duel(first, second, message as i64).await,
            };
            if let Err(err) = result {
                debug!(chat = self.id, first, second, %err, "skirmish rejected");
                self.metrics.skirmishes_rejected.inc();
            }
        }
    }

    /// Challenge, then accept, decline or ignore the challenge.
    async fn duel(
        &mut self,
        challenger: AccountId,
        target: AccountId,
        message: i64,
    ) -> Result<(), Error> {
        let handle = Handle {
            chat: self.id,
            message,
        };
        let request = self.versus.challenge(challenger, target, Some(handle)).await?;
        match self.rng.gen_range(0..10u8) {
            0..=5 => {
                let report = self.versus.accept(request.target, target).await?;
                info!(
                    chat = self.id,
                    winner = report.winner,
                    loser = report.loser,
                    amount = report.amount,
                    "duel resolved"
                );
                self.metrics.duels.inc();
            }
            6..=7 => {
                self.versus.decline(request.target, target)?;
            }
            // Left to expire.
            _ => {}
        }
        Ok(())
    }
}
