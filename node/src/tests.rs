use super::*;
use engine::{seed_ledger, Engine};
use parlor_execution::{mocks::FlakyLedger, Ledger, Memory};
use prometheus_client::{encoding::text::encode, registry::Registry};
use std::sync::Arc;

const CONFIG: &str = r#"
log_level: debug
worker_threads: 2
seed: 11
betting_secs: 30
duel_timeout_secs: 20
rob:
  cooldown_secs: 1
simulation:
  chats: 3
  accounts: 12
  initial_balance: 10000
  rounds: 2
  bettors: 16
  skirmishes: 6
"#;

fn config() -> Config {
    serde_yaml::from_str(CONFIG).unwrap()
}

fn engine_config(configure: impl FnOnce(&mut SimulationConfig)) -> engine::Config {
    let mut config = config();
    configure(&mut config.simulation);
    engine::Config::from(&config.validate().unwrap())
}

#[test]
fn test_config_defaults() {
    let config = config().validate().unwrap();
    assert_eq!(config.log_level, Level::DEBUG);
    assert!(!config.json_logs);
    assert_eq!(config.seed, Some(11));
    assert_eq!(config.metrics_path, None);
    assert_eq!(config.table, TableConfig::default());
    assert_eq!(config.betting_window, Duration::from_secs(30));
    assert_eq!(config.duel_timeout, Duration::from_secs(20));
    assert_eq!(config.rob.cooldown, Duration::from_secs(1));
    assert_eq!(
        config.rob.all_in_cooldown,
        Duration::from_secs(ALL_IN_ROB_COOLDOWN_SECS)
    );
    assert_eq!(config.rob.max_amount, MAX_ROB_AMOUNT);
    assert_eq!(config.simulation.early_settle_percent, 0);
}

#[test]
fn test_sample_config_parses() {
    let config: Config =
        serde_yaml::from_str(include_str!("../configs/local.yaml")).unwrap();
    let config = config.validate().unwrap();
    assert_eq!(config.simulation.chats, 4);
    assert_eq!(config.betting_window, Duration::from_secs(5));
}

#[test]
fn test_config_rejections() {
    let mut bad = config();
    bad.log_level = "loud".to_string();
    assert!(matches!(
        bad.validate(),
        Err(ConfigError::InvalidLogLevel { .. })
    ));

    let mut bad = config();
    bad.stake = 0;
    assert!(matches!(
        bad.validate(),
        Err(ConfigError::InvalidNonZero { field: "stake", .. })
    ));

    let mut bad = config();
    bad.betting_secs = 0;
    assert!(matches!(
        bad.validate(),
        Err(ConfigError::InvalidNonZero {
            field: "betting_secs",
            ..
        })
    ));

    let mut bad = config();
    bad.rob.min_amount = 500;
    bad.rob.max_amount = 100;
    assert!(matches!(
        bad.validate(),
        Err(ConfigError::InvalidRobRange { min: 500, max: 100 })
    ));

    let mut bad = config();
    bad.simulation.accounts = 1;
    assert!(matches!(
        bad.validate(),
        Err(ConfigError::InvalidMinimum {
            field: "simulation.accounts",
            ..
        })
    ));

    let mut bad = config();
    bad.simulation.early_settle_percent = 101;
    assert!(matches!(
        bad.validate(),
        Err(ConfigError::InvalidPercent { .. })
    ));
}

/// Every recorded entry chains onto the previous balance and none is negative.
fn assert_consistent(ledger: &Memory) {
    for account in ledger.accounts() {
        let history = ledger.history(account);
        let mut running = 0;
        for entry in &history {
            running += entry.amount;
            assert_eq!(entry.balance, running, "account {account}");
            assert!(entry.balance >= 0, "account {account}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_betting_rounds_settle_once_per_round() {
    let config = engine_config(|simulation| simulation.skirmishes = 0);
    let ledger = seed_ledger(&config.simulation);
    let mut registry = Registry::default();
    let engine = Engine::new(config, ledger.clone(), &mut registry);

    let summary = engine.run().await;
    assert_eq!(summary.rounds, 3 * 2);
    assert_eq!(summary.rounds_early, 0);
    assert_eq!(summary.bets + summary.bets_rejected, 3 * 2 * 16);
    assert!(summary.bets > 0);
    assert_eq!(summary.transfers + summary.robberies + summary.duels, 0);
    assert_consistent(&ledger);
}

#[tokio::test(start_paused = true)]
async fn test_early_settlement_by_starter() {
    let config = engine_config(|simulation| {
        simulation.skirmishes = 0;
        simulation.early_settle_percent = 100;
    });
    let ledger = seed_ledger(&config.simulation);
    let engine = Engine::new(config, ledger.clone(), &mut Registry::default());

    let summary = engine.run().await;
    assert_eq!(summary.rounds, 3 * 2);
    assert_eq!(summary.rounds_early, summary.rounds);
    assert_consistent(&ledger);
}

#[tokio::test(start_paused = true)]
async fn test_skirmishes_conserve_money() {
    let config = engine_config(|simulation| simulation.bettors = 0);
    let ledger = seed_ledger(&config.simulation);
    let opening = ledger.total();
    let engine = Engine::new(config, ledger.clone(), &mut Registry::default());

    let summary = engine.run().await;
    assert_eq!(summary.bets, 0);
    // Declined and expired challenges count as neither.
    assert!(
        summary.transfers + summary.robberies + summary.duels + summary.skirmishes_rejected
            <= 3 * 2 * 6
    );
    assert!(summary.transfers + summary.robberies + summary.duels > 0);
    assert_eq!(ledger.total(), opening);
    assert_consistent(&ledger);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_credits_are_recovered() {
    let config = engine_config(|simulation| {
        simulation.chats = 1;
        simulation.skirmishes = 0;
        simulation.rounds = 3;
    });
    let attempts = config.table.credit_attempts;
    let inner = Memory::new();
    for account in 1..=config.simulation.accounts as i64 {
        inner.create(account, config.simulation.initial_balance);
    }
    let ledger = Arc::new(FlakyLedger::new(inner));
    for account in 1..=config.simulation.accounts as i64 {
        ledger.fail_credits(account, attempts);
    }
    let engine = Engine::new(config, ledger.clone(), &mut Registry::default());
    let metrics = engine.metrics().clone();

    let summary = engine.run().await;
    assert!(summary.credits_pending > 0);
    assert_eq!(metrics.credits_recovered.get(), summary.credits_pending);
    assert_consistent(&ledger.inner);
    for account in ledger.inner.accounts() {
        assert!(ledger.balance(account).await.unwrap() >= 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_metrics_exported() {
    let config = engine_config(|simulation| {
        simulation.chats = 1;
        simulation.rounds = 1;
    });
    let ledger = seed_ledger(&config.simulation);
    let mut registry = Registry::with_prefix("parlor");
    let engine = Engine::new(config, ledger, &mut registry);
    let summary = engine.run().await;

    let mut exported = String::new();
    encode(&mut exported, &registry).unwrap();
    assert!(exported.contains("parlor_rounds_settled_total 1"));
    assert!(exported.contains(&format!("parlor_bets_placed_total {}", summary.bets)));
    assert!(exported.contains("parlor_active_rounds 0"));
}
