use parlor_execution::{RobRules, TableConfig};
use parlor_types::casino::{
    ALL_IN_ROB_COOLDOWN_SECS, DEFAULT_BETTING_SECS, DUEL_TIMEOUT_SECS, FIXED_BET_AMOUNT,
    MAX_ROB_AMOUNT, MIN_ROB_AMOUNT, ROB_COOLDOWN_SECS, ROB_PROTECTION_MINS,
    ROB_PROTECTION_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;

pub mod engine;

/// Configuration for the [engine::Engine].
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    pub worker_threads: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub metrics_path: Option<String>,

    #[serde(default = "default_stake")]
    pub stake: i64,
    #[serde(default = "default_betting_secs")]
    pub betting_secs: u64,
    #[serde(default = "default_credit_attempts")]
    pub credit_attempts: u32,
    #[serde(default = "default_credit_backoff_ms")]
    pub credit_backoff_ms: u64,
    #[serde(default = "default_lock_pool")]
    pub lock_pool: usize,
    #[serde(default = "default_duel_timeout_secs")]
    pub duel_timeout_secs: u64,
    #[serde(default)]
    pub rob: RobConfig,

    pub simulation: SimulationConfig,
}

/// Robbery tuning. Every field falls back to the game constant.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RobConfig {
    pub cooldown_secs: u64,
    pub all_in_cooldown_secs: u64,
    pub min_amount: i64,
    pub max_amount: i64,
    pub protection_threshold: u32,
    pub protection_mins: u64,
}

impl Default for RobConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: ROB_COOLDOWN_SECS,
            all_in_cooldown_secs: ALL_IN_ROB_COOLDOWN_SECS,
            min_amount: MIN_ROB_AMOUNT,
            max_amount: MAX_ROB_AMOUNT,
            protection_threshold: ROB_PROTECTION_THRESHOLD,
            protection_mins: ROB_PROTECTION_MINS,
        }
    }
}

/// Shape of the simulated chat load.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Chats playing concurrently, each with its own table.
    pub chats: usize,
    /// Accounts shared by every chat.
    pub accounts: usize,
    pub initial_balance: i64,
    /// Rounds played back to back in each chat.
    pub rounds: usize,
    /// Bets attempted per round.
    pub bettors: usize,
    /// Transfers, robberies and duels attempted per round.
    pub skirmishes: usize,
    /// Chance (0-100) that the starter settles a round early.
    #[serde(default)]
    pub early_settle_percent: u8,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: i64 },
    #[error("{field} must be >= {min} (got {value})")]
    InvalidMinimum {
        field: &'static str,
        min: i64,
        value: i64,
    },
    #[error("{field} must be a percentage (got {value})")]
    InvalidPercent { field: &'static str, value: u8 },
    #[error("rob.min_amount ({min}) exceeds rob.max_amount ({max})")]
    InvalidRobRange { min: i64, max: i64 },
}

pub struct ValidatedConfig {
    pub log_level: Level,
    pub json_logs: bool,
    pub worker_threads: usize,
    pub seed: Option<u64>,
    pub metrics_path: Option<PathBuf>,

    pub table: TableConfig,
    pub betting_window: Duration,
    pub lock_pool: usize,
    pub duel_timeout: Duration,
    pub rob: RobRules,

    pub simulation: SimulationConfig,
}

fn default_stake() -> i64 {
    FIXED_BET_AMOUNT
}

fn default_betting_secs() -> u64 {
    DEFAULT_BETTING_SECS
}

fn default_credit_attempts() -> u32 {
    3
}

fn default_credit_backoff_ms() -> u64 {
    100
}

fn default_lock_pool() -> usize {
    1024
}

fn default_duel_timeout_secs() -> u64 {
    DUEL_TIMEOUT_SECS
}

fn non_zero(field: &'static str, value: impl TryInto<i64>) -> Result<(), ConfigError> {
    let value = value.try_into().unwrap_or(i64::MAX);
    if value <= 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

impl Config {
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        non_zero("worker_threads", self.worker_threads)?;
        non_zero("stake", self.stake)?;
        non_zero("betting_secs", self.betting_secs)?;
        non_zero("credit_attempts", self.credit_attempts)?;
        non_zero("lock_pool", self.lock_pool)?;
        non_zero("duel_timeout_secs", self.duel_timeout_secs)?;
        non_zero("rob.min_amount", self.rob.min_amount)?;
        non_zero("rob.protection_threshold", self.rob.protection_threshold)?;
        if self.rob.min_amount > self.rob.max_amount {
            return Err(ConfigError::InvalidRobRange {
                min: self.rob.min_amount,
                max: self.rob.max_amount,
            });
        }

        let simulation = &self.simulation;
        non_zero("simulation.chats", simulation.chats)?;
        if simulation.accounts < 2 {
            return Err(ConfigError::InvalidMinimum {
                field: "simulation.accounts",
                min: 2,
                value: simulation.accounts as i64,
            });
        }
        if simulation.initial_balance < 0 {
            return Err(ConfigError::InvalidMinimum {
                field: "simulation.initial_balance",
                min: 0,
                value: simulation.initial_balance,
            });
        }
        if simulation.early_settle_percent > 100 {
            return Err(ConfigError::InvalidPercent {
                field: "simulation.early_settle_percent",
                value: simulation.early_settle_percent,
            });
        }

        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        Ok(ValidatedConfig {
            log_level,
            json_logs: self.json_logs,
            worker_threads: self.worker_threads,
            seed: self.seed,
            metrics_path: self.metrics_path.map(PathBuf::from),
            table: TableConfig {
                stake: self.stake,
                credit_attempts: self.credit_attempts,
                credit_backoff: Duration::from_millis(self.credit_backoff_ms),
            },
            betting_window: Duration::from_secs(self.betting_secs),
            lock_pool: self.lock_pool,
            duel_timeout: Duration::from_secs(self.duel_timeout_secs),
            rob: RobRules {
                cooldown: Duration::from_secs(self.rob.cooldown_secs),
                all_in_cooldown: Duration::from_secs(self.rob.all_in_cooldown_secs),
                min_amount: self.rob.min_amount,
                max_amount: self.rob.max_amount,
                protection_threshold: self.rob.protection_threshold,
                protection: Duration::from_secs(self.rob.protection_mins * 60),
            },
            simulation: self.simulation,
        })
    }
}

#[cfg(test)]
mod tests;
