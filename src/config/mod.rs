//! Configuration management for the yield router.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ledger identities and deposit limits
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Drift check and tick cadence
    #[serde(default)]
    pub automation: AutomationConfig,
    /// Parameters of the lending-market strategy
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// SQLite snapshot storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// In-memory environment driven by the `run` command
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Identity allowed to create pools, toggle them and run privileged operations
    #[serde(default = "default_controller")]
    pub controller: String,
    /// Account that holds assets in transit between depositors and strategies
    #[serde(default = "default_custody_account")]
    pub custody_account: String,
    /// Minimum deposit in base units
    #[serde(default = "default_min_deposit")]
    pub min_deposit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Drift (in bps) a pool must exceed to be selected for rebalancing
    #[serde(default = "default_drift_threshold_bps")]
    pub drift_threshold_bps: u16,
    /// Seconds between scheduler ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Minimum amount the strategy accepts per deposit, in base units
    #[serde(default = "default_strategy_min_deposit")]
    pub min_deposit: u64,
    /// Minimum seconds between two rebalances of one strategy
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Target changes larger than this (in bps) rebalance immediately
    #[serde(default = "default_rebalance_trigger_bps")]
    pub rebalance_trigger_bps: u16,
    /// Target allocation for newly created strategies (bps)
    #[serde(default = "default_target_bps")]
    pub default_target_bps: u16,
    /// Oldest acceptable price reading for valuations
    #[serde(default = "default_max_price_age")]
    pub max_price_age_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path of the SQLite database
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Pools to create at startup
    #[serde(default = "default_simulated_pools")]
    pub pools: Vec<SimulatedPool>,
    /// Yield credited to every lending position per tick (bps)
    #[serde(default = "default_yield_bps_per_tick")]
    pub yield_bps_per_tick: u32,
    /// Number of depositors seeded into each pool
    #[serde(default = "default_depositors")]
    pub depositors: u32,
    /// Deposit made by each seeded depositor, in whole tokens
    #[serde(default = "default_seed_deposit")]
    pub seed_deposit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedPool {
    pub asset: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    #[serde(default = "default_target_bps")]
    pub target_bps: u16,
    /// USD price of one whole token
    #[serde(default = "default_price")]
    pub price: Decimal,
}

/// Upper bound for configured durations (one year)
const MAX_DURATION_SECS: u64 = 365 * 24 * 3600;

// Default value functions
fn default_controller() -> String {
    "controller".to_string()
}

fn default_custody_account() -> String {
    "vault-custody".to_string()
}

fn default_min_deposit() -> u64 {
    100
}

fn default_drift_threshold_bps() -> u16 {
    500 // 5% drift triggers a rebalance
}

fn default_tick_interval() -> u64 {
    60
}

fn default_strategy_min_deposit() -> u64 {
    100
}

fn default_cooldown() -> u64 {
    3600 // One interval between rebalances
}

fn default_rebalance_trigger_bps() -> u16 {
    1000
}

fn default_target_bps() -> u16 {
    8000 // 80% deployed, 20% idle buffer
}

fn default_max_price_age() -> u64 {
    3600
}

fn default_db_path() -> String {
    "data/vault_state.db".to_string()
}

fn default_simulated_pools() -> Vec<SimulatedPool> {
    vec![
        SimulatedPool {
            asset: "USDC".to_string(),
            decimals: default_decimals(),
            target_bps: 8000,
            price: Decimal::ONE,
        },
        SimulatedPool {
            asset: "DAI".to_string(),
            decimals: default_decimals(),
            target_bps: 7000,
            price: Decimal::ONE,
        },
    ]
}

fn default_yield_bps_per_tick() -> u32 {
    25
}

fn default_depositors() -> u32 {
    3
}

fn default_seed_deposit() -> u64 {
    10_000
}

fn default_decimals() -> u32 {
    6
}

fn default_price() -> Decimal {
    Decimal::ONE
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("YR"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.ledger.controller.is_empty() && !self.ledger.custody_account.is_empty(),
            "controller and custody_account must be set"
        );

        anyhow::ensure!(
            self.ledger.controller != self.ledger.custody_account,
            "controller and custody_account must differ"
        );

        anyhow::ensure!(
            self.ledger.min_deposit >= self.strategy.min_deposit,
            "ledger min_deposit ({}) must be at least strategy min_deposit ({})",
            self.ledger.min_deposit,
            self.strategy.min_deposit
        );

        anyhow::ensure!(
            self.automation.drift_threshold_bps <= 10_000,
            "drift_threshold_bps must be between 0 and 10000"
        );

        anyhow::ensure!(
            self.automation.tick_interval_secs > 0,
            "tick_interval_secs must be positive"
        );

        anyhow::ensure!(
            self.strategy.default_target_bps <= 10_000
                && self.strategy.rebalance_trigger_bps <= 10_000,
            "strategy allocations must be between 0 and 10000 bps"
        );

        anyhow::ensure!(
            self.strategy.cooldown_secs <= MAX_DURATION_SECS
                && self.strategy.max_price_age_secs <= MAX_DURATION_SECS,
            "cooldown_secs and max_price_age_secs must not exceed {} seconds",
            MAX_DURATION_SECS
        );

        for pool in &self.simulation.pools {
            anyhow::ensure!(!pool.asset.is_empty(), "simulated pool asset must be set");
            anyhow::ensure!(
                pool.target_bps <= 10_000,
                "target_bps of {} must be between 0 and 10000",
                pool.asset
            );
            anyhow::ensure!(pool.decimals <= 18, "decimals of {} must be <= 18", pool.asset);
        }

        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            controller: default_controller(),
            custody_account: default_custody_account(),
            min_deposit: default_min_deposit(),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            drift_threshold_bps: default_drift_threshold_bps(),
            tick_interval_secs: default_tick_interval(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_deposit: default_strategy_min_deposit(),
            cooldown_secs: default_cooldown(),
            rebalance_trigger_bps: default_rebalance_trigger_bps(),
            default_target_bps: default_target_bps(),
            max_price_age_secs: default_max_price_age(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pools: default_simulated_pools(),
            yield_bps_per_tick: default_yield_bps_per_tick(),
            depositors: default_depositors(),
            seed_deposit: default_seed_deposit(),
        }
    }
}
