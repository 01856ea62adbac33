//! # Yield Router
//!
//! A share-based yield vault: depositors hold shares of per-asset pools, each
//! pool forwards its assets to one pluggable yield strategy, and an automation
//! gate rebalances strategies whose allocation drifts from target.
//!
//! ## Architecture
//!
//! - `ledger`: Pools, positions, share accounting and the operation lock
//! - `strategy`: Strategy adapter interface and the lending-market adapter
//! - `automation`: Drift check/act gate and the periodic scheduler
//! - `external`: Token, yield source and price feed interfaces with in-memory implementations
//! - `config`: Configuration management and validation
//! - `persistence`: SQLite-based snapshots and tick history
//! - `utils`: Clocks and decimal helpers

pub mod automation;
pub mod config;
pub mod error;
pub mod external;
pub mod ledger;
pub mod persistence;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::{StrategyError, VaultError, VaultResult};
