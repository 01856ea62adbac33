//! Yield strategies.
//!
//! Contains:
//! - The `StrategyAdapter` capability interface the ledger drives
//! - Basis-point allocation arithmetic
//! - `AaveStrategy`, an adapter over an Aave-style lending market

mod aave;
pub mod allocation;
mod traits;

pub use aave::{AaveStrategy, StrategyAccounts};
pub use traits::{
    RebalanceAction, RebalanceOutcome, RebalancePhase, StrategyAdapter, TargetUpdate,
};

#[cfg(test)]
pub use traits::MockStrategyAdapter;
