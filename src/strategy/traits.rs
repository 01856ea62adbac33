//! Strategy adapter interface.
//!
//! A strategy adapter binds one pool to one external yield source. The ledger
//! only ever talks to yield sources through this trait; concrete adapters are
//! injected at pool creation.

use crate::error::StrategyError;
use crate::external::AccountId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a rebalance did to the adapter's allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "amount")]
pub enum RebalanceAction {
    /// Allocation already on target (or nothing to move)
    None,
    /// Pulled funds out of the yield source into the idle buffer
    Withdrew(u128),
    /// Supplied idle funds to the yield source
    Supplied(u128),
}

impl fmt::Display for RebalanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceAction::None => write!(f, "none"),
            RebalanceAction::Withdrew(amount) => write!(f, "withdrew {amount}"),
            RebalanceAction::Supplied(amount) => write!(f, "supplied {amount}"),
        }
    }
}

/// Result of a completed rebalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceOutcome {
    pub strategy_id: String,
    pub action: RebalanceAction,
    /// Allocation before the rebalance
    pub from_bps: u16,
    /// Allocation after the rebalance
    pub to_bps: u16,
    pub target_bps: u16,
    /// Total value managed by the adapter after the rebalance
    pub total_value: u128,
    pub executed_at: DateTime<Utc>,
}

/// Result of a target allocation change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUpdate {
    pub previous_bps: u16,
    pub new_bps: u16,
    /// Present when the change was large enough to rebalance immediately and
    /// the cooldown allowed it.
    pub rebalance: Option<RebalanceOutcome>,
}

/// Rebalance sub-state of an adapter.
///
/// `Idle → CooldownElapsed → Rebalancing → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalancePhase {
    /// Cooldown still running since the last rebalance
    Idle,
    /// A rebalance may run
    CooldownElapsed,
    /// A rebalance is executing
    Rebalancing,
}

/// Capability set of a yield strategy.
///
/// Amounts are integer base units of the strategy's asset; allocations are
/// basis points in `0..=10000` of the adapter's total value that is deployed
/// into the yield source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StrategyAdapter: Send + Sync {
    /// Stable identifier of this adapter instance.
    fn strategy_id(&self) -> String;

    /// Asset the adapter manages.
    fn asset_id(&self) -> String;

    /// Token account the adapter pulls deposits with; the vault approves it.
    fn account(&self) -> AccountId;

    /// Pull `amount` from the vault custody account (pre-approved) and put it to work.
    async fn deposit(&self, amount: u128) -> Result<(), StrategyError>;

    /// Release `amount` back to the vault custody account. Returns the amount released.
    async fn withdraw(&self, amount: u128) -> Result<u128, StrategyError>;

    /// Take back funds released for a withdrawal that was aborted.
    ///
    /// Pulls `amount` from the vault custody account like `deposit`, but
    /// skips the minimum-deposit check and must not fail once the funds are
    /// held by the adapter.
    async fn reinvest(&self, amount: u128) -> Result<(), StrategyError>;

    async fn current_allocation_bps(&self) -> Result<u16, StrategyError>;

    async fn target_allocation_bps(&self) -> Result<u16, StrategyError>;

    /// Move funds so the current allocation approaches the target.
    async fn rebalance(&self) -> Result<RebalanceOutcome, StrategyError>;

    /// Everything the adapter manages: idle funds plus the yield source position.
    async fn total_value(&self) -> Result<u128, StrategyError>;

    /// Sweep the entire position to the privileged recipient, bypassing
    /// accounting checks. Returns the amount swept.
    async fn emergency_withdraw(&self, caller: &AccountId) -> Result<u128, StrategyError>;

    /// Privileged target change.
    async fn set_target_allocation_bps(
        &self,
        caller: &AccountId,
        bps: u16,
    ) -> Result<TargetUpdate, StrategyError>;
}
