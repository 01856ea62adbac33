//! The vault ledger.
//!
//! Every mutating operation runs under the [`OperationLock`], validates before
//! touching state, commits its ledger mutation before calling out to the
//! adapter or the asset, and restores the pre-operation pool and position if
//! any outbound step fails.

use super::ids::{derive_pool_id, pool_salt};
use super::lock::OperationLock;
use super::math::{assets_for_shares, shares_for_deposit};
use super::types::{
    EmergencyReport, InvariantViolation, LedgerSnapshot, Pool, PoolId, Position, RebalanceReport,
};
use crate::config::LedgerConfig;
use crate::error::{VaultError, VaultResult};
use crate::external::{AccountId, FungibleAsset};
use crate::strategy::allocation::MAX_BPS;
use crate::strategy::{StrategyAdapter, TargetUpdate};
use crate::utils::decimal::share_price;
use crate::utils::Clock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Identities and limits of a ledger instance.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Privileged identity
    pub controller: AccountId,
    /// Account holding assets between depositors and adapters
    pub custody: AccountId,
    /// Minimum deposit in base units
    pub min_deposit: u128,
}

impl From<&LedgerConfig> for LedgerSettings {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            controller: AccountId::new(config.controller.clone()),
            custody: AccountId::new(config.custody_account.clone()),
            min_deposit: u128::from(config.min_deposit),
        }
    }
}

/// Adapter and asset a pool is bound to for its lifetime.
#[derive(Clone)]
struct PoolBinding {
    adapter: Arc<dyn StrategyAdapter>,
    asset: Arc<dyn FungibleAsset>,
}

#[derive(Default)]
struct LedgerState {
    pools: HashMap<PoolId, Pool>,
    /// Creation order; automation scans pools in this order
    order: Vec<PoolId>,
    bindings: HashMap<PoolId, PoolBinding>,
    positions: HashMap<(PoolId, AccountId), Position>,
    nonce: u64,
}

impl LedgerState {
    fn pool(&self, pool_id: &PoolId) -> VaultResult<&Pool> {
        self.pools
            .get(pool_id)
            .ok_or_else(|| VaultError::PoolNotFound(pool_id.clone()))
    }

    fn pool_mut(&mut self, pool_id: &PoolId) -> VaultResult<&mut Pool> {
        self.pools
            .get_mut(pool_id)
            .ok_or_else(|| VaultError::PoolNotFound(pool_id.clone()))
    }

    fn binding(&self, pool_id: &PoolId) -> VaultResult<PoolBinding> {
        self.bindings
            .get(pool_id)
            .cloned()
            .ok_or_else(|| VaultError::PoolNotFound(pool_id.clone()))
    }
}

/// Pre-mutation copy used to roll an operation back.
struct Undo {
    pool: Pool,
    owner: AccountId,
    position: Option<Position>,
}

/// Per-pool share/asset ledger.
pub struct VaultLedger {
    settings: LedgerSettings,
    clock: Arc<dyn Clock>,
    state: RwLock<LedgerState>,
    lock: OperationLock,
}

impl VaultLedger {
    pub fn new(settings: LedgerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            state: RwLock::new(LedgerState::default()),
            lock: OperationLock::new(),
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Account depositors approve before depositing.
    pub fn custody_account(&self) -> &AccountId {
        &self.settings.custody
    }

    // ==================== Administration ====================

    /// Register a pool bound to `strategy` for `asset`. Controller only.
    pub async fn create_pool(
        &self,
        caller: &AccountId,
        strategy: Arc<dyn StrategyAdapter>,
        asset: Arc<dyn FungibleAsset>,
    ) -> VaultResult<PoolId> {
        self.lock
            .run(async {
                self.ensure_controller(caller)?;

                let strategy_id = strategy.strategy_id();
                let asset_id = asset.asset_id();
                if strategy_id.is_empty() {
                    return Err(VaultError::InvalidReference("empty strategy id".into()));
                }
                if asset_id.is_empty() {
                    return Err(VaultError::InvalidReference("empty asset id".into()));
                }
                let strategy_asset = strategy.asset_id();
                if strategy_asset != asset_id {
                    return Err(VaultError::UnsupportedAsset {
                        expected: asset_id,
                        supplied: strategy_asset,
                    });
                }

                let target_bps = strategy
                    .target_allocation_bps()
                    .await
                    .map_err(|e| VaultError::from_strategy("target allocation", e))?;

                let mut state = self.state.write().await;
                if state
                    .pools
                    .values()
                    .any(|pool| pool.strategy_id == strategy_id)
                {
                    return Err(VaultError::StrategyAlreadyBound(strategy_id));
                }

                let pool_id = derive_pool_id(caller, &pool_salt(&strategy_id, &asset_id, state.nonce));
                state.nonce += 1;

                let pool = Pool {
                    id: pool_id.clone(),
                    strategy_id,
                    asset_id,
                    total_shares: 0,
                    total_assets: 0,
                    active: true,
                    target_allocation_bps: target_bps.min(MAX_BPS),
                    last_rebalance_time: None,
                    created_at: self.clock.now(),
                };

                info!(
                    pool = %pool_id,
                    strategy = %pool.strategy_id,
                    asset = %pool.asset_id,
                    target_bps = pool.target_allocation_bps,
                    "Pool created"
                );

                state.pools.insert(pool_id.clone(), pool);
                state.order.push(pool_id.clone());
                state.bindings.insert(
                    pool_id.clone(),
                    PoolBinding {
                        adapter: strategy,
                        asset,
                    },
                );
                Ok(pool_id)
            })
            .await
    }

    /// Activate or deactivate a pool. Controller only.
    pub async fn set_pool_active(
        &self,
        caller: &AccountId,
        pool_id: &PoolId,
        active: bool,
    ) -> VaultResult<()> {
        self.lock
            .run(async {
                self.ensure_controller(caller)?;
                let mut state = self.state.write().await;
                let pool = state.pool_mut(pool_id)?;
                if pool.active != active {
                    pool.active = active;
                    info!(pool = %pool_id, active, "Pool status changed");
                }
                Ok(())
            })
            .await
    }

    /// Change a pool's target allocation through its adapter. Controller only.
    ///
    /// Large changes may rebalance immediately (adapter policy); the pool then
    /// records the rebalance and the refreshed total.
    pub async fn set_target_allocation(
        &self,
        caller: &AccountId,
        pool_id: &PoolId,
        bps: u16,
    ) -> VaultResult<TargetUpdate> {
        self.lock
            .run(async {
                self.ensure_controller(caller)?;
                if bps > MAX_BPS {
                    return Err(VaultError::InvalidAllocation(u32::from(bps)));
                }
                let binding = self.state.read().await.binding(pool_id)?;

                let update = binding
                    .adapter
                    .set_target_allocation_bps(caller, bps)
                    .await
                    .map_err(|e| VaultError::from_strategy("set target allocation", e))?;

                let mut state = self.state.write().await;
                let pool = state.pool_mut(pool_id)?;
                pool.target_allocation_bps = update.new_bps;
                if let Some(outcome) = &update.rebalance {
                    pool.last_rebalance_time = Some(outcome.executed_at);
                    pool.total_assets = outcome.total_value;
                }
                info!(
                    pool = %pool_id,
                    previous_bps = update.previous_bps,
                    new_bps = update.new_bps,
                    rebalanced = update.rebalance.is_some(),
                    "Pool target allocation updated"
                );
                Ok(update)
            })
            .await
    }

    /// Refresh a pool's total assets from its adapter. Controller only.
    ///
    /// This is how accrued yield reaches the share price.
    pub async fn sync_total_assets(&self, caller: &AccountId, pool_id: &PoolId) -> VaultResult<u128> {
        self.lock
            .run(async {
                self.ensure_controller(caller)?;
                let binding = self.state.read().await.binding(pool_id)?;
                let total = binding
                    .adapter
                    .total_value()
                    .await
                    .map_err(|e| VaultError::from_strategy("total value", e))?;

                let mut state = self.state.write().await;
                let pool = state.pool_mut(pool_id)?;
                let previous = pool.total_assets;
                pool.total_assets = total;
                debug!(pool = %pool_id, previous, total, "Pool total assets synced");
                Ok(total)
            })
            .await
    }

    /// Sweep a pool's strategy to the privileged recipient and deactivate the pool.
    /// Controller only.
    ///
    /// Total assets are reset to what the adapter still holds afterwards, which
    /// is not necessarily zero.
    pub async fn emergency_exit(
        &self,
        caller: &AccountId,
        pool_id: &PoolId,
    ) -> VaultResult<EmergencyReport> {
        self.lock
            .run(async {
                self.ensure_controller(caller)?;
                let binding = self.state.read().await.binding(pool_id)?;

                let swept = binding
                    .adapter
                    .emergency_withdraw(caller)
                    .await
                    .map_err(|e| VaultError::from_strategy("emergency withdraw", e))?;
                let remaining = binding
                    .adapter
                    .total_value()
                    .await
                    .map_err(|e| VaultError::from_strategy("total value", e))?;

                let mut state = self.state.write().await;
                let pool = state.pool_mut(pool_id)?;
                pool.total_assets = remaining;
                pool.active = false;

                warn!(
                    pool = %pool_id,
                    swept,
                    remaining,
                    total_shares = pool.total_shares,
                    "Emergency exit: pool deactivated"
                );
                Ok(EmergencyReport { swept, remaining })
            })
            .await
    }

    // ==================== Deposits & Withdrawals ====================

    /// Deposit `amount` of `asset_id` into a pool. Returns the shares minted.
    ///
    /// The caller must have approved the custody account for `amount`.
    pub async fn deposit(
        &self,
        caller: &AccountId,
        pool_id: &PoolId,
        asset_id: &str,
        amount: u128,
    ) -> VaultResult<u128> {
        self.lock
            .run(self.deposit_inner(caller, pool_id, asset_id, amount))
            .await
    }

    async fn deposit_inner(
        &self,
        caller: &AccountId,
        pool_id: &PoolId,
        asset_id: &str,
        amount: u128,
    ) -> VaultResult<u128> {
        let (binding, shares) = {
            let state = self.state.read().await;
            let pool = state.pool(pool_id)?;
            if !pool.active {
                return Err(VaultError::PoolInactive(pool_id.clone()));
            }
            if amount < self.settings.min_deposit {
                return Err(VaultError::AmountTooSmall {
                    amount,
                    minimum: self.settings.min_deposit,
                });
            }
            if asset_id != pool.asset_id {
                return Err(VaultError::UnsupportedAsset {
                    expected: pool.asset_id.clone(),
                    supplied: asset_id.to_string(),
                });
            }
            if pool.total_shares > 0 && pool.total_assets == 0 {
                return Err(VaultError::Insolvent(pool_id.clone()));
            }
            let shares = shares_for_deposit(amount, pool.total_shares, pool.total_assets)
                .ok_or(VaultError::ArithmeticOverflow)?;
            if shares == 0 {
                return Err(VaultError::ZeroShares { amount });
            }
            (state.binding(pool_id)?, shares)
        };

        let custody = &self.settings.custody;
        binding
            .asset
            .transfer_from(custody, caller, custody, amount)
            .await
            .map_err(|e| VaultError::from_external("asset pull", e))?;

        let undo = self
            .commit(pool_id, caller, |pool, position| {
                let total_shares = pool.total_shares.checked_add(shares)?;
                let total_assets = pool.total_assets.checked_add(amount)?;
                pool.total_shares = total_shares;
                pool.total_assets = total_assets;
                position.shares += shares;
                position.last_deposit_time = self.clock.now();
                Some(())
            })
            .await;
        let undo = match undo {
            Ok(undo) => undo,
            Err(e) => {
                self.refund(&binding, caller, amount).await;
                return Err(e);
            }
        };

        if let Err(e) = self.forward_to_adapter(&binding, amount).await {
            warn!(pool = %pool_id, %caller, amount, error = %e, "Deposit rolled back");
            self.restore(undo).await;
            self.refund(&binding, caller, amount).await;
            return Err(e);
        }

        info!(pool = %pool_id, %caller, amount, shares, "Deposit committed");
        Ok(shares)
    }

    /// Burn `shares` from the caller's position in a pool. Returns the amount paid out.
    pub async fn withdraw(
        &self,
        caller: &AccountId,
        pool_id: &PoolId,
        shares: u128,
    ) -> VaultResult<u128> {
        self.lock
            .run(self.withdraw_inner(caller, pool_id, shares))
            .await
    }

    async fn withdraw_inner(
        &self,
        caller: &AccountId,
        pool_id: &PoolId,
        shares: u128,
    ) -> VaultResult<u128> {
        let (binding, amount) = {
            let state = self.state.read().await;
            let pool = state.pool(pool_id)?;
            if !pool.active {
                return Err(VaultError::PoolInactive(pool_id.clone()));
            }
            let held = state
                .positions
                .get(&(pool_id.clone(), caller.clone()))
                .map_or(0, |position| position.shares);
            if shares > held {
                return Err(VaultError::InsufficientShares {
                    requested: shares,
                    held,
                });
            }
            let amount = assets_for_shares(shares, pool.total_shares, pool.total_assets)
                .ok_or(VaultError::ArithmeticOverflow)?;
            if amount == 0 {
                return Err(VaultError::ZeroPayout { shares });
            }
            (state.binding(pool_id)?, amount)
        };

        let undo = self
            .commit(pool_id, caller, |pool, position| {
                pool.total_shares = pool.total_shares.checked_sub(shares)?;
                pool.total_assets = pool.total_assets.checked_sub(amount)?;
                position.shares = position.shares.checked_sub(shares)?;
                Some(())
            })
            .await?;

        let released = match binding.adapter.withdraw(amount).await {
            Ok(released) => released,
            Err(e) => {
                warn!(pool = %pool_id, %caller, amount, error = %e, "Withdrawal rolled back");
                self.restore(undo).await;
                return Err(VaultError::from_strategy("strategy withdraw", e));
            }
        };

        if released != amount {
            warn!(pool = %pool_id, %caller, amount, released, "Strategy released the wrong amount");
            let returned = released == 0 || self.return_to_adapter(&binding, released).await;
            self.rollback_withdrawal(&binding, undo, returned).await;
            return Err(VaultError::ExternalCallFailure(format!(
                "strategy released {released} of {amount}"
            )));
        }

        if let Err(e) = binding
            .asset
            .transfer(&self.settings.custody, caller, amount)
            .await
        {
            warn!(pool = %pool_id, %caller, amount, error = %e, "Payout failed, withdrawal rolled back");
            let returned = self.return_to_adapter(&binding, amount).await;
            self.rollback_withdrawal(&binding, undo, returned).await;
            return Err(VaultError::from_external("payout transfer", e));
        }

        info!(pool = %pool_id, %caller, shares, amount, "Withdrawal committed");
        Ok(amount)
    }

    // ==================== Automation ====================

    /// Rebalance one pool's strategy and refresh the pool from it.
    pub async fn rebalance_pool(&self, pool_id: &PoolId) -> VaultResult<RebalanceReport> {
        self.lock
            .run(async {
                let (binding, total_assets_before) = {
                    let state = self.state.read().await;
                    let pool = state.pool(pool_id)?;
                    if !pool.active {
                        return Err(VaultError::PoolInactive(pool_id.clone()));
                    }
                    (state.binding(pool_id)?, pool.total_assets)
                };

                let outcome = binding
                    .adapter
                    .rebalance()
                    .await
                    .map_err(|e| VaultError::from_strategy("rebalance", e))?;

                // Funds already moved; totals catch up on the next sync.
                let total_assets_after = match binding.adapter.total_value().await {
                    Ok(total) => total,
                    Err(e) => {
                        warn!(pool = %pool_id, error = %e, "Could not refresh total assets after rebalance");
                        total_assets_before
                    }
                };

                let mut state = self.state.write().await;
                let pool = state.pool_mut(pool_id)?;
                pool.total_assets = total_assets_after;
                pool.target_allocation_bps = outcome.target_bps;
                pool.last_rebalance_time = Some(outcome.executed_at);

                info!(
                    pool = %pool_id,
                    action = %outcome.action,
                    from_bps = outcome.from_bps,
                    to_bps = outcome.to_bps,
                    total_assets_before,
                    total_assets_after,
                    "Pool rebalanced"
                );

                Ok(RebalanceReport {
                    pool_id: pool_id.clone(),
                    outcome,
                    total_assets_before,
                    total_assets_after,
                })
            })
            .await
    }

    /// Active pools with their adapters, in creation order.
    pub async fn active_bindings(&self) -> Vec<(PoolId, Arc<dyn StrategyAdapter>)> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter(|id| state.pools.get(*id).is_some_and(|pool| pool.active))
            .filter_map(|id| {
                state
                    .bindings
                    .get(id)
                    .map(|binding| (id.clone(), binding.adapter.clone()))
            })
            .collect()
    }

    // ==================== Queries ====================

    pub async fn pool(&self, pool_id: &PoolId) -> VaultResult<Pool> {
        self.state.read().await.pool(pool_id).cloned()
    }

    /// All pools in creation order.
    pub async fn pools(&self) -> Vec<Pool> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.pools.get(id).cloned())
            .collect()
    }

    pub async fn adapter(&self, pool_id: &PoolId) -> VaultResult<Arc<dyn StrategyAdapter>> {
        Ok(self.state.read().await.binding(pool_id)?.adapter)
    }

    pub async fn position(&self, pool_id: &PoolId, owner: &AccountId) -> Option<Position> {
        self.state
            .read()
            .await
            .positions
            .get(&(pool_id.clone(), owner.clone()))
            .cloned()
    }

    /// Positions in a pool, zero-share tombstones included.
    pub async fn positions_in(&self, pool_id: &PoolId) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .state
            .read()
            .await
            .positions
            .values()
            .filter(|position| &position.pool_id == pool_id)
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.owner.cmp(&b.owner));
        positions
    }

    /// Assets per share.
    pub async fn share_price(&self, pool_id: &PoolId) -> VaultResult<Decimal> {
        let state = self.state.read().await;
        let pool = state.pool(pool_id)?;
        Ok(share_price(pool.total_assets, pool.total_shares))
    }

    /// Shares a deposit of `amount` would mint right now.
    pub async fn preview_deposit(&self, pool_id: &PoolId, amount: u128) -> VaultResult<u128> {
        let state = self.state.read().await;
        let pool = state.pool(pool_id)?;
        if pool.total_shares > 0 && pool.total_assets == 0 {
            return Err(VaultError::Insolvent(pool_id.clone()));
        }
        shares_for_deposit(amount, pool.total_shares, pool.total_assets)
            .ok_or(VaultError::ArithmeticOverflow)
    }

    /// Assets burning `shares` would pay out right now.
    pub async fn preview_withdraw(&self, pool_id: &PoolId, shares: u128) -> VaultResult<u128> {
        let state = self.state.read().await;
        let pool = state.pool(pool_id)?;
        assets_for_shares(shares, pool.total_shares, pool.total_assets)
            .ok_or(VaultError::ArithmeticOverflow)
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read().await;
        let pools = state
            .order
            .iter()
            .filter_map(|id| state.pools.get(id).cloned())
            .collect();
        let mut positions: Vec<Position> = state.positions.values().cloned().collect();
        positions.sort_by(|a, b| (&a.pool_id, &a.owner).cmp(&(&b.pool_id, &b.owner)));

        LedgerSnapshot {
            taken_at: self.clock.now(),
            pools,
            positions,
        }
    }

    /// Check the share-sum and allocation-range invariants of every pool.
    pub async fn check_invariants(&self) -> Vec<InvariantViolation> {
        let state = self.state.read().await;
        let mut violations = Vec::new();

        for pool_id in &state.order {
            let Some(pool) = state.pools.get(pool_id) else {
                continue;
            };
            let position_sum: u128 = state
                .positions
                .values()
                .filter(|position| &position.pool_id == pool_id)
                .map(|position| position.shares)
                .sum();
            if position_sum != pool.total_shares {
                violations.push(InvariantViolation::ShareSumMismatch {
                    pool_id: pool_id.clone(),
                    position_sum,
                    total_shares: pool.total_shares,
                });
            }
            if pool.target_allocation_bps > MAX_BPS {
                violations.push(InvariantViolation::TargetOutOfRange {
                    pool_id: pool_id.clone(),
                    bps: pool.target_allocation_bps,
                });
            }
        }

        violations
    }

    // ==================== Internals ====================

    fn ensure_controller(&self, caller: &AccountId) -> VaultResult<()> {
        if caller == &self.settings.controller {
            Ok(())
        } else {
            Err(VaultError::Unauthorized {
                caller: caller.to_string(),
            })
        }
    }

    /// Apply `mutate` to the pool and the caller's position (created on demand),
    /// returning what is needed to undo it. Nothing changes if `mutate` returns `None`.
    async fn commit<F>(&self, pool_id: &PoolId, owner: &AccountId, mutate: F) -> VaultResult<Undo>
    where
        F: FnOnce(&mut Pool, &mut Position) -> Option<()>,
    {
        let mut state = self.state.write().await;
        let key = (pool_id.clone(), owner.clone());

        let previous_pool = state.pool(pool_id)?.clone();
        let previous_position = state.positions.get(&key).cloned();

        let mut pool = previous_pool.clone();
        let mut position = previous_position.clone().unwrap_or_else(|| Position {
            pool_id: pool_id.clone(),
            owner: owner.clone(),
            shares: 0,
            last_deposit_time: self.clock.now(),
        });
        mutate(&mut pool, &mut position).ok_or(VaultError::ArithmeticOverflow)?;

        state.pools.insert(pool_id.clone(), pool);
        state.positions.insert(key, position);

        Ok(Undo {
            pool: previous_pool,
            owner: owner.clone(),
            position: previous_position,
        })
    }

    async fn restore(&self, undo: Undo) {
        let mut state = self.state.write().await;
        let key = (undo.pool.id.clone(), undo.owner);
        match undo.position {
            Some(position) => {
                state.positions.insert(key, position);
            }
            None => {
                state.positions.remove(&key);
            }
        }
        state.pools.insert(undo.pool.id.clone(), undo.pool);
    }

    async fn forward_to_adapter(&self, binding: &PoolBinding, amount: u128) -> VaultResult<()> {
        self.approve_adapter(binding, amount).await?;
        if let Err(e) = binding.adapter.deposit(amount).await {
            self.clear_adapter_approval(binding).await;
            return Err(VaultError::from_strategy("strategy deposit", e));
        }
        Ok(())
    }

    async fn approve_adapter(&self, binding: &PoolBinding, amount: u128) -> VaultResult<()> {
        binding
            .asset
            .approve(&self.settings.custody, &binding.adapter.account(), amount)
            .await
            .map_err(|e| VaultError::from_external("adapter approval", e))
    }

    async fn clear_adapter_approval(&self, binding: &PoolBinding) {
        if let Err(e) = binding
            .asset
            .approve(&self.settings.custody, &binding.adapter.account(), 0)
            .await
        {
            warn!(error = %e, "Failed to clear adapter approval");
        }
    }

    /// Send funds pulled from a depositor back to them.
    async fn refund(&self, binding: &PoolBinding, depositor: &AccountId, amount: u128) {
        if let Err(e) = binding
            .asset
            .transfer(&self.settings.custody, depositor, amount)
            .await
        {
            error!(%depositor, amount, error = %e, "Refund failed, funds remain in custody");
        }
    }

    /// Put funds released for an aborted withdrawal back into the strategy.
    /// Returns `false` if they are still in custody.
    async fn return_to_adapter(&self, binding: &PoolBinding, amount: u128) -> bool {
        let result = match self.approve_adapter(binding, amount).await {
            Ok(()) => binding
                .adapter
                .reinvest(amount)
                .await
                .map_err(|e| VaultError::from_strategy("strategy reinvest", e)),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.clear_adapter_approval(binding).await;
                error!(
                    strategy = %binding.adapter.strategy_id(),
                    amount,
                    error = %e,
                    "Could not return funds to strategy, funds remain in custody"
                );
                false
            }
        }
    }

    /// Undo a withdrawal. If the released funds never made it back, total
    /// assets follow what the adapter actually holds instead of the old total.
    async fn rollback_withdrawal(&self, binding: &PoolBinding, undo: Undo, returned: bool) {
        let pool_id = undo.pool.id.clone();
        self.restore(undo).await;
        if returned {
            return;
        }

        match binding.adapter.total_value().await {
            Ok(held) => {
                let mut state = self.state.write().await;
                if let Ok(pool) = state.pool_mut(&pool_id) {
                    error!(
                        pool = %pool_id,
                        recorded = pool.total_assets,
                        held,
                        "Withdrawal compensation incomplete, total assets reset to strategy value"
                    );
                    pool.total_assets = held;
                }
            }
            Err(e) => {
                error!(pool = %pool_id, error = %e, "Withdrawal compensation incomplete and strategy value unreadable");
            }
        }
    }
}
