//! Lending-market strategy (Aave-style).
//!
//! Keeps `target_bps` of its managed value supplied to the lending market and
//! the remainder idle in its own token account, so small withdrawals are paid
//! without touching the market.

use super::allocation::{allocation_bps, drift_bps, excess_or_deficit, target_portion, MAX_BPS};
use super::traits::{
    RebalanceAction, RebalanceOutcome, RebalancePhase, StrategyAdapter, TargetUpdate,
};
use crate::config::StrategyConfig;
use crate::error::{ExternalError, StrategyError};
use crate::external::{AccountId, FungibleAsset, PriceFeed, YieldSource};
use crate::utils::decimal::to_units;
use crate::utils::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Seconds from config as a duration, saturating at the largest representable one.
fn config_duration(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Accounts an adapter works with.
#[derive(Debug, Clone)]
pub struct StrategyAccounts {
    /// The adapter's own token account (holds idle funds, owns the market position)
    pub account: AccountId,
    /// Privileged identity: target changes and emergency withdrawals
    pub owner: AccountId,
    /// Vault custody account deposits come from and withdrawals go to
    pub vault: AccountId,
}

#[derive(Debug)]
struct AdapterState {
    target_bps: u16,
    last_rebalance: Option<DateTime<Utc>>,
    rebalancing: bool,
}

/// Allocation snapshot read from the token and the market.
#[derive(Debug, Clone, Copy)]
struct Holdings {
    idle: u128,
    supplied: u128,
}

impl Holdings {
    fn total(&self) -> u128 {
        self.idle.saturating_add(self.supplied)
    }
}

/// Strategy adapter over a lending market.
pub struct AaveStrategy {
    id: String,
    accounts: StrategyAccounts,
    token: Arc<dyn FungibleAsset>,
    market: Arc<dyn YieldSource>,
    clock: Arc<dyn Clock>,
    config: StrategyConfig,
    state: RwLock<AdapterState>,
    price_feed: Option<Arc<dyn PriceFeed>>,
}

impl AaveStrategy {
    /// Create a new adapter targeting `config.default_target_bps`.
    pub fn new(
        id: impl Into<String>,
        accounts: StrategyAccounts,
        token: Arc<dyn FungibleAsset>,
        market: Arc<dyn YieldSource>,
        clock: Arc<dyn Clock>,
        config: StrategyConfig,
    ) -> Self {
        let target_bps = config.default_target_bps.min(MAX_BPS);
        Self {
            id: id.into(),
            accounts,
            token,
            market,
            clock,
            config,
            state: RwLock::new(AdapterState {
                target_bps,
                last_rebalance: None,
                rebalancing: false,
            }),
            price_feed: None,
        }
    }

    /// Start from a specific target instead of the configured default.
    pub fn with_target_bps(mut self, target_bps: u16) -> Self {
        self.state.get_mut().target_bps = target_bps.min(MAX_BPS);
        self
    }

    /// Enable USD valuations.
    pub fn with_price_feed(mut self, feed: Arc<dyn PriceFeed>) -> Self {
        self.price_feed = Some(feed);
        self
    }

    /// Current rebalance sub-state.
    pub async fn rebalance_phase(&self) -> RebalancePhase {
        let state = self.state.read().await;
        if state.rebalancing {
            RebalancePhase::Rebalancing
        } else if self.cooldown_remaining(&state).is_some() {
            RebalancePhase::Idle
        } else {
            RebalancePhase::CooldownElapsed
        }
    }

    pub async fn last_rebalance(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_rebalance
    }

    /// Value of everything the adapter manages, in USD.
    pub async fn valuation_usd(&self) -> Result<Decimal, StrategyError> {
        let asset = self.token.asset_id();
        let feed = self
            .price_feed
            .as_ref()
            .ok_or_else(|| ExternalError::PriceUnavailable(asset.clone()))?;

        let reading = feed.latest_price(&asset).await?;
        let age = self.clock.now() - reading.updated_at;
        if age > config_duration(self.config.max_price_age_secs) {
            return Err(StrategyError::StalePrice {
                asset,
                age_secs: age.num_seconds(),
            });
        }

        let total = self.holdings().await.total();
        to_units(total, self.token.decimals())
            .and_then(|units| units.checked_mul(reading.price))
            .ok_or(StrategyError::ValuationOverflow(asset))
    }

    fn cooldown_remaining(&self, state: &AdapterState) -> Option<i64> {
        let last = state.last_rebalance?;
        let now = self.clock.now();
        match last.checked_add_signed(config_duration(self.config.cooldown_secs)) {
            Some(ready_at) if now < ready_at => Some((ready_at - now).num_seconds().max(1)),
            Some(_) => None,
            None => Some(i64::MAX),
        }
    }

    async fn holdings(&self) -> Holdings {
        let asset = self.token.asset_id();
        Holdings {
            idle: self.token.balance_of(&self.accounts.account).await,
            supplied: self.market.balance_of(&asset, &self.accounts.account).await,
        }
    }

    fn allocation_of(holdings: Holdings, target_bps: u16) -> u16 {
        // An empty adapter has nothing to move, so it reports no drift.
        if holdings.total() == 0 {
            target_bps
        } else {
            allocation_bps(holdings.supplied, holdings.total())
        }
    }

    async fn supply(&self, amount: u128) -> Result<(), StrategyError> {
        let asset = self.token.asset_id();
        let market_account = self.market.account();
        self.token
            .approve(&self.accounts.account, &market_account, amount)
            .await?;

        if let Err(e) = self
            .market
            .supply(&self.accounts.account, &asset, amount, &self.accounts.account)
            .await
        {
            self.clear_market_approval().await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn clear_market_approval(&self) {
        let market_account = self.market.account();
        if let Err(e) = self
            .token
            .approve(&self.accounts.account, &market_account, 0)
            .await
        {
            warn!(strategy = %self.id, error = %e, "Failed to clear market approval");
        }
    }

    async fn pull_from_market(&self, amount: u128) -> Result<u128, StrategyError> {
        let asset = self.token.asset_id();
        let released = self
            .market
            .withdraw(&self.accounts.account, &asset, amount, &self.accounts.account)
            .await?;

        if released < amount {
            // Put back the partial release so the position is as before.
            if released > 0 {
                if let Err(e) = self.supply(released).await {
                    error!(strategy = %self.id, released, error = %e, "Failed to restore partial release");
                }
            }
            return Err(StrategyError::InsufficientLiquidity {
                requested: amount,
                available: released,
            });
        }
        Ok(released)
    }

    async fn execute_rebalance(&self, target_bps: u16) -> Result<RebalanceOutcome, StrategyError> {
        let before = self.holdings().await;
        let from_bps = Self::allocation_of(before, target_bps);
        let amount = excess_or_deficit(from_bps, target_bps, before.total());

        let action = if from_bps > target_bps {
            let amount = amount.min(before.supplied);
            if amount > 0 {
                self.pull_from_market(amount).await?;
                RebalanceAction::Withdrew(amount)
            } else {
                RebalanceAction::None
            }
        } else {
            let amount = amount.min(before.idle);
            if amount > 0 {
                self.supply(amount).await?;
                RebalanceAction::Supplied(amount)
            } else {
                RebalanceAction::None
            }
        };

        let after = self.holdings().await;
        Ok(RebalanceOutcome {
            strategy_id: self.id.clone(),
            action,
            from_bps,
            to_bps: Self::allocation_of(after, target_bps),
            target_bps,
            total_value: after.total(),
            executed_at: self.clock.now(),
        })
    }

    fn ensure_owner(&self, caller: &AccountId) -> Result<(), StrategyError> {
        if caller == &self.accounts.owner {
            Ok(())
        } else {
            Err(StrategyError::Unauthorized(caller.to_string()))
        }
    }
}

#[async_trait]
impl StrategyAdapter for AaveStrategy {
    fn strategy_id(&self) -> String {
        self.id.clone()
    }

    fn asset_id(&self) -> String {
        self.token.asset_id()
    }

    fn account(&self) -> AccountId {
        self.accounts.account.clone()
    }

    async fn deposit(&self, amount: u128) -> Result<(), StrategyError> {
        let minimum = u128::from(self.config.min_deposit);
        if amount < minimum {
            return Err(StrategyError::BelowMinimum { amount, minimum });
        }

        self.token
            .transfer_from(
                &self.accounts.account,
                &self.accounts.vault,
                &self.accounts.account,
                amount,
            )
            .await?;

        let target_bps = self.state.read().await.target_bps;
        let portion = target_portion(amount, target_bps);
        if portion > 0 {
            if let Err(e) = self.supply(portion).await {
                warn!(strategy = %self.id, amount, error = %e, "Supply failed, returning deposit");
                if let Err(refund) = self
                    .token
                    .transfer(&self.accounts.account, &self.accounts.vault, amount)
                    .await
                {
                    error!(strategy = %self.id, amount, error = %refund, "Failed to return deposit to vault");
                }
                return Err(e);
            }
        }

        info!(
            strategy = %self.id,
            amount,
            supplied = portion,
            idle = amount - portion,
            "Strategy deposit"
        );
        Ok(())
    }

    async fn reinvest(&self, amount: u128) -> Result<(), StrategyError> {
        self.token
            .transfer_from(
                &self.accounts.account,
                &self.accounts.vault,
                &self.accounts.account,
                amount,
            )
            .await?;

        let target_bps = self.state.read().await.target_bps;
        let portion = target_portion(amount, target_bps);
        if portion > 0 {
            // Idle funds still count towards total value; the next rebalance supplies them.
            if let Err(e) = self.supply(portion).await {
                warn!(strategy = %self.id, amount, error = %e, "Supply failed, reinvested funds left idle");
            }
        }

        info!(strategy = %self.id, amount, "Strategy reinvested released funds");
        Ok(())
    }

    async fn withdraw(&self, amount: u128) -> Result<u128, StrategyError> {
        let holdings = self.holdings().await;
        if amount > holdings.total() {
            return Err(StrategyError::InsufficientLiquidity {
                requested: amount,
                available: holdings.total(),
            });
        }

        let shortfall = amount.saturating_sub(holdings.idle);
        if shortfall > 0 {
            self.pull_from_market(shortfall).await?;
        }

        if let Err(e) = self
            .token
            .transfer(&self.accounts.account, &self.accounts.vault, amount)
            .await
        {
            if shortfall > 0 {
                if let Err(restore) = self.supply(shortfall).await {
                    error!(strategy = %self.id, shortfall, error = %restore, "Failed to re-supply after aborted withdrawal");
                }
            }
            return Err(e.into());
        }

        info!(
            strategy = %self.id,
            amount,
            from_idle = amount - shortfall,
            from_market = shortfall,
            "Strategy withdrawal"
        );
        Ok(amount)
    }

    async fn current_allocation_bps(&self) -> Result<u16, StrategyError> {
        let target_bps = self.state.read().await.target_bps;
        Ok(Self::allocation_of(self.holdings().await, target_bps))
    }

    async fn target_allocation_bps(&self) -> Result<u16, StrategyError> {
        Ok(self.state.read().await.target_bps)
    }

    async fn rebalance(&self) -> Result<RebalanceOutcome, StrategyError> {
        let target_bps = {
            let mut state = self.state.write().await;
            if state.rebalancing {
                return Err(StrategyError::RebalanceInProgress);
            }
            if let Some(remaining_secs) = self.cooldown_remaining(&state) {
                debug!(strategy = %self.id, remaining_secs, "Rebalance rejected by cooldown");
                return Err(StrategyError::CooldownActive { remaining_secs });
            }
            state.rebalancing = true;
            state.target_bps
        };

        let result = self.execute_rebalance(target_bps).await;

        let mut state = self.state.write().await;
        state.rebalancing = false;
        if let Ok(outcome) = &result {
            state.last_rebalance = Some(outcome.executed_at);
            info!(
                strategy = %self.id,
                action = %outcome.action,
                from_bps = outcome.from_bps,
                to_bps = outcome.to_bps,
                target_bps,
                "Strategy rebalanced"
            );
        }
        result
    }

    async fn total_value(&self) -> Result<u128, StrategyError> {
        Ok(self.holdings().await.total())
    }

    async fn emergency_withdraw(&self, caller: &AccountId) -> Result<u128, StrategyError> {
        self.ensure_owner(caller)?;

        let asset = self.token.asset_id();
        let holdings = self.holdings().await;
        let mut swept = 0u128;

        if holdings.supplied > 0 {
            swept += self
                .market
                .withdraw(&self.accounts.account, &asset, u128::MAX, &self.accounts.owner)
                .await?;
        }

        let idle = self.token.balance_of(&self.accounts.account).await;
        if idle > 0 {
            self.token
                .transfer(&self.accounts.account, &self.accounts.owner, idle)
                .await?;
            swept += idle;
        }

        warn!(
            strategy = %self.id,
            swept,
            recipient = %self.accounts.owner,
            "Emergency withdrawal executed"
        );
        Ok(swept)
    }

    async fn set_target_allocation_bps(
        &self,
        caller: &AccountId,
        bps: u16,
    ) -> Result<TargetUpdate, StrategyError> {
        self.ensure_owner(caller)?;
        if bps > MAX_BPS {
            return Err(StrategyError::InvalidAllocation(u32::from(bps)));
        }

        let previous_bps = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut state.target_bps, bps)
        };

        info!(strategy = %self.id, previous_bps, new_bps = bps, "Target allocation updated");

        if drift_bps(previous_bps, bps) <= self.config.rebalance_trigger_bps {
            return Ok(TargetUpdate {
                previous_bps,
                new_bps: bps,
                rebalance: None,
            });
        }

        match self.rebalance().await {
            Ok(outcome) => Ok(TargetUpdate {
                previous_bps,
                new_bps: bps,
                rebalance: Some(outcome),
            }),
            Err(StrategyError::CooldownActive { remaining_secs }) => {
                warn!(
                    strategy = %self.id,
                    remaining_secs,
                    "Target changed but cooldown blocks the immediate rebalance"
                );
                Ok(TargetUpdate {
                    previous_bps,
                    new_bps: bps,
                    rebalance: None,
                })
            }
            Err(e) => {
                self.state.write().await.target_bps = previous_bps;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{MockLendingPool, MockPriceFeed, MockToken};
    use crate::utils::ManualClock;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    struct Fixture {
        token: Arc<MockToken>,
        market: Arc<MockLendingPool>,
        clock: Arc<ManualClock>,
        strategy: AaveStrategy,
    }

    fn vault() -> AccountId {
        AccountId::new("vault")
    }

    fn owner() -> AccountId {
        AccountId::new("controller")
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn fixture(target_bps: u16) -> Fixture {
        let token = Arc::new(MockToken::new("USDC", 6));
        let market = Arc::new(MockLendingPool::new(AccountId::new("aave"), token.clone()));
        let clock = Arc::new(ManualClock::new(start()));
        let strategy = AaveStrategy::new(
            "aave-usdc",
            StrategyAccounts {
                account: AccountId::new("strategy"),
                owner: owner(),
                vault: vault(),
            },
            token.clone(),
            market.clone(),
            clock.clone(),
            StrategyConfig::default(),
        )
        .with_target_bps(target_bps);

        Fixture {
            token,
            market,
            clock,
            strategy,
        }
    }

    async fn fund_and_deposit(f: &Fixture, amount: u128) {
        f.token.mint(&vault(), amount).await;
        f.token
            .approve(&vault(), &f.strategy.account(), amount)
            .await
            .unwrap();
        f.strategy.deposit(amount).await.unwrap();
    }

    #[tokio::test]
    async fn test_deposit_splits_by_target() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 10_000).await;

        assert_eq!(f.market.balance_of("USDC", &f.strategy.account()).await, 8_000);
        assert_eq!(f.token.balance_of(&f.strategy.account()).await, 2_000);
        assert_eq!(f.strategy.current_allocation_bps().await.unwrap(), 8_000);
        assert_eq!(f.strategy.total_value().await.unwrap(), 10_000);
    }

    #[tokio::test]
    async fn test_deposit_below_minimum_rejected() {
        let f = fixture(8_000);
        let err = f.strategy.deposit(99).await.unwrap_err();
        assert_eq!(
            err,
            StrategyError::BelowMinimum {
                amount: 99,
                minimum: 100
            }
        );
    }

    #[tokio::test]
    async fn test_failed_supply_returns_funds_to_vault() {
        let f = fixture(8_000);
        f.market.set_fail_supply(true);
        f.token.mint(&vault(), 1_000).await;
        f.token
            .approve(&vault(), &f.strategy.account(), 1_000)
            .await
            .unwrap();

        assert!(f.strategy.deposit(1_000).await.is_err());
        assert_eq!(f.token.balance_of(&vault()).await, 1_000);
        assert_eq!(f.strategy.total_value().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reinvest_ignores_minimum_and_keeps_funds_on_supply_failure() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 1_000).await;
        f.strategy.withdraw(50).await.unwrap();

        f.token
            .approve(&vault(), &f.strategy.account(), 50)
            .await
            .unwrap();
        f.strategy.reinvest(50).await.unwrap();
        assert_eq!(f.strategy.total_value().await.unwrap(), 1_000);
        assert_eq!(f.market.balance_of("USDC", &f.strategy.account()).await, 840);

        f.strategy.withdraw(50).await.unwrap();
        f.market.set_fail_supply(true);
        f.token
            .approve(&vault(), &f.strategy.account(), 50)
            .await
            .unwrap();
        f.strategy.reinvest(50).await.unwrap();
        assert_eq!(f.strategy.total_value().await.unwrap(), 1_000);
        assert_eq!(f.token.balance_of(&vault()).await, 0);
    }

    #[tokio::test]
    async fn test_withdraw_uses_idle_before_market() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 10_000).await;

        assert_eq!(f.strategy.withdraw(1_500).await.unwrap(), 1_500);
        assert_eq!(f.market.balance_of("USDC", &f.strategy.account()).await, 8_000);

        assert_eq!(f.strategy.withdraw(3_000).await.unwrap(), 3_000);
        assert_eq!(f.market.balance_of("USDC", &f.strategy.account()).await, 5_500);
        assert_eq!(f.token.balance_of(&f.strategy.account()).await, 0);
        assert_eq!(f.token.balance_of(&vault()).await, 4_500);
    }

    #[tokio::test]
    async fn test_rebalance_moves_excess_to_idle() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 10_000).await;
        // 2_000 of yield lands in the market: 10_000 / 12_000 = 8333 bps
        f.market.accrue(&f.strategy.account(), 2_000).await;

        let outcome = f.strategy.rebalance().await.unwrap();
        assert_eq!(outcome.from_bps, 8_333);
        // |8333 - 8000| * 12_000 / 10_000 = 399
        assert_eq!(outcome.action, RebalanceAction::Withdrew(399));
        assert_eq!(outcome.total_value, 12_000);
        assert_eq!(outcome.to_bps, 8_000);
    }

    #[tokio::test]
    async fn test_second_rebalance_within_cooldown_fails() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 10_000).await;
        f.market.accrue(&f.strategy.account(), 2_000).await;

        f.strategy.rebalance().await.unwrap();
        let allocation = f.strategy.current_allocation_bps().await.unwrap();
        let supplied = f.market.balance_of("USDC", &f.strategy.account()).await;
        assert_eq!(f.strategy.rebalance_phase().await, RebalancePhase::Idle);

        f.clock.advance(Duration::minutes(30));
        let err = f.strategy.rebalance().await.unwrap_err();
        assert_eq!(
            err,
            StrategyError::CooldownActive {
                remaining_secs: 1_800
            }
        );
        assert_eq!(f.strategy.current_allocation_bps().await.unwrap(), allocation);
        assert_eq!(
            f.market.balance_of("USDC", &f.strategy.account()).await,
            supplied
        );

        f.clock.advance(Duration::minutes(30));
        assert_eq!(
            f.strategy.rebalance_phase().await,
            RebalancePhase::CooldownElapsed
        );
        assert!(f.strategy.rebalance().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_rebalance_does_not_start_cooldown() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 10_000).await;
        f.market.accrue(&f.strategy.account(), 2_000).await;
        f.market.set_fail_withdraw(true);

        assert!(f.strategy.rebalance().await.is_err());
        assert_eq!(f.strategy.last_rebalance().await, None);

        f.market.set_fail_withdraw(false);
        assert!(f.strategy.rebalance().await.is_ok());
    }

    #[tokio::test]
    async fn test_large_target_change_triggers_rebalance() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 10_000).await;

        let update = f
            .strategy
            .set_target_allocation_bps(&owner(), 5_000)
            .await
            .unwrap();
        assert_eq!(update.previous_bps, 8_000);
        let outcome = update.rebalance.expect("rebalance should run");
        assert_eq!(outcome.action, RebalanceAction::Withdrew(3_000));
        assert_eq!(f.strategy.current_allocation_bps().await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn test_small_target_change_does_not_rebalance() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 10_000).await;

        let update = f
            .strategy
            .set_target_allocation_bps(&owner(), 7_000)
            .await
            .unwrap();
        assert!(update.rebalance.is_none());
        assert_eq!(f.strategy.target_allocation_bps().await.unwrap(), 7_000);
        assert_eq!(f.strategy.current_allocation_bps().await.unwrap(), 8_000);
    }

    #[tokio::test]
    async fn test_target_change_during_cooldown_keeps_new_target() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 10_000).await;
        f.strategy.rebalance().await.unwrap();

        let update = f
            .strategy
            .set_target_allocation_bps(&owner(), 3_000)
            .await
            .unwrap();
        assert!(update.rebalance.is_none());
        assert_eq!(f.strategy.target_allocation_bps().await.unwrap(), 3_000);
        assert_eq!(f.strategy.current_allocation_bps().await.unwrap(), 8_000);
    }

    #[tokio::test]
    async fn test_failed_triggered_rebalance_restores_target() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 10_000).await;
        f.market.set_fail_withdraw(true);

        assert!(f
            .strategy
            .set_target_allocation_bps(&owner(), 2_000)
            .await
            .is_err());
        assert_eq!(f.strategy.target_allocation_bps().await.unwrap(), 8_000);
    }

    #[tokio::test]
    async fn test_target_setter_is_privileged() {
        let f = fixture(8_000);
        let err = f
            .strategy
            .set_target_allocation_bps(&vault(), 5_000)
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Unauthorized(_)));

        let err = f
            .strategy
            .set_target_allocation_bps(&owner(), 10_001)
            .await
            .unwrap_err();
        assert_eq!(err, StrategyError::InvalidAllocation(10_001));
    }

    #[tokio::test]
    async fn test_emergency_withdraw_sweeps_to_owner() {
        let f = fixture(8_000);
        fund_and_deposit(&f, 10_000).await;
        f.market.set_liquidity_cap(Some(5_000)).await;

        assert!(f.strategy.emergency_withdraw(&vault()).await.is_err());

        let swept = f.strategy.emergency_withdraw(&owner()).await.unwrap();
        assert_eq!(swept, 7_000);
        assert_eq!(f.token.balance_of(&owner()).await, 7_000);
        assert_eq!(f.strategy.total_value().await.unwrap(), 3_000);
    }

    #[tokio::test]
    async fn test_valuation_rejects_stale_price() {
        let feed = Arc::new(MockPriceFeed::new());
        let mut f = fixture(8_000);
        f.strategy = f.strategy.with_price_feed(feed.clone());
        fund_and_deposit(&f, 2_500_000).await;

        feed.set_price("USDC", dec!(1.0), start()).await;
        assert_eq!(f.strategy.valuation_usd().await.unwrap(), dec!(2.5));

        f.clock.advance(Duration::hours(2));
        let err = f.strategy.valuation_usd().await.unwrap_err();
        assert!(matches!(err, StrategyError::StalePrice { .. }));
    }

    #[tokio::test]
    async fn test_extreme_config_and_prices_do_not_panic() {
        let token = Arc::new(MockToken::new("USDC", 6));
        let market = Arc::new(MockLendingPool::new(AccountId::new("aave"), token.clone()));
        let clock = Arc::new(ManualClock::new(start()));
        let feed = Arc::new(MockPriceFeed::new());
        let config = StrategyConfig {
            cooldown_secs: u64::MAX,
            max_price_age_secs: u64::MAX,
            ..StrategyConfig::default()
        };
        let strategy = AaveStrategy::new(
            "aave-usdc",
            StrategyAccounts {
                account: AccountId::new("strategy"),
                owner: owner(),
                vault: vault(),
            },
            token.clone(),
            market,
            clock,
            config,
        )
        .with_price_feed(feed.clone());

        token.mint(&vault(), 2_500_000).await;
        token
            .approve(&vault(), &strategy.account(), 2_500_000)
            .await
            .unwrap();
        strategy.deposit(2_500_000).await.unwrap();

        strategy.rebalance().await.unwrap();
        assert!(matches!(
            strategy.rebalance().await,
            Err(StrategyError::CooldownActive { .. })
        ));

        feed.set_price("USDC", Decimal::MAX, start()).await;
        assert_eq!(
            strategy.valuation_usd().await,
            Err(StrategyError::ValuationOverflow("USDC".into()))
        );
    }
}
