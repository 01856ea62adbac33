//! In-memory collaborators for simulations and tests.

use super::traits::{FungibleAsset, PriceFeed, YieldSource};
use super::types::{AccountId, PriceData};
use crate::error::ExternalError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Token ledger state.
#[derive(Debug, Default)]
struct TokenState {
    balances: HashMap<AccountId, u128>,
    allowances: HashMap<(AccountId, AccountId), u128>,
    /// Accounts that cannot receive transfers (simulates a rejecting recipient)
    blocked: HashSet<AccountId>,
    total_supply: u128,
}

/// In-memory fungible token.
pub struct MockToken {
    asset_id: String,
    decimals: u32,
    state: RwLock<TokenState>,
}

impl MockToken {
    pub fn new(asset_id: impl Into<String>, decimals: u32) -> Self {
        Self {
            asset_id: asset_id.into(),
            decimals,
            state: RwLock::new(TokenState::default()),
        }
    }

    /// Create new supply out of thin air.
    pub async fn mint(&self, to: &AccountId, amount: u128) {
        let mut state = self.state.write().await;
        *state.balances.entry(to.clone()).or_default() += amount;
        state.total_supply += amount;
        debug!(asset = %self.asset_id, %to, amount, "Minted");
    }

    /// Reject every transfer whose recipient is `account`.
    pub async fn block_recipient(&self, account: &AccountId) {
        self.state.write().await.blocked.insert(account.clone());
    }

    pub async fn unblock_recipient(&self, account: &AccountId) {
        self.state.write().await.blocked.remove(account);
    }

    pub async fn total_supply(&self) -> u128 {
        self.state.read().await.total_supply
    }

    fn move_balance(
        &self,
        state: &mut TokenState,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), ExternalError> {
        if state.blocked.contains(to) {
            return Err(ExternalError::Unavailable(format!(
                "{} rejects transfers of {}",
                to, self.asset_id
            )));
        }

        let available = state.balances.get(from).copied().unwrap_or_default();
        if available < amount {
            return Err(ExternalError::InsufficientBalance {
                account: from.to_string(),
                needed: amount,
                available,
            });
        }

        state.balances.insert(from.clone(), available - amount);
        *state.balances.entry(to.clone()).or_default() += amount;
        Ok(())
    }
}

#[async_trait]
impl FungibleAsset for MockToken {
    fn asset_id(&self) -> String {
        self.asset_id.clone()
    }

    fn decimals(&self) -> u32 {
        self.decimals
    }

    async fn balance_of(&self, owner: &AccountId) -> u128 {
        self.state
            .read()
            .await
            .balances
            .get(owner)
            .copied()
            .unwrap_or_default()
    }

    async fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u128 {
        self.state
            .read()
            .await
            .allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or_default()
    }

    async fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: u128,
    ) -> Result<(), ExternalError> {
        let mut state = self.state.write().await;
        state
            .allowances
            .insert((owner.clone(), spender.clone()), amount);
        Ok(())
    }

    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), ExternalError> {
        let mut state = self.state.write().await;
        self.move_balance(&mut state, from, to, amount)
    }

    async fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), ExternalError> {
        let mut state = self.state.write().await;
        let key = (from.clone(), spender.clone());
        let allowed = state.allowances.get(&key).copied().unwrap_or_default();
        if allowed < amount {
            return Err(ExternalError::InsufficientAllowance {
                owner: from.to_string(),
                spender: spender.to_string(),
                needed: amount,
                available: allowed,
            });
        }

        self.move_balance(&mut state, from, to, amount)?;
        state.allowances.insert(key, allowed - amount);
        Ok(())
    }
}

/// In-memory lending market for a single asset.
///
/// Supplied funds sit in the market's own token account; positions grow with
/// [`MockLendingPool::accrue`] / [`MockLendingPool::accrue_bps`], which mint the
/// backing tokens.
pub struct MockLendingPool {
    account: AccountId,
    token: Arc<MockToken>,
    positions: RwLock<HashMap<AccountId, u128>>,
    /// Upper bound on what a single withdrawal can release (utilization limit)
    liquidity_cap: RwLock<Option<u128>>,
    fail_supply: AtomicBool,
    fail_withdraw: AtomicBool,
}

impl MockLendingPool {
    pub fn new(account: AccountId, token: Arc<MockToken>) -> Self {
        Self {
            account,
            token,
            positions: RwLock::new(HashMap::new()),
            liquidity_cap: RwLock::new(None),
            fail_supply: AtomicBool::new(false),
            fail_withdraw: AtomicBool::new(false),
        }
    }

    /// Credit `amount` of yield to `owner`.
    pub async fn accrue(&self, owner: &AccountId, amount: u128) {
        self.token.mint(&self.account, amount).await;
        *self.positions.write().await.entry(owner.clone()).or_default() += amount;
    }

    /// Grow every position by `bps` basis points (rounded down).
    pub async fn accrue_bps(&self, bps: u32) -> u128 {
        let mut positions = self.positions.write().await;
        let mut minted = 0u128;
        for balance in positions.values_mut() {
            let interest = balance.saturating_mul(u128::from(bps)) / 10_000;
            *balance += interest;
            minted += interest;
        }
        drop(positions);

        if minted > 0 {
            self.token.mint(&self.account, minted).await;
        }
        minted
    }

    pub async fn set_liquidity_cap(&self, cap: Option<u128>) {
        *self.liquidity_cap.write().await = cap;
    }

    pub fn set_fail_supply(&self, fail: bool) {
        self.fail_supply.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_withdraw(&self, fail: bool) {
        self.fail_withdraw.store(fail, Ordering::SeqCst);
    }

    fn check_asset(&self, asset: &str) -> Result<(), ExternalError> {
        if asset == self.token.asset_id() {
            Ok(())
        } else {
            Err(ExternalError::UnknownAsset(asset.to_string()))
        }
    }
}

#[async_trait]
impl YieldSource for MockLendingPool {
    fn account(&self) -> AccountId {
        self.account.clone()
    }

    async fn supply(
        &self,
        caller: &AccountId,
        asset: &str,
        amount: u128,
        beneficiary: &AccountId,
    ) -> Result<(), ExternalError> {
        self.check_asset(asset)?;
        if self.fail_supply.load(Ordering::SeqCst) {
            return Err(ExternalError::Unavailable("supply paused".into()));
        }

        self.token
            .transfer_from(&self.account, caller, &self.account, amount)
            .await?;
        *self
            .positions
            .write()
            .await
            .entry(beneficiary.clone())
            .or_default() += amount;

        debug!(%asset, %beneficiary, amount, "Supplied to lending market");
        Ok(())
    }

    async fn withdraw(
        &self,
        caller: &AccountId,
        asset: &str,
        amount: u128,
        recipient: &AccountId,
    ) -> Result<u128, ExternalError> {
        self.check_asset(asset)?;
        if self.fail_withdraw.load(Ordering::SeqCst) {
            return Err(ExternalError::Unavailable("withdrawals paused".into()));
        }

        let cap = *self.liquidity_cap.read().await;
        let mut positions = self.positions.write().await;
        let balance = positions.get(caller).copied().unwrap_or_default();

        let requested = if amount == u128::MAX {
            cap.map_or(balance, |cap| balance.min(cap))
        } else {
            amount
        };
        if requested > balance {
            return Err(ExternalError::InsufficientBalance {
                account: caller.to_string(),
                needed: requested,
                available: balance,
            });
        }
        if let Some(cap) = cap {
            if requested > cap {
                return Err(ExternalError::Unavailable(format!(
                    "only {cap} available to withdraw"
                )));
            }
        }

        self.token
            .transfer(&self.account, recipient, requested)
            .await?;
        positions.insert(caller.clone(), balance - requested);

        debug!(%asset, %caller, %recipient, amount = requested, "Withdrawn from lending market");
        Ok(requested)
    }

    async fn balance_of(&self, asset: &str, owner: &AccountId) -> u128 {
        if self.check_asset(asset).is_err() {
            return 0;
        }
        self.positions
            .read()
            .await
            .get(owner)
            .copied()
            .unwrap_or_default()
    }
}

/// Settable price feed.
#[derive(Default)]
pub struct MockPriceFeed {
    prices: RwLock<HashMap<String, PriceData>>,
}

impl MockPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, asset: &str, price: Decimal, updated_at: DateTime<Utc>) {
        self.prices
            .write()
            .await
            .insert(asset.to_string(), PriceData { price, updated_at });
    }
}

#[async_trait]
impl PriceFeed for MockPriceFeed {
    async fn latest_price(&self, asset: &str) -> Result<PriceData, ExternalError> {
        self.prices
            .read()
            .await
            .get(asset)
            .copied()
            .ok_or_else(|| ExternalError::PriceUnavailable(asset.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    fn bob() -> AccountId {
        AccountId::new("bob")
    }

    #[tokio::test]
    async fn test_transfer_from_spends_allowance() {
        let token = MockToken::new("USDC", 6);
        token.mint(&alice(), 1_000).await;
        token.approve(&alice(), &bob(), 600).await.unwrap();

        token
            .transfer_from(&bob(), &alice(), &bob(), 400)
            .await
            .unwrap();

        assert_eq!(token.balance_of(&alice()).await, 600);
        assert_eq!(token.balance_of(&bob()).await, 400);
        assert_eq!(token.allowance(&alice(), &bob()).await, 200);

        let err = token
            .transfer_from(&bob(), &alice(), &bob(), 300)
            .await
            .unwrap_err();
        assert!(matches!(err, ExternalError::InsufficientAllowance { .. }));
    }

    #[tokio::test]
    async fn test_blocked_recipient_rejects_transfer() {
        let token = MockToken::new("USDC", 6);
        token.mint(&alice(), 100).await;
        token.block_recipient(&bob()).await;

        assert!(token.transfer(&alice(), &bob(), 10).await.is_err());
        assert_eq!(token.balance_of(&alice()).await, 100);

        token.unblock_recipient(&bob()).await;
        assert!(token.transfer(&alice(), &bob(), 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_lending_pool_supply_accrue_withdraw() {
        let token = Arc::new(MockToken::new("USDC", 6));
        let market = MockLendingPool::new(AccountId::new("aave"), token.clone());
        token.mint(&alice(), 1_000).await;
        token
            .approve(&alice(), &market.account(), 1_000)
            .await
            .unwrap();

        market.supply(&alice(), "USDC", 1_000, &alice()).await.unwrap();
        assert_eq!(market.accrue_bps(500).await, 50);
        assert_eq!(market.balance_of("USDC", &alice()).await, 1_050);

        let released = market
            .withdraw(&alice(), "USDC", u128::MAX, &alice())
            .await
            .unwrap();
        assert_eq!(released, 1_050);
        assert_eq!(token.balance_of(&alice()).await, 1_050);
    }

    #[tokio::test]
    async fn test_liquidity_cap_limits_full_withdrawal() {
        let token = Arc::new(MockToken::new("USDC", 6));
        let market = MockLendingPool::new(AccountId::new("aave"), token.clone());
        token.mint(&alice(), 1_000).await;
        token
            .approve(&alice(), &market.account(), 1_000)
            .await
            .unwrap();
        market.supply(&alice(), "USDC", 1_000, &alice()).await.unwrap();
        market.set_liquidity_cap(Some(700)).await;

        let released = market
            .withdraw(&alice(), "USDC", u128::MAX, &bob())
            .await
            .unwrap();
        assert_eq!(released, 700);
        assert_eq!(market.balance_of("USDC", &alice()).await, 300);
    }

    #[tokio::test]
    async fn test_price_feed_unknown_asset() {
        let feed = MockPriceFeed::new();
        assert!(feed.latest_price("ETH").await.is_err());
    }
}
