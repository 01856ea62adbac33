//! Collaborator interfaces.
//!
//! Amounts are integer base units of the asset. Every call that moves value
//! either completes fully or fails without effect.

use super::types::{AccountId, PriceData};
use crate::error::ExternalError;
use async_trait::async_trait;

/// A fungible asset with an allowance model.
#[async_trait]
pub trait FungibleAsset: Send + Sync {
    /// Identifier of the asset (e.g., "USDC").
    fn asset_id(&self) -> String;

    /// Number of decimals in one whole token.
    fn decimals(&self) -> u32;

    async fn balance_of(&self, owner: &AccountId) -> u128;

    async fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u128;

    /// Set the amount `spender` may move out of `owner`'s balance.
    async fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: u128,
    ) -> Result<(), ExternalError>;

    /// Move `amount` from `from` to `to`, authorized by `from`.
    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), ExternalError>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance.
    async fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), ExternalError>;
}

/// An external lending market (Aave-style pool).
#[async_trait]
pub trait YieldSource: Send + Sync {
    /// Account the market pulls supplied funds with; callers approve it first.
    fn account(&self) -> AccountId;

    /// Pull `amount` of `asset` from `caller` and credit it to `beneficiary`.
    async fn supply(
        &self,
        caller: &AccountId,
        asset: &str,
        amount: u128,
        beneficiary: &AccountId,
    ) -> Result<(), ExternalError>;

    /// Debit `caller`'s position and send the funds to `recipient`.
    ///
    /// `u128::MAX` withdraws the whole position. Returns the amount released.
    async fn withdraw(
        &self,
        caller: &AccountId,
        asset: &str,
        amount: u128,
        recipient: &AccountId,
    ) -> Result<u128, ExternalError>;

    /// Position of `owner`, accrued yield included.
    async fn balance_of(&self, asset: &str, owner: &AccountId) -> u128;
}

/// A price oracle.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn latest_price(&self, asset: &str) -> Result<PriceData, ExternalError>;
}
