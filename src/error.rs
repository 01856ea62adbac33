//! Error taxonomy for the ledger, the strategy adapters and their collaborators.

use crate::ledger::PoolId;
use thiserror::Error;

/// Ledger operation result.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors raised by [`crate::ledger::VaultLedger`] and the automation gate.
///
/// Validation variants are detected before any mutation. `ExternalCallFailure`
/// is returned after every mutation of the failed operation has been rolled back.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("caller {caller} is not the controller")]
    Unauthorized { caller: String },

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("pool {0} not found")]
    PoolNotFound(PoolId),

    #[error("pool {0} is inactive")]
    PoolInactive(PoolId),

    #[error("amount {amount} is below the minimum deposit {minimum}")]
    AmountTooSmall { amount: u128, minimum: u128 },

    #[error("asset {supplied} is not supported by the pool (expected {expected})")]
    UnsupportedAsset { expected: String, supplied: String },

    #[error("strategy {0} is already bound to a pool")]
    StrategyAlreadyBound(String),

    #[error("insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: u128, held: u128 },

    #[error("burning {shares} shares would pay out nothing")]
    ZeroPayout { shares: u128 },

    #[error("depositing {amount} would mint no shares")]
    ZeroShares { amount: u128 },

    #[error("pool {0} has outstanding shares but no assets")]
    Insolvent(PoolId),

    #[error("rebalance cooldown active for another {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },

    #[error("pool {pool_id} drift of {drift_bps} bps is within the {threshold_bps} bps threshold")]
    RebalanceNotNeeded {
        pool_id: PoolId,
        drift_bps: u16,
        threshold_bps: u16,
    },

    #[error("allocation {0} bps is out of range")]
    InvalidAllocation(u32),

    #[error("reentrant call into the ledger rejected")]
    Reentrancy,

    #[error("arithmetic overflow in share accounting")]
    ArithmeticOverflow,

    #[error("external call failed: {0}")]
    ExternalCallFailure(String),
}

/// Errors raised by strategy adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("amount {amount} is below the strategy minimum {minimum}")]
    BelowMinimum { amount: u128, minimum: u128 },

    #[error("rebalance cooldown active for another {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },

    #[error("a rebalance is already in progress")]
    RebalanceInProgress,

    #[error("allocation {0} bps is out of range")]
    InvalidAllocation(u32),

    #[error("caller {0} is not the strategy owner")]
    Unauthorized(String),

    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: u128, available: u128 },

    #[error("price for {asset} is stale ({age_secs}s old)")]
    StalePrice { asset: String, age_secs: i64 },

    #[error("valuation of {0} overflows")]
    ValuationOverflow(String),

    #[error(transparent)]
    External(#[from] ExternalError),
}

/// Errors raised by collaborators: the asset ledger, the yield source, the price feed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    #[error("insufficient balance for {account}: needs {needed}, has {available}")]
    InsufficientBalance {
        account: String,
        needed: u128,
        available: u128,
    },

    #[error("insufficient allowance from {owner} to {spender}: needs {needed}, has {available}")]
    InsufficientAllowance {
        owner: String,
        spender: String,
        needed: u128,
        available: u128,
    },

    #[error("unknown asset {0}")]
    UnknownAsset(String),

    #[error("no price available for {0}")]
    PriceUnavailable(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

impl VaultError {
    /// Map an adapter failure onto the ledger taxonomy.
    ///
    /// The cooldown passes through unchanged; every other adapter failure is an
    /// external call failure from the ledger's point of view.
    pub fn from_strategy(context: &str, err: StrategyError) -> Self {
        match err {
            StrategyError::CooldownActive { remaining_secs } => {
                VaultError::CooldownActive { remaining_secs }
            }
            StrategyError::InvalidAllocation(bps) => VaultError::InvalidAllocation(bps),
            other => VaultError::ExternalCallFailure(format!("{context}: {other}")),
        }
    }

    /// Map a collaborator failure onto the ledger taxonomy.
    pub fn from_external(context: &str, err: ExternalError) -> Self {
        VaultError::ExternalCallFailure(format!("{context}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_passes_through() {
        let err = VaultError::from_strategy(
            "rebalance",
            StrategyError::CooldownActive { remaining_secs: 42 },
        );
        assert_eq!(err, VaultError::CooldownActive { remaining_secs: 42 });
    }

    #[test]
    fn test_other_strategy_errors_become_external_failures() {
        let err = VaultError::from_strategy(
            "deposit",
            StrategyError::External(ExternalError::Unavailable("pool paused".into())),
        );
        match err {
            VaultError::ExternalCallFailure(msg) => {
                assert!(msg.starts_with("deposit:"));
                assert!(msg.contains("pool paused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
