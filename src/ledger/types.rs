//! Ledger records.

use super::ids::POOL_ID_LEN;
use crate::external::AccountId;
use crate::strategy::RebalanceOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable opaque pool handle (hex of a 20-byte digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(String);

impl PoolId {
    pub(crate) fn encode(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Rebuild an id from its raw bytes. Returns `None` for malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        (bytes.len() == POOL_ID_LEN).then(|| Self::encode(bytes))
    }

    /// Parse the hex form.
    pub fn parse(hex_id: &str) -> Option<Self> {
        let bytes = hex::decode(hex_id).ok()?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        hex::decode(&self.0).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex characters, for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unit of ledger accounting: one asset, one strategy, one share/asset pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub strategy_id: String,
    pub asset_id: String,
    pub total_shares: u128,
    pub total_assets: u128,
    pub active: bool,
    /// Mirror of the adapter's target allocation (bps)
    pub target_allocation_bps: u16,
    pub last_rebalance_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A depositor's claim on one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub pool_id: PoolId,
    pub owner: AccountId,
    pub shares: u128,
    pub last_deposit_time: DateTime<Utc>,
}

/// Result of a ledger-driven rebalance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceReport {
    pub pool_id: PoolId,
    pub outcome: RebalanceOutcome,
    pub total_assets_before: u128,
    pub total_assets_after: u128,
}

/// Result of an emergency exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyReport {
    /// Amount the adapter swept to the privileged recipient
    pub swept: u128,
    /// Value still held by the adapter; the pool's new total assets
    pub remaining: u128,
}

/// Point-in-time copy of the ledger for persistence and reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub taken_at: DateTime<Utc>,
    pub pools: Vec<Pool>,
    pub positions: Vec<Position>,
}

/// Broken ledger invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("pool {pool_id}: positions hold {position_sum} shares but total is {total_shares}")]
    ShareSumMismatch {
        pool_id: PoolId,
        position_sum: u128,
        total_shares: u128,
    },

    #[error("pool {pool_id}: target allocation {bps} bps out of range")]
    TargetOutOfRange { pool_id: PoolId, bps: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_id_bytes() {
        let id = PoolId::encode(&[7u8; POOL_ID_LEN]);
        assert_eq!(PoolId::from_bytes(&id.to_bytes()), Some(id.clone()));
        assert_eq!(PoolId::parse(id.as_str()), Some(id.clone()));
        assert_eq!(id.short(), "07070707");

        assert_eq!(PoolId::from_bytes(&[1, 2, 3]), None);
        assert_eq!(PoolId::parse("not-hex"), None);
    }

    #[test]
    fn test_snapshot_json_keeps_wide_amounts() {
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 6, 1, 0, 0, 0).unwrap();
        let id = PoolId::encode(&[1u8; POOL_ID_LEN]);
        let snapshot = LedgerSnapshot {
            taken_at: at,
            pools: vec![Pool {
                id: id.clone(),
                strategy_id: "aave-usdc".into(),
                asset_id: "USDC".into(),
                total_shares: u128::from(u64::MAX) * 3,
                total_assets: u128::from(u64::MAX) * 4,
                active: true,
                target_allocation_bps: 8_000,
                last_rebalance_time: None,
                created_at: at,
            }],
            positions: Vec::new(),
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pools, snapshot.pools);
        assert_eq!(back.pools[0].id, id);
    }
}
