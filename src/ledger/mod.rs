//! Share-based vault ledger.
//!
//! Owns every pool's share/asset totals and every depositor position:
//! - Pool registry with deterministic identifiers
//! - Floor-rounded share minting and burning
//! - Mutate-before-call deposit and withdrawal flows with full rollback
//! - Serialized operations with reentrancy rejection

mod ids;
mod lock;
pub mod math;
mod types;
mod vault;

pub use ids::derive_pool_id;
pub use lock::OperationLock;
pub use types::{
    EmergencyReport, InvariantViolation, LedgerSnapshot, Pool, PoolId, Position, RebalanceReport,
};
pub use vault::{LedgerSettings, VaultLedger};
