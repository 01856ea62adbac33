//! Collaborators the ledger and the strategies call out to.
//!
//! ## Interfaces
//! - `FungibleAsset`: balances, allowances and transfers of one asset
//! - `YieldSource`: a lending market that accepts supply and releases withdrawals
//! - `PriceFeed`: latest price of an asset with its update time
//!
//! ## In-memory implementations
//! `mock` provides a token, a lending market with yield accrual and failure
//! injection, and a settable price feed for simulations and tests.

pub mod mock;
mod traits;
mod types;

pub use mock::{MockLendingPool, MockPriceFeed, MockToken};
pub use traits::{FungibleAsset, PriceFeed, YieldSource};
pub use types::*;
