//! Automation: drift checks and the periodic scheduler driving them.

mod gate;
mod scheduler;

pub use gate::{AutomationGate, UpkeepCheck};
pub use scheduler::{RebalanceScheduler, TickHook, TickOutcome};
