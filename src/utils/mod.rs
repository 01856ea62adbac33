//! Shared utilities: time sources and decimal helpers for reporting.

pub mod clock;
pub mod decimal;

pub use clock::{Clock, ManualClock, SystemClock};
