//! Periodic upkeep driver.

use super::gate::AutomationGate;
use crate::error::VaultError;
use crate::ledger::{PoolId, RebalanceReport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What one scheduler tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No pool needed rebalancing
    Idle,
    Rebalanced(RebalanceReport),
    /// Upkeep was needed but `act` failed
    Failed {
        pool_id: Option<PoolId>,
        error: VaultError,
    },
}

impl TickOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            TickOutcome::Idle => "idle",
            TickOutcome::Rebalanced(_) => "rebalanced",
            TickOutcome::Failed { .. } => "failed",
        }
    }

    pub fn pool_id(&self) -> Option<&PoolId> {
        match self {
            TickOutcome::Idle => None,
            TickOutcome::Rebalanced(report) => Some(&report.pool_id),
            TickOutcome::Failed { pool_id, .. } => pool_id.as_ref(),
        }
    }

    /// Human-readable summary for the tick history.
    pub fn detail(&self) -> String {
        match self {
            TickOutcome::Idle => String::new(),
            TickOutcome::Rebalanced(report) => format!(
                "{} ({} -> {} bps)",
                report.outcome.action, report.outcome.from_bps, report.outcome.to_bps
            ),
            TickOutcome::Failed { error, .. } => error.to_string(),
        }
    }
}

/// Work driven alongside the scheduler loop.
#[async_trait]
pub trait TickHook: Send {
    /// Runs before the upkeep check of tick `tick` (1-based).
    async fn before_tick(&mut self, _tick: u64) {}

    /// Runs after tick `tick`. Returning `false` stops the loop.
    async fn after_tick(&mut self, _tick: u64, _outcome: &TickOutcome) -> bool {
        true
    }
}

/// No-op hook.
#[async_trait]
impl TickHook for () {}

/// Runs one check/act pass per tick. Failed upkeeps are not retried within a tick.
pub struct RebalanceScheduler {
    gate: AutomationGate,
}

impl RebalanceScheduler {
    pub fn new(gate: AutomationGate) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &AutomationGate {
        &self.gate
    }

    pub async fn tick(&self) -> TickOutcome {
        let check = self.gate.check().await;
        if !check.needed {
            return TickOutcome::Idle;
        }

        match self.gate.act(&check.perform_data).await {
            Ok(report) => TickOutcome::Rebalanced(report),
            Err(error) => {
                let pool_id = PoolId::from_bytes(&check.perform_data);
                warn!(
                    pool = pool_id.as_ref().map(PoolId::as_str).unwrap_or("?"),
                    error = %error,
                    "Upkeep failed"
                );
                TickOutcome::Failed { pool_id, error }
            }
        }
    }

    /// Tick every `interval` until `shutdown` is set or `hook` asks to stop.
    /// Returns the number of ticks run.
    pub async fn run<H: TickHook>(
        &self,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
        hook: &mut H,
    ) -> u64 {
        let mut timer = tokio::time::interval(interval);
        let mut ticks = 0u64;

        loop {
            timer.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            ticks += 1;
            hook.before_tick(ticks).await;
            let outcome = self.tick().await;
            debug!(tick = ticks, outcome = outcome.kind(), "Scheduler tick");
            if !hook.after_tick(ticks, &outcome).await {
                break;
            }
        }

        info!(ticks, "Scheduler stopped");
        ticks
    }
}
