//! Drift evaluation and upkeep execution.
//!
//! `check` is a pure read over active pools: the first pool (creation order)
//! whose allocation drift strictly exceeds the threshold is selected and its
//! id encoded as the opaque perform data. `act` decodes that selector and
//! re-validates everything before touching the ledger, since state may have
//! changed between the two calls.

use crate::error::{VaultError, VaultResult};
use crate::ledger::{PoolId, RebalanceReport, VaultLedger};
use crate::strategy::allocation::drift_bps;
use crate::strategy::StrategyAdapter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of an upkeep check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpkeepCheck {
    pub needed: bool,
    /// Opaque selector for [`AutomationGate::act`]; empty when nothing is needed
    pub perform_data: Vec<u8>,
}

impl UpkeepCheck {
    fn none() -> Self {
        Self::default()
    }

    fn for_pool(pool_id: &PoolId) -> Self {
        Self {
            needed: true,
            perform_data: pool_id.to_bytes(),
        }
    }
}

/// Current and target allocation of one adapter.
#[derive(Debug, Clone, Copy)]
struct Drift {
    current_bps: u16,
    target_bps: u16,
}

impl Drift {
    fn bps(&self) -> u16 {
        drift_bps(self.current_bps, self.target_bps)
    }
}

async fn read_drift(adapter: &dyn StrategyAdapter) -> VaultResult<Drift> {
    let current_bps = adapter
        .current_allocation_bps()
        .await
        .map_err(|e| VaultError::from_strategy("current allocation", e))?;
    let target_bps = adapter
        .target_allocation_bps()
        .await
        .map_err(|e| VaultError::from_strategy("target allocation", e))?;
    Ok(Drift {
        current_bps,
        target_bps,
    })
}

/// Check/act gate in front of [`VaultLedger::rebalance_pool`].
pub struct AutomationGate {
    ledger: Arc<VaultLedger>,
    threshold_bps: u16,
}

impl AutomationGate {
    pub fn new(ledger: Arc<VaultLedger>, threshold_bps: u16) -> Self {
        Self {
            ledger,
            threshold_bps,
        }
    }

    pub fn threshold_bps(&self) -> u16 {
        self.threshold_bps
    }

    pub fn ledger(&self) -> &Arc<VaultLedger> {
        &self.ledger
    }

    /// Select the first active pool whose drift exceeds the threshold.
    pub async fn check(&self) -> UpkeepCheck {
        for (pool_id, adapter) in self.ledger.active_bindings().await {
            let drift = match read_drift(adapter.as_ref()).await {
                Ok(drift) => drift,
                Err(e) => {
                    warn!(pool = %pool_id, error = %e, "Skipping pool, allocation unreadable");
                    continue;
                }
            };

            debug!(
                pool = %pool_id.short(),
                current_bps = drift.current_bps,
                target_bps = drift.target_bps,
                drift_bps = drift.bps(),
                threshold_bps = self.threshold_bps,
                "Drift evaluated"
            );

            if drift.bps() > self.threshold_bps {
                return UpkeepCheck::for_pool(&pool_id);
            }
        }

        UpkeepCheck::none()
    }

    /// Rebalance the pool selected by `perform_data`.
    pub async fn act(&self, perform_data: &[u8]) -> VaultResult<RebalanceReport> {
        let pool_id = PoolId::from_bytes(perform_data).ok_or_else(|| {
            VaultError::InvalidReference(format!(
                "malformed perform data ({} bytes)",
                perform_data.len()
            ))
        })?;

        let pool = self.ledger.pool(&pool_id).await?;
        if !pool.active {
            return Err(VaultError::PoolInactive(pool_id));
        }

        let adapter = self.ledger.adapter(&pool_id).await?;
        let drift = read_drift(adapter.as_ref()).await?;
        if drift.bps() <= self.threshold_bps {
            return Err(VaultError::RebalanceNotNeeded {
                pool_id,
                drift_bps: drift.bps(),
                threshold_bps: self.threshold_bps,
            });
        }

        info!(
            pool = %pool_id,
            drift_bps = drift.bps(),
            threshold_bps = self.threshold_bps,
            "Upkeep triggered"
        );
        self.ledger.rebalance_pool(&pool_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExternalError, StrategyError};
    use crate::external::{AccountId, FungibleAsset, MockToken};
    use crate::ledger::LedgerSettings;
    use crate::strategy::{MockStrategyAdapter, RebalanceAction, RebalanceOutcome};
    use crate::utils::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU16, Ordering};

    fn controller() -> AccountId {
        AccountId::new("controller")
    }

    fn ledger() -> Arc<VaultLedger> {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        ));
        Arc::new(VaultLedger::new(
            LedgerSettings {
                controller: controller(),
                custody: AccountId::new("custody"),
                min_deposit: 100,
            },
            clock,
        ))
    }

    /// Adapter whose allocation is driven by a shared cell; `rebalance` snaps it to target.
    fn drifting_adapter(id: &str, current: Arc<AtomicU16>, target: u16) -> MockStrategyAdapter {
        let mut adapter = MockStrategyAdapter::new();
        adapter.expect_strategy_id().return_const(id.to_string());
        adapter.expect_asset_id().return_const("USDC".to_string());
        adapter
            .expect_account()
            .return_const(AccountId::new(format!("{id}-account")));
        adapter
            .expect_target_allocation_bps()
            .returning(move || Ok(target));
        let reader = current.clone();
        adapter
            .expect_current_allocation_bps()
            .returning(move || Ok(reader.load(Ordering::SeqCst)));
        adapter.expect_total_value().returning(|| Ok(0));
        let id = id.to_string();
        adapter.expect_rebalance().returning(move || {
            let from_bps = current.swap(target, Ordering::SeqCst);
            Ok(RebalanceOutcome {
                strategy_id: id.clone(),
                action: RebalanceAction::None,
                from_bps,
                to_bps: target,
                target_bps: target,
                total_value: 0,
                executed_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            })
        });
        adapter
    }

    async fn add_pool(ledger: &VaultLedger, adapter: MockStrategyAdapter) -> PoolId {
        let token: Arc<dyn FungibleAsset> = Arc::new(MockToken::new("USDC", 6));
        ledger
            .create_pool(&controller(), Arc::new(adapter), token)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_matching_pool_is_selected() {
        let ledger = ledger();
        let a = Arc::new(AtomicU16::new(8_200));
        let b = Arc::new(AtomicU16::new(8_700));
        let c = Arc::new(AtomicU16::new(9_000));
        let _pool_a = add_pool(&ledger, drifting_adapter("a", a.clone(), 8_000)).await;
        let pool_b = add_pool(&ledger, drifting_adapter("b", b.clone(), 8_000)).await;
        let pool_c = add_pool(&ledger, drifting_adapter("c", c.clone(), 8_000)).await;
        let gate = AutomationGate::new(ledger.clone(), 500);

        let check = gate.check().await;
        assert!(check.needed);
        assert_eq!(check.perform_data, pool_b.to_bytes());
        // Checks have no side effects
        assert_eq!(gate.check().await, check);

        let report = gate.act(&check.perform_data).await.unwrap();
        assert_eq!(report.pool_id, pool_b);
        assert_eq!(b.load(Ordering::SeqCst), 8_000);
        assert_eq!(c.load(Ordering::SeqCst), 9_000);

        // C is picked up on the next round
        let check = gate.check().await;
        assert_eq!(check.perform_data, pool_c.to_bytes());
    }

    #[tokio::test]
    async fn test_drift_equal_to_threshold_is_not_needed() {
        let ledger = ledger();
        let current = Arc::new(AtomicU16::new(8_500));
        let pool_id = add_pool(&ledger, drifting_adapter("a", current, 8_000)).await;
        let gate = AutomationGate::new(ledger, 500);

        assert_eq!(gate.check().await, UpkeepCheck::none());

        let err = gate.act(&pool_id.to_bytes()).await.unwrap_err();
        assert_eq!(
            err,
            VaultError::RebalanceNotNeeded {
                pool_id,
                drift_bps: 500,
                threshold_bps: 500
            }
        );
    }

    #[tokio::test]
    async fn test_act_revalidates_active_flag() {
        let ledger = ledger();
        let current = Arc::new(AtomicU16::new(9_500));
        let pool_id = add_pool(&ledger, drifting_adapter("a", current, 8_000)).await;
        let gate = AutomationGate::new(ledger.clone(), 500);

        let check = gate.check().await;
        assert!(check.needed);

        ledger
            .set_pool_active(&controller(), &pool_id, false)
            .await
            .unwrap();
        let err = gate.act(&check.perform_data).await.unwrap_err();
        assert_eq!(err, VaultError::PoolInactive(pool_id));
        assert!(!gate.check().await.needed);
    }

    #[tokio::test]
    async fn test_malformed_perform_data() {
        let gate = AutomationGate::new(ledger(), 500);
        let err = gate.act(&[1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidReference(_)));

        let unknown = PoolId::from_bytes(&[9u8; 20]).unwrap();
        let err = gate.act(&unknown.to_bytes()).await.unwrap_err();
        assert_eq!(err, VaultError::PoolNotFound(unknown));
    }

    #[tokio::test]
    async fn test_unreadable_pool_is_skipped() {
        let ledger = ledger();
        let mut broken = MockStrategyAdapter::new();
        broken.expect_strategy_id().return_const("broken".to_string());
        broken.expect_asset_id().return_const("USDC".to_string());
        broken.expect_target_allocation_bps().returning(|| Ok(8_000));
        broken.expect_current_allocation_bps().returning(|| {
            Err(StrategyError::External(ExternalError::Unavailable(
                "rpc down".into(),
            )))
        });
        add_pool(&ledger, broken).await;
        let healthy = Arc::new(AtomicU16::new(6_000));
        let pool_id = add_pool(&ledger, drifting_adapter("healthy", healthy, 8_000)).await;

        let gate = AutomationGate::new(ledger, 500);
        let check = gate.check().await;
        assert!(check.needed);
        assert_eq!(check.perform_data, pool_id.to_bytes());
    }

    #[tokio::test]
    async fn test_adapter_cooldown_surfaces() {
        let ledger = ledger();
        let mut adapter = MockStrategyAdapter::new();
        adapter.expect_strategy_id().return_const("cooling".to_string());
        adapter.expect_asset_id().return_const("USDC".to_string());
        adapter.expect_target_allocation_bps().returning(|| Ok(8_000));
        adapter.expect_current_allocation_bps().returning(|| Ok(9_900));
        adapter
            .expect_rebalance()
            .times(1)
            .returning(|| Err(StrategyError::CooldownActive { remaining_secs: 1_200 }));
        let pool_id = add_pool(&ledger, adapter).await;
        let gate = AutomationGate::new(ledger.clone(), 500);

        let check = gate.check().await;
        let err = gate.act(&check.perform_data).await.unwrap_err();
        assert_eq!(err, VaultError::CooldownActive { remaining_secs: 1_200 });
        assert!(ledger.pool(&pool_id).await.unwrap().last_rebalance_time.is_none());
    }
}
