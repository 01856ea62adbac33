//! SQLite persistence for ledger state.
//!
//! Persists what the simulation needs to survive restarts and to report on:
//! - The latest ledger snapshot (pools and positions)
//! - The history of automation ticks

use crate::automation::TickOutcome;
use crate::external::AccountId;
use crate::ledger::{LedgerSnapshot, Pool, PoolId, Position};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info, warn};

/// One recorded automation tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickRecord {
    pub timestamp: DateTime<Utc>,
    /// `idle`, `rebalanced` or `failed`
    pub outcome: String,
    pub pool_id: Option<String>,
    pub detail: String,
}

/// SQLite-based persistence manager.
pub struct PersistenceManager {
    conn: Connection,
}

impl PersistenceManager {
    /// Open (or create) the database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        let manager = Self { conn };
        manager.init_schema()?;

        info!("Persistence manager initialized at {:?}", db_path.as_ref());
        Ok(manager)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- Snapshot metadata (singleton row)
            CREATE TABLE IF NOT EXISTS ledger_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                taken_at TEXT NOT NULL
            );

            -- Pools, in creation order
            CREATE TABLE IF NOT EXISTS pools (
                pool_id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                strategy_id TEXT NOT NULL,
                asset_id TEXT NOT NULL,
                total_shares TEXT NOT NULL,
                total_assets TEXT NOT NULL,
                active INTEGER NOT NULL,
                target_allocation_bps INTEGER NOT NULL,
                last_rebalance_time TEXT,
                created_at TEXT NOT NULL
            );

            -- Depositor positions
            CREATE TABLE IF NOT EXISTS positions (
                pool_id TEXT NOT NULL,
                owner TEXT NOT NULL,
                shares TEXT NOT NULL,
                last_deposit_time TEXT NOT NULL,
                PRIMARY KEY (pool_id, owner)
            );

            -- Automation tick history
            CREATE TABLE IF NOT EXISTS ticks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                outcome TEXT NOT NULL,
                pool_id TEXT,
                detail TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ticks_timestamp ON ticks(timestamp);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Replace the stored snapshot.
    pub fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO ledger_state (id, taken_at) VALUES (1, ?1)
            ON CONFLICT(id) DO UPDATE SET taken_at = ?1
            "#,
            params![snapshot.taken_at.to_rfc3339()],
        )?;

        tx.execute("DELETE FROM pools", [])?;
        tx.execute("DELETE FROM positions", [])?;

        for (seq, pool) in snapshot.pools.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO pools (pool_id, seq, strategy_id, asset_id, total_shares, total_assets,
                                   active, target_allocation_bps, last_rebalance_time, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    pool.id.as_str(),
                    seq as i64,
                    pool.strategy_id,
                    pool.asset_id,
                    pool.total_shares.to_string(),
                    pool.total_assets.to_string(),
                    pool.active,
                    pool.target_allocation_bps,
                    pool.last_rebalance_time.map(|t| t.to_rfc3339()),
                    pool.created_at.to_rfc3339(),
                ],
            )?;
        }

        for position in &snapshot.positions {
            tx.execute(
                r#"
                INSERT INTO positions (pool_id, owner, shares, last_deposit_time)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    position.pool_id.as_str(),
                    position.owner.as_str(),
                    position.shares.to_string(),
                    position.last_deposit_time.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;

        debug!(
            pools = snapshot.pools.len(),
            positions = snapshot.positions.len(),
            "Snapshot saved to database"
        );
        Ok(())
    }

    /// Load the stored snapshot, if any.
    pub fn load_snapshot(&self) -> Result<Option<LedgerSnapshot>> {
        let taken_at: Option<String> = self
            .conn
            .query_row("SELECT taken_at FROM ledger_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(taken_at) = taken_at else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT pool_id, strategy_id, asset_id, total_shares, total_assets, active,
                   target_allocation_bps, last_rebalance_time, created_at
            FROM pools ORDER BY seq
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, u16>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut pools = Vec::with_capacity(rows.len());
        for (id, strategy_id, asset_id, shares, assets, active, bps, rebalanced, created) in rows {
            pools.push(Pool {
                id: parse_pool_id(&id)?,
                strategy_id,
                asset_id,
                total_shares: parse_amount(&shares)?,
                total_assets: parse_amount(&assets)?,
                active,
                target_allocation_bps: bps,
                last_rebalance_time: rebalanced.as_deref().map(parse_time).transpose()?,
                created_at: parse_time(&created)?,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT pool_id, owner, shares, last_deposit_time FROM positions ORDER BY pool_id, owner",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut positions = Vec::with_capacity(rows.len());
        for (pool_id, owner, shares, last_deposit) in rows {
            positions.push(Position {
                pool_id: parse_pool_id(&pool_id)?,
                owner: AccountId::new(owner),
                shares: parse_amount(&shares)?,
                last_deposit_time: parse_time(&last_deposit)?,
            });
        }

        let snapshot = LedgerSnapshot {
            taken_at: parse_time(&taken_at)?,
            pools,
            positions,
        };

        info!(
            pools = snapshot.pools.len(),
            positions = snapshot.positions.len(),
            taken_at = %snapshot.taken_at,
            "Loaded snapshot from database"
        );
        Ok(Some(snapshot))
    }

    /// Append one automation tick to the history.
    pub fn record_tick(&self, timestamp: DateTime<Utc>, outcome: &TickOutcome) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO ticks (timestamp, outcome, pool_id, detail)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                timestamp.to_rfc3339(),
                outcome.kind(),
                outcome.pool_id().map(PoolId::as_str),
                outcome.detail(),
            ],
        )?;
        Ok(())
    }

    /// Most recent ticks, newest first.
    pub fn recent_ticks(&self, limit: usize) -> Result<Vec<TickRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT timestamp, outcome, pool_id, detail
            FROM ticks
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(timestamp, outcome, pool_id, detail)| {
                Ok(TickRecord {
                    timestamp: parse_time(&timestamp)?,
                    outcome,
                    pool_id,
                    detail,
                })
            })
            .collect()
    }

    /// Clear all data (for testing or reset).
    pub fn clear_all(&self) -> Result<()> {
        warn!("Clearing all persistence data");
        self.conn.execute_batch(
            r#"
            DELETE FROM ledger_state;
            DELETE FROM pools;
            DELETE FROM positions;
            DELETE FROM ticks;
            "#,
        )?;
        Ok(())
    }
}

fn parse_amount(raw: &str) -> Result<u128> {
    raw.parse()
        .with_context(|| format!("Invalid stored amount {raw:?}"))
}

fn parse_pool_id(raw: &str) -> Result<PoolId> {
    PoolId::parse(raw).ok_or_else(|| anyhow!("Invalid stored pool id {raw:?}"))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VaultError;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    fn pool(byte: u8, strategy: &str) -> Pool {
        Pool {
            id: PoolId::from_bytes(&[byte; 20]).unwrap(),
            strategy_id: strategy.to_string(),
            asset_id: "USDC".to_string(),
            // Larger than u64 to make sure amounts survive as text
            total_shares: 40_000_000_000_000_000_000_000,
            total_assets: 41_234_567_890_123_456_789_012,
            active: true,
            target_allocation_bps: 8_000,
            last_rebalance_time: Some(at(3)),
            created_at: at(1),
        }
    }

    #[test]
    fn test_save_and_load_snapshot() {
        let manager = PersistenceManager::new(":memory:").unwrap();
        assert!(manager.load_snapshot().unwrap().is_none());

        let second = Pool {
            active: false,
            last_rebalance_time: None,
            ..pool(0xbb, "aave-dai")
        };
        let first = pool(0xff, "aave-usdc");
        let snapshot = LedgerSnapshot {
            taken_at: at(5),
            pools: vec![first.clone(), second.clone()],
            positions: vec![Position {
                pool_id: first.id.clone(),
                owner: AccountId::new("alice"),
                shares: first.total_shares,
                last_deposit_time: at(2),
            }],
        };

        manager.save_snapshot(&snapshot).unwrap();
        let loaded = manager.load_snapshot().unwrap().unwrap();

        assert_eq!(loaded.taken_at, at(5));
        // Creation order survives even though ids sort the other way
        assert_eq!(loaded.pools, vec![first, second]);
        assert_eq!(loaded.positions, snapshot.positions);

        // Saving again replaces rather than appends
        manager.save_snapshot(&snapshot).unwrap();
        assert_eq!(manager.load_snapshot().unwrap().unwrap().pools.len(), 2);
    }

    #[test]
    fn test_tick_history() {
        let manager = PersistenceManager::new(":memory:").unwrap();
        let pool_id = PoolId::from_bytes(&[1u8; 20]).unwrap();

        manager.record_tick(at(1), &TickOutcome::Idle).unwrap();
        manager
            .record_tick(
                at(2),
                &TickOutcome::Failed {
                    pool_id: Some(pool_id.clone()),
                    error: VaultError::CooldownActive { remaining_secs: 60 },
                },
            )
            .unwrap();

        let ticks = manager.recent_ticks(10).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].outcome, "failed");
        assert_eq!(ticks[0].pool_id.as_deref(), Some(pool_id.as_str()));
        assert!(ticks[0].detail.contains("cooldown"));
        assert_eq!(ticks[1].outcome, "idle");
        assert_eq!(ticks[1].pool_id, None);

        assert_eq!(manager.recent_ticks(1).unwrap().len(), 1);
    }

    #[test]
    fn test_clear_all() {
        let manager = PersistenceManager::new(":memory:").unwrap();
        manager
            .save_snapshot(&LedgerSnapshot {
                taken_at: at(1),
                pools: vec![pool(2, "aave-usdc")],
                positions: Vec::new(),
            })
            .unwrap();
        manager.record_tick(at(1), &TickOutcome::Idle).unwrap();

        manager.clear_all().unwrap();
        assert!(manager.load_snapshot().unwrap().is_none());
        assert!(manager.recent_ticks(10).unwrap().is_empty());
    }
}
