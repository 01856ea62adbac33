//! Yield Router - Main Entry Point
//!
//! Runs the vault against in-memory tokens and lending markets, with automated
//! rebalancing and SQLite snapshots.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use yield_router::automation::{AutomationGate, RebalanceScheduler, TickHook, TickOutcome};
use yield_router::config::{Config, SimulatedPool};
use yield_router::external::{
    AccountId, FungibleAsset, MockLendingPool, MockPriceFeed, MockToken,
};
use yield_router::ledger::{LedgerSettings, PoolId, VaultLedger};
use yield_router::persistence::PersistenceManager;
use yield_router::strategy::{AaveStrategy, StrategyAccounts, StrategyAdapter};
use yield_router::utils::decimal::{bps_to_ratio, share_price, to_units};
use yield_router::utils::{Clock, SystemClock};

/// Yield Router CLI
#[derive(Parser)]
#[command(name = "yield-router")]
#[command(version, about = "Share-based yield vault with automated strategy rebalancing")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulated vault (default)
    Run {
        /// Stop after this many ticks instead of waiting for Ctrl-C
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Show the last persisted ledger snapshot
    Status {
        /// Path to SQLite database (default: persistence.db_path from config)
        #[arg(short, long)]
        db: Option<String>,

        /// Show positions and recent automation ticks
        #[arg(short, long)]
        verbose: bool,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

/// One simulated pool and the collaborators behind it.
struct SimulatedVenue {
    pool_id: PoolId,
    asset: String,
    decimals: u32,
    token: Arc<MockToken>,
    market: Arc<MockLendingPool>,
    strategy: Arc<AaveStrategy>,
}

#[derive(Debug, Default)]
struct RunMetrics {
    ticks: u64,
    rebalances: u64,
    failures: u64,
    yield_accrued: u128,
}

/// Per-tick simulation work around the scheduler: yield accrual, persistence, status.
struct SimulationHook<'a> {
    ledger: &'a VaultLedger,
    controller: AccountId,
    venues: &'a [SimulatedVenue],
    yield_bps: u32,
    persistence: PersistenceManager,
    max_ticks: Option<u64>,
    metrics: RunMetrics,
}

#[async_trait]
impl TickHook for SimulationHook<'_> {
    async fn before_tick(&mut self, tick: u64) {
        self.metrics.ticks = tick;

        // Yield accrues in the markets, then reaches share prices through a sync
        for venue in self.venues {
            let minted = venue.market.accrue_bps(self.yield_bps).await;
            self.metrics.yield_accrued += minted;
            if let Err(e) = self
                .ledger
                .sync_total_assets(&self.controller, &venue.pool_id)
                .await
            {
                warn!(pool = %venue.pool_id, error = %e, "Failed to sync pool totals");
            }
        }
    }

    async fn after_tick(&mut self, tick: u64, outcome: &TickOutcome) -> bool {
        match outcome {
            TickOutcome::Idle => debug!(tick, "No pool needs rebalancing"),
            TickOutcome::Rebalanced(report) => {
                self.metrics.rebalances += 1;
                info!(
                    tick,
                    pool = %report.pool_id.short(),
                    action = %report.outcome.action,
                    from_bps = report.outcome.from_bps,
                    to_bps = report.outcome.to_bps,
                    "⚖️  [AUTOMATION] Pool rebalanced"
                );
            }
            TickOutcome::Failed { error, .. } => {
                self.metrics.failures += 1;
                warn!(tick, error = %error, "⚠️  [AUTOMATION] Upkeep failed");
            }
        }

        if let Err(e) = self.persistence.record_tick(Utc::now(), outcome) {
            error!("❌ [PERSISTENCE] Failed to record tick: {}", e);
        }
        let snapshot = self.ledger.snapshot().await;
        if let Err(e) = self.persistence.save_snapshot(&snapshot) {
            error!("❌ [PERSISTENCE] Failed to save snapshot: {}", e);
        }

        log_status(self.ledger, self.venues, &self.metrics).await;

        if self.max_ticks.is_some_and(|max| tick >= max) {
            info!(ticks = tick, "Tick limit reached");
            return false;
        }
        true
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Some(Commands::Status { db, verbose, json }) => {
            let db = db.unwrap_or_else(|| config.persistence.db_path.clone());
            show_status(&db, verbose, json)
        }
        Some(Commands::Run { ticks }) => run_simulation(&config, ticks).await,
        None => run_simulation(&config, None).await,
    }
}

async fn run_simulation(config: &Config, max_ticks: Option<u64>) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║       Yield Router v{} - Simulated Vault                  ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(config);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = Arc::new(VaultLedger::new(
        LedgerSettings::from(&config.ledger),
        clock.clone(),
    ));
    let controller = ledger.settings().controller.clone();
    let price_feed = Arc::new(MockPriceFeed::new());

    let mut venues = Vec::with_capacity(config.simulation.pools.len());
    for pool in &config.simulation.pools {
        let venue = open_venue(config, &ledger, pool, clock.clone(), price_feed.clone()).await?;
        venues.push(venue);
    }

    for venue in &venues {
        seed_deposits(config, &ledger, venue).await?;
    }

    if let Some(parent) = Path::new(&config.persistence.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
    }
    let persistence = PersistenceManager::new(&config.persistence.db_path)?;

    let scheduler = RebalanceScheduler::new(AutomationGate::new(
        ledger.clone(),
        config.automation.drift_threshold_bps,
    ));
    let interval = Duration::from_secs(config.automation.tick_interval_secs);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    info!("🚀 Starting automation loop...");
    let mut hook = SimulationHook {
        ledger: &ledger,
        controller,
        venues: &venues,
        yield_bps: config.simulation.yield_bps_per_tick,
        persistence,
        max_ticks,
        metrics: RunMetrics::default(),
    };
    scheduler.run(interval, shutdown, &mut hook).await;
    let SimulationHook {
        persistence,
        metrics,
        ..
    } = hook;

    let violations = ledger.check_invariants().await;
    if violations.is_empty() {
        info!("✅ Ledger invariants hold");
    } else {
        for violation in &violations {
            error!("❌ Ledger invariant violated: {}", violation);
        }
    }

    info!("💾 [PERSISTENCE] Saving final snapshot...");
    persistence
        .save_snapshot(&ledger.snapshot().await)
        .context("Failed to save final snapshot")?;

    info!(
        ticks = metrics.ticks,
        rebalances = metrics.rebalances,
        failures = metrics.failures,
        yield_accrued = metrics.yield_accrued,
        "👋 Yield Router shutdown complete"
    );
    Ok(())
}

/// Create the token, lending market and strategy for one pool and register it.
async fn open_venue(
    config: &Config,
    ledger: &VaultLedger,
    pool: &SimulatedPool,
    clock: Arc<dyn Clock>,
    price_feed: Arc<MockPriceFeed>,
) -> Result<SimulatedVenue> {
    let slug = pool.asset.to_lowercase();
    let settings = ledger.settings();

    let token = Arc::new(MockToken::new(pool.asset.clone(), pool.decimals));
    let market = Arc::new(MockLendingPool::new(
        AccountId::new(format!("aave-{slug}")),
        token.clone(),
    ));
    price_feed
        .set_price(&pool.asset, pool.price, clock.now())
        .await;

    let strategy = Arc::new(
        AaveStrategy::new(
            format!("aave-{slug}"),
            StrategyAccounts {
                account: AccountId::new(format!("strategy-{slug}")),
                owner: settings.controller.clone(),
                vault: settings.custody.clone(),
            },
            token.clone(),
            market.clone(),
            clock,
            config.strategy.clone(),
        )
        .with_target_bps(pool.target_bps)
        .with_price_feed(price_feed),
    );

    let pool_id = ledger
        .create_pool(&settings.controller, strategy.clone(), token.clone())
        .await
        .with_context(|| format!("Failed to create pool for {}", pool.asset))?;

    info!(
        pool = %pool_id,
        asset = %pool.asset,
        target_bps = pool.target_bps,
        "🏦 [INIT] Pool opened"
    );

    Ok(SimulatedVenue {
        pool_id,
        asset: pool.asset.clone(),
        decimals: pool.decimals,
        token: token.clone(),
        market,
        strategy,
    })
}

/// Fund the configured depositors and deposit on their behalf.
async fn seed_deposits(config: &Config, ledger: &VaultLedger, venue: &SimulatedVenue) -> Result<()> {
    let unit = 10u128
        .checked_pow(venue.decimals)
        .context("Token decimals too large")?;
    let amount = u128::from(config.simulation.seed_deposit) * unit;

    for i in 0..config.simulation.depositors {
        let depositor = AccountId::new(format!("depositor-{i}"));
        venue.token.mint(&depositor, amount).await;
        venue
            .token
            .approve(&depositor, ledger.custody_account(), amount)
            .await?;
        let shares = ledger
            .deposit(&depositor, &venue.pool_id, &venue.token.asset_id(), amount)
            .await
            .with_context(|| format!("Seed deposit of {depositor} failed"))?;
        debug!(%depositor, pool = %venue.pool_id.short(), amount, shares, "Seed deposit");
    }

    info!(
        asset = %venue.asset,
        depositors = config.simulation.depositors,
        "🌱 [INIT] Pool seeded"
    );
    Ok(())
}

/// Log one line per pool.
async fn log_status(ledger: &VaultLedger, venues: &[SimulatedVenue], metrics: &RunMetrics) {
    for venue in venues {
        let Ok(pool) = ledger.pool(&venue.pool_id).await else {
            continue;
        };
        let allocation = venue.strategy.current_allocation_bps().await.unwrap_or_default();
        let value_usd = match venue.strategy.valuation_usd().await {
            Ok(value) => value.round_dp(2).to_string(),
            Err(e) => {
                debug!(asset = %venue.asset, error = %e, "Valuation unavailable");
                "n/a".to_string()
            }
        };
        let total = to_units(pool.total_assets, venue.decimals).unwrap_or(Decimal::ZERO);

        info!(
            tick = metrics.ticks,
            asset = %venue.asset,
            total_assets = %total.round_dp(4),
            share_price = %share_price(pool.total_assets, pool.total_shares).round_dp(8),
            allocation_bps = allocation,
            target_bps = pool.target_allocation_bps,
            value_usd = %value_usd,
            "📊 [STATUS] Pool"
        );
    }
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "yield-router.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("yield_router=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Controller:          {}", config.ledger.controller);
    info!("   Custody Account:     {}", config.ledger.custody_account);
    info!("   Min Deposit:         {}", config.ledger.min_deposit);
    info!(
        "   Drift Threshold:     {} bps ({}%)",
        config.automation.drift_threshold_bps,
        bps_to_ratio(config.automation.drift_threshold_bps) * Decimal::ONE_HUNDRED
    );
    info!("   Tick Interval:       {}s", config.automation.tick_interval_secs);
    info!("   Rebalance Cooldown:  {}s", config.strategy.cooldown_secs);
    info!("   Self-trigger:        {} bps", config.strategy.rebalance_trigger_bps);
    info!("   Yield per Tick:      {} bps", config.simulation.yield_bps_per_tick);
    info!("   Database:            {}", config.persistence.db_path);
    for pool in &config.simulation.pools {
        info!(
            "   Pool {:<6} target {} bps, {} decimals, ${}",
            pool.asset, pool.target_bps, pool.decimals, pool.price
        );
    }
}

/// Show the last persisted snapshot.
fn show_status(db_path: &str, verbose: bool, json: bool) -> Result<()> {
    let exists = Path::new(db_path).exists();
    if json {
        anyhow::ensure!(exists, "Database not found: {}", db_path);
        let persistence = PersistenceManager::new(db_path)?;
        let snapshot = persistence.load_snapshot()?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              YIELD ROUTER STATUS                           ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    if !exists {
        println!("\n❌ Database not found: {}", db_path);
        println!("   The vault has not been run yet, or the database path is incorrect.");
        return Ok(());
    }

    let persistence = PersistenceManager::new(db_path)?;

    let Some(snapshot) = persistence.load_snapshot()? else {
        println!("\n❌ No saved snapshot found in database.");
        return Ok(());
    };

    println!(
        "\n📸 Snapshot taken {}",
        snapshot.taken_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    for pool in &snapshot.pools {
        let depositors = snapshot
            .positions
            .iter()
            .filter(|p| p.pool_id == pool.id && p.shares > 0)
            .count();
        println!("\n🏦 Pool {} ({})", pool.id.short(), pool.asset_id);
        println!("   ├─ Strategy:        {}", pool.strategy_id);
        println!("   ├─ Active:          {}", pool.active);
        println!("   ├─ Total Assets:    {}", pool.total_assets);
        println!("   ├─ Total Shares:    {}", pool.total_shares);
        println!(
            "   ├─ Share Price:     {:.8}",
            share_price(pool.total_assets, pool.total_shares)
        );
        println!("   ├─ Target:          {} bps", pool.target_allocation_bps);
        println!("   ├─ Depositors:      {}", depositors);
        match pool.last_rebalance_time {
            Some(at) => println!("   └─ Last Rebalance:  {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => println!("   └─ Last Rebalance:  never"),
        }

        if verbose {
            for position in snapshot.positions.iter().filter(|p| p.pool_id == pool.id) {
                println!(
                    "       {} holds {} shares (last deposit {})",
                    position.owner,
                    position.shares,
                    position.last_deposit_time.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }

    if verbose {
        let ticks = persistence.recent_ticks(10)?;
        if !ticks.is_empty() {
            println!("\n⏱️  Recent Ticks");
            for tick in &ticks {
                println!(
                    "   ├─ {} {:<10} {} {}",
                    tick.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    tick.outcome,
                    tick.pool_id.as_deref().map_or("-", |id| &id[..id.len().min(8)]),
                    tick.detail
                );
            }
        }
    }

    println!();
    Ok(())
}
