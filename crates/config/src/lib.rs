//! Environment and tunable-constant loading shared by every daemon.
//!
//! DB connection parameters are strict env vars (`spec.md` §6,
//! "Environment / configuration"). Everything else is a compile-time
//! default overridable by env var, the way `mqk-risk::RiskConfig::sane_defaults()`
//! is a struct literal a caller can override field-by-field.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::time::Duration;

/// Builds the Postgres connection URL from `DATABASE_URL` if set, else from
/// `PG_HOST`/`PG_PORT`/`PG_DBNAME`/`PG_USER`/`PG_PASSWORD`.
pub fn database_url() -> Result<String> {
    if let Ok(url) = env::var("DATABASE_URL") {
        return Ok(url);
    }

    let host = env::var("PG_HOST").context("missing env var PG_HOST")?;
    let port = env::var("PG_PORT").context("missing env var PG_PORT")?;
    let dbname = env::var("PG_DBNAME").context("missing env var PG_DBNAME")?;
    let user = env::var("PG_USER").context("missing env var PG_USER")?;
    let password = env::var("PG_PASSWORD").context("missing env var PG_PASSWORD")?;

    Ok(format!(
        "postgres://{user}:{password}@{host}:{port}/{dbname}"
    ))
}

/// Loads `.env.local` if present (dev convenience, silent if absent), then
/// returns the resolved database URL. Call once at the top of each daemon's
/// `main()`.
pub fn bootstrap_env() -> Result<String> {
    let _ = dotenvy::from_filename(".env.local");
    database_url()
}

/// Tunable constants shared by the daemons, defaults as stated in `spec.md` §4.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Default per-(strategy_universe) gap fraction; `strategy_universe.gap_threshold_fraction`
    /// overrides this per row (`spec.md` §4.1, "Closing a bucket").
    pub gap_threshold: Decimal,
    /// Broker fee rate applied to notional (`spec.md` §4.4, "Fee").
    pub fee_rate: Decimal,
    /// Max rows pulled per tick by the strategy engine and broker adapter (`spec.md` §5, "Backpressure").
    pub batch_size: i64,
    /// History window length handed to `Strategy::on_bar` (`spec.md` §4.2, "Plug-in contract").
    pub history_window: i64,
    /// Per-service heartbeat staleness threshold (`spec.md` §4.5).
    pub heartbeat_timeout: Duration,
    /// Market-data staleness threshold before safe-mode (`spec.md` §4.5, "Market-data lag").
    pub data_lag_threshold: Duration,
    /// Tick sleep interval for the aggregator daemon (`spec.md` §5, "Suspension points").
    pub aggregator_tick: Duration,
    /// Tick sleep interval for the strategy runner daemon.
    pub strategy_runner_tick: Duration,
    /// Tick sleep interval for the execution/risk engine daemon.
    pub execution_tick: Duration,
    /// Tick sleep interval for the broker adapter daemon.
    pub broker_tick: Duration,
    /// Tick sleep interval for the health monitor daemon.
    pub health_monitor_tick: Duration,
}

impl PipelineConfig {
    pub fn sane_defaults() -> Self {
        Self {
            gap_threshold: dec!(0.20),
            fee_rate: dec!(0.0001),
            batch_size: 100,
            history_window: 500,
            heartbeat_timeout: Duration::from_secs(60),
            data_lag_threshold: Duration::from_secs(120),
            aggregator_tick: Duration::from_secs(3),
            strategy_runner_tick: Duration::from_secs(3),
            execution_tick: Duration::from_secs(2),
            broker_tick: Duration::from_secs(2),
            health_monitor_tick: Duration::from_secs(10),
        }
    }

    /// Applies env-var overrides on top of [`Self::sane_defaults`]. Unset or
    /// unparsable vars are ignored, leaving the default in place.
    pub fn from_env() -> Self {
        let mut cfg = Self::sane_defaults();

        if let Some(v) = parse_env_decimal("GAP_THRESHOLD") {
            cfg.gap_threshold = v;
        }
        if let Some(v) = parse_env_decimal("FEE_RATE") {
            cfg.fee_rate = v;
        }
        if let Some(v) = parse_env_i64("BATCH_SIZE") {
            cfg.batch_size = v;
        }
        if let Some(v) = parse_env_i64("HISTORY_WINDOW") {
            cfg.history_window = v;
        }
        if let Some(v) = parse_env_secs("HEARTBEAT_TIMEOUT_SECS") {
            cfg.heartbeat_timeout = v;
        }
        if let Some(v) = parse_env_secs("DATA_LAG_THRESHOLD_SECS") {
            cfg.data_lag_threshold = v;
        }

        cfg
    }
}

fn parse_env_decimal(name: &str) -> Option<Decimal> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

fn parse_env_i64(name: &str) -> Option<i64> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

fn parse_env_secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
