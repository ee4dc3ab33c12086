use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use tpd_schemas::{StrategyMode, Timeframe};

#[derive(Debug, Clone)]
pub struct StrategyCatalogEntry {
    pub id: i64,
    pub code: String,
    pub py_module: Option<String>,
    pub py_class: Option<String>,
    pub live_py_module: Option<String>,
    pub live_py_class: Option<String>,
    pub enabled: bool,
}

impl StrategyCatalogEntry {
    /// Registry key used to resolve a plug-in: prefers the live module/class,
    /// falls back to the offline one (`spec.md` §4.2, "Dispatch loop").
    pub fn registry_key(&self) -> Option<&str> {
        self.live_py_class
            .as_deref()
            .or(self.py_class.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct StrategyUniverseRow {
    pub id: i64,
    pub strategy_id: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub enabled: bool,
    pub mode: StrategyMode,
    pub params_json: Value,
    pub risk_per_trade: Decimal,
    pub max_drawdown_fraction: Decimal,
    pub gap_threshold_fraction: Option<Decimal>,
    pub max_positions_per_strategy: i32,
    pub max_total_positions: i32,
}

/// Joins `strategy_universe` with `strategy_catalog` for one (symbol,
/// timeframe) pair, filtered to rows both sides agree are active and whose
/// mode is paper or live (`spec.md` §4.2, dispatch step 2).
#[derive(sqlx::FromRow)]
struct ActiveUniverseRow {
    id: i64,
    strategy_id: i64,
    symbol: String,
    enabled: bool,
    mode: String,
    params_json: Value,
    risk_per_trade: Decimal,
    max_drawdown_fraction: Decimal,
    gap_threshold_fraction: Option<Decimal>,
    max_positions_per_strategy: i32,
    max_total_positions: i32,
    code: String,
    py_module: Option<String>,
    py_class: Option<String>,
    live_py_module: Option<String>,
    live_py_class: Option<String>,
    catalog_enabled: bool,
}

pub async fn active_universe_for_bar(
    pool: &PgPool,
    symbol: &str,
    tf: Timeframe,
) -> Result<Vec<(StrategyUniverseRow, StrategyCatalogEntry)>> {
    let rows = sqlx::query_as::<_, ActiveUniverseRow>(
        r#"
        select
            u.id, u.strategy_id, u.symbol, u.enabled, u.mode, u.params_json,
            u.risk_per_trade, u.max_drawdown_fraction, u.gap_threshold_fraction,
            u.max_positions_per_strategy, u.max_total_positions,
            c.code, c.py_module, c.py_class, c.live_py_module, c.live_py_class, c.enabled
        from strategy_universe u
        join strategy_catalog c on c.id = u.strategy_id
        where u.symbol = $1 and u.timeframe = $2
          and u.enabled and c.enabled
          and u.mode in ('paper', 'live')
        "#,
    )
    .bind(symbol)
    .bind(tf.as_str())
    .fetch_all(pool)
    .await
    .context("active_universe_for_bar failed")?;

    rows.into_iter()
        .map(
            |ActiveUniverseRow {
                 id,
                 strategy_id,
                 symbol,
                 enabled,
                 mode,
                 params_json,
                 risk_per_trade,
                 max_drawdown_fraction,
                 gap_threshold_fraction,
                 max_positions_per_strategy,
                 max_total_positions,
                 code,
                 py_module,
                 py_class,
                 live_py_module,
                 live_py_class,
                 catalog_enabled,
             }| {
                let mode = StrategyMode::parse(&mode).context("invalid strategy_universe.mode")?;
                Ok((
                    StrategyUniverseRow {
                        id,
                        strategy_id,
                        symbol,
                        timeframe: tf,
                        enabled,
                        mode,
                        params_json,
                        risk_per_trade,
                        max_drawdown_fraction,
                        gap_threshold_fraction,
                        max_positions_per_strategy,
                        max_total_positions,
                    },
                    StrategyCatalogEntry {
                        id: strategy_id,
                        code,
                        py_module,
                        py_class,
                        live_py_module,
                        live_py_class,
                        enabled: catalog_enabled,
                    },
                ))
            },
        )
        .collect()
}

/// Resolves a `strategy_universe` row by id, or `None` if it no longer
/// exists (`spec.md` §4.3, admission check 1).
pub async fn get_universe_row(pool: &PgPool, id: i64) -> Result<Option<StrategyUniverseRow>> {
    let row = sqlx::query_as::<
        _,
        (
            i64,
            i64,
            String,
            String,
            bool,
            String,
            Value,
            Decimal,
            Decimal,
            Option<Decimal>,
            i32,
            i32,
        ),
    >(
        r#"
        select id, strategy_id, symbol, timeframe, enabled, mode, params_json,
               risk_per_trade, max_drawdown_fraction, gap_threshold_fraction,
               max_positions_per_strategy, max_total_positions
        from strategy_universe
        where id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("get_universe_row failed")?;

    row.map(
        |(
            id,
            strategy_id,
            symbol,
            timeframe,
            enabled,
            mode,
            params_json,
            risk_per_trade,
            max_drawdown_fraction,
            gap_threshold_fraction,
            max_positions_per_strategy,
            max_total_positions,
        )| {
            Ok(StrategyUniverseRow {
                id,
                strategy_id,
                symbol,
                timeframe: Timeframe::parse(&timeframe)
                    .context("invalid strategy_universe.timeframe")?,
                enabled,
                mode: StrategyMode::parse(&mode).context("invalid strategy_universe.mode")?,
                params_json,
                risk_per_trade,
                max_drawdown_fraction,
                gap_threshold_fraction,
                max_positions_per_strategy,
                max_total_positions,
            })
        },
    )
    .transpose()
}
