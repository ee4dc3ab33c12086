//! Bar-close dispatch to strategy plug-ins (`spec.md` §4.2). Grounded on
//! `original_source/demons`'s strategy-runner dispatch loop, wired to
//! `tpd_strategy::PluginRegistry`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tpd_config::PipelineConfig;
use tpd_schemas::{Bar, ErrorSeverity, ErrorSource, Timeframe};
use tpd_store::errors::NewLiveError;
use tpd_store::strategy::{StrategyCatalogEntry, StrategyUniverseRow};
use tpd_strategy::{
    OpenOrderView, PluginRegistry, PositionView, RiskFractions, Strategy, StrategyContext,
};

pub const SERVICE_NAME: &str = "strategy_runner";

/// One poll iteration: dispatches every aggregated timeframe's new bars to
/// matching strategy plug-ins (`spec.md` §4.2, "Dispatch loop"). Strategy
/// instances are stateless across bars in this model (every fact a plug-in
/// needs travels in `StrategyContext`), so a fresh registry per tick costs
/// nothing and needs no cross-tick cache.
pub async fn tick(pool: &PgPool, cfg: &PipelineConfig) -> Result<()> {
    let registry = tpd_strategy::builtin_registry();
    for tf in Timeframe::aggregated() {
        dispatch_timeframe(pool, cfg, &registry, tf).await?;
    }
    Ok(())
}

async fn dispatch_timeframe(
    pool: &PgPool,
    cfg: &PipelineConfig,
    registry: &PluginRegistry,
    tf: Timeframe,
) -> Result<()> {
    let watermark = tpd_store::watermarks::get_bar_watermark(pool, SERVICE_NAME, tf).await?;
    let bars = tpd_store::candles::fetch_tf_after(pool, tf, watermark, cfg.batch_size).await?;
    if bars.is_empty() {
        return Ok(());
    }

    let mut max_ts: Option<DateTime<Utc>> = None;
    for agg in &bars {
        let bar = agg.bar;
        max_ts = Some(max_ts.map_or(bar.ts, |m| m.max(bar.ts)));

        let symbol = match tpd_store::symbols::get_by_id(pool, bar.symbol_id).await? {
            Some(s) => s,
            None => continue,
        };

        let universes =
            tpd_store::strategy::active_universe_for_bar(pool, &symbol.ticker, tf).await?;
        if universes.is_empty() {
            continue;
        }

        let history = tpd_store::candles::history_window(
            pool,
            tf,
            bar.symbol_id,
            bar.ts,
            cfg.history_window,
        )
        .await?;

        for (universe, catalog) in universes {
            if let Err(e) = process_universe(
                pool,
                registry,
                &symbol.ticker,
                tf,
                &bar,
                agg.is_gap,
                &history,
                &universe,
                &catalog,
            )
            .await
            {
                tpd_store::errors::insert(
                    pool,
                    &NewLiveError {
                        source: ErrorSource::Strategy,
                        severity: ErrorSeverity::Warning,
                        message: format!(
                            "strategy '{}' failed on universe {} ({} {}): {e:#}",
                            catalog.code, universe.id, symbol.ticker, tf
                        ),
                        details_json: None,
                    },
                )
                .await;
                // Failure isolation: one strategy's error never blocks its
                // siblings or the bar's watermark advance (`spec.md` §4.2).
            }
        }
    }

    if let Some(ts) = max_ts {
        tpd_store::watermarks::advance_bar_watermark(pool, SERVICE_NAME, tf, ts).await?;
    }

    Ok(())
}

async fn process_universe(
    pool: &PgPool,
    registry: &PluginRegistry,
    ticker: &str,
    tf: Timeframe,
    bar: &Bar,
    is_gap: bool,
    history: &[Bar],
    universe: &StrategyUniverseRow,
    catalog: &StrategyCatalogEntry,
) -> Result<()> {
    let registry_key = catalog
        .registry_key()
        .context("strategy_catalog row has neither live_py_class nor py_class")?;
    let mut strategy: Box<dyn Strategy> = registry
        .instantiate(registry_key)
        .with_context(|| format!("no plug-in registered for '{registry_key}'"))?;

    let position = tpd_store::positions::fetch_by_universe(pool, universe.id, ticker, tf)
        .await?
        .filter(|p| p.direction != tpd_schemas::Direction::Flat)
        .map(|p| PositionView {
            direction: p.direction,
            quantity: p.quantity,
            avg_price: p.avg_price,
            realized_pnl: p.realized_pnl,
        });

    let open_orders = tpd_store::orders::open_for_universe(pool, universe.id, ticker)
        .await?
        .into_iter()
        .map(|o| OpenOrderView {
            side: o.side,
            quantity: o.quantity,
            order_type: o.order_type,
            status: o.status,
        })
        .collect();

    let ctx = StrategyContext {
        symbol: ticker.to_string(),
        timeframe: tf,
        bar: *bar,
        history: history.to_vec(),
        position,
        open_orders,
        params: universe.params_json.clone(),
        risk: RiskFractions {
            risk_per_trade: universe.risk_per_trade,
            max_drawdown_fraction: universe.max_drawdown_fraction,
            gap_threshold_fraction: universe.gap_threshold_fraction,
        },
    };

    let Some(signal) = strategy.on_bar(&ctx) else {
        return Ok(());
    };

    let signal_json = serde_json::to_value(&signal).context("serialize signal payload")?;
    tpd_store::signals::insert(
        pool,
        &tpd_store::signals::NewLiveSignal {
            strategy_universe_id: universe.id,
            symbol: ticker.to_string(),
            timeframe: tf,
            bar_timestamp: bar.ts,
            signal_timestamp: Utc::now(),
            signal_type: signal.signal_type,
            signal_json,
            gap_flag: is_gap,
        },
    )
    .await?;

    Ok(())
}
