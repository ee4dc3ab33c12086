//! Signal-to-order conversion poll loop (`spec.md` §4.3). Grounded on
//! `original_source/demons/execution_engine.py`'s `process_signal`, wired to
//! `tpd_risk`'s pure admission/sizing logic.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use tpd_config::PipelineConfig;
use tpd_risk::{AdmissionContext, RejectReason};
use tpd_schemas::{Direction, ErrorSeverity, ErrorSource, OrderType, Side, SignalPayload, SizeMode};
use tpd_store::errors::NewLiveError;
use tpd_store::orders::NewLiveOrder;
use tpd_store::signals::LiveSignalRow;
use tpd_store::strategy::StrategyUniverseRow;

/// `service_status`/`live_errors` identify this daemon as `execution_engine`
/// (`original_source/demons/execution_engine.py`'s heartbeat name), distinct
/// from the `execution` `live_errors.source` taxonomy value.
pub const SERVICE_NAME: &str = "execution_engine";

/// One poll iteration: drains up to `cfg.batch_size` unprocessed signals,
/// oldest first, each in its own unit of work (`spec.md` §4.3, "Loop").
pub async fn tick(pool: &PgPool, cfg: &PipelineConfig) -> Result<()> {
    let signals = tpd_store::signals::fetch_unprocessed_batch(pool, cfg.batch_size).await?;
    for signal in &signals {
        process_with_containment(pool, signal).await;
    }
    Ok(())
}

/// Wraps [`process_signal`]: on an unexpected error, logs it and marks the
/// signal processed in a standalone transaction so a single poison-pill
/// signal cannot block the queue forever (`spec.md` §4.3, "Transactional
/// scope"). Rejections are not errors — `process_signal` already logs and
/// marks those itself as part of its normal return path.
async fn process_with_containment(pool: &PgPool, signal: &LiveSignalRow) {
    if let Err(e) = process_signal(pool, signal).await {
        tpd_store::errors::insert(
            pool,
            &NewLiveError {
                source: ErrorSource::Execution,
                severity: ErrorSeverity::Error,
                message: format!("execution failed on signal {}: {e:#}", signal.id),
                details_json: None,
            },
        )
        .await;
        if let Err(e2) = mark_processed_standalone(pool, signal.id).await {
            tracing::error!(error = %e2, signal_id = signal.id, "poison-pill containment failed to mark signal processed");
        }
    }
}

async fn mark_processed_standalone(pool: &PgPool, signal_id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("begin mark-processed tx")?;
    tpd_store::signals::mark_processed(&mut tx, signal_id).await?;
    tx.commit().await.context("commit mark-processed tx")?;
    Ok(())
}

async fn process_signal(pool: &PgPool, signal: &LiveSignalRow) -> Result<()> {
    let control = tpd_store::control::read(pool).await?;

    let universe = match tpd_store::strategy::get_universe_row(pool, signal.strategy_universe_id)
        .await?
    {
        Some(u) => u,
        None => {
            return reject(
                pool,
                signal,
                ErrorSource::Execution,
                ErrorSeverity::Error,
                RejectReason::MissingStrategyUniverse.as_str(),
            )
            .await;
        }
    };

    let total_open_positions = tpd_store::positions::count_total_open(pool).await?;
    let open_positions_for_strategy =
        tpd_store::positions::count_open_for_universe(pool, universe.id).await?;
    let admission_ctx = AdmissionContext {
        allow_trading: control.allow_trading,
        allow_new_positions: control.allow_new_positions,
        total_open_positions,
        open_positions_for_strategy,
        max_total_positions: universe.max_total_positions as i64,
        max_positions_per_strategy: universe.max_positions_per_strategy as i64,
    };

    if let Err(reason) = tpd_risk::check_admission(&admission_ctx, signal.signal_type) {
        let (source, severity) = reject_classification(reason);
        return reject(pool, signal, source, severity, reason.as_str()).await;
    }

    if signal.signal_type.is_close() {
        return process_close(pool, signal, &universe).await;
    }

    process_entry(pool, signal, &universe).await
}

async fn process_entry(
    pool: &PgPool,
    signal: &LiveSignalRow,
    universe: &StrategyUniverseRow,
) -> Result<()> {
    let payload: SignalPayload = serde_json::from_value(signal.signal_json.clone())
        .context("deserialize live_signals.signal_json")?;

    let side = match tpd_risk::derive_side(payload.direction) {
        Ok(s) => s,
        Err(reason) => {
            return reject(
                pool,
                signal,
                ErrorSource::Execution,
                ErrorSeverity::Warning,
                reason.as_str(),
            )
            .await;
        }
    };

    let symbol = tpd_store::symbols::get_by_ticker(pool, &signal.symbol)
        .await?
        .with_context(|| format!("unknown symbol '{}'", signal.symbol))?;
    let account = tpd_store::account::read(pool).await?;

    let input = tpd_risk::SizingInput {
        equity: account.equity,
        free_cash: account.free_cash,
        lot_size: symbol.lot_size,
        entry_price: payload.entry_price.unwrap_or(Decimal::ZERO),
        stop_loss: payload.stop_loss.unwrap_or(Decimal::ZERO),
        size_mode: payload.size_mode.unwrap_or(SizeMode::RiskFraction),
        size_value: payload.size_value.unwrap_or(Decimal::ONE),
        risk_per_trade: universe.risk_per_trade,
        max_drawdown_fraction: universe.max_drawdown_fraction,
    };

    let outcome = match tpd_risk::size_entry(&input) {
        Ok(o) => o,
        Err(reason) => {
            return reject(
                pool,
                signal,
                ErrorSource::Risk,
                ErrorSeverity::Warning,
                reason.as_str(),
            )
            .await;
        }
    };

    let price = if payload.entry_type == OrderType::Market {
        None
    } else {
        payload.entry_price
    };

    let mut tx = pool.begin().await.context("begin order insert tx")?;
    tpd_store::orders::insert_new(
        &mut tx,
        &NewLiveOrder {
            live_signal_id: Some(signal.id),
            strategy_universe_id: universe.id,
            symbol: signal.symbol.clone(),
            timeframe: signal.timeframe,
            side,
            quantity: outcome.quantity,
            price,
            order_type: payload.entry_type,
        },
    )
    .await?;
    tpd_store::signals::mark_processed(&mut tx, signal.id).await?;
    tx.commit().await.context("commit order insert tx")?;
    Ok(())
}

async fn process_close(
    pool: &PgPool,
    signal: &LiveSignalRow,
    universe: &StrategyUniverseRow,
) -> Result<()> {
    let position = tpd_store::positions::fetch_by_universe(
        pool,
        universe.id,
        &signal.symbol,
        signal.timeframe,
    )
    .await?
    .filter(|p| p.quantity > Decimal::ZERO);

    let Some(position) = position else {
        tpd_store::errors::insert(
            pool,
            &NewLiveError {
                source: ErrorSource::Execution,
                severity: ErrorSeverity::Info,
                message: "close_without_position".to_string(),
                details_json: Some(json!({"live_signal_id": signal.id})),
            },
        )
        .await;
        return mark_processed_standalone(pool, signal.id).await;
    };

    let side = match position.direction {
        Direction::Long => Side::Sell,
        Direction::Short => Side::Buy,
        Direction::Flat => return mark_processed_standalone(pool, signal.id).await,
    };

    let mut tx = pool.begin().await.context("begin close order insert tx")?;
    tpd_store::orders::insert_new(
        &mut tx,
        &NewLiveOrder {
            live_signal_id: Some(signal.id),
            strategy_universe_id: universe.id,
            symbol: signal.symbol.clone(),
            timeframe: signal.timeframe,
            side,
            quantity: position.quantity,
            price: None,
            order_type: OrderType::Market,
        },
    )
    .await?;
    tpd_store::signals::mark_processed(&mut tx, signal.id).await?;
    tx.commit().await.context("commit close order insert tx")?;
    Ok(())
}

/// `(source, severity)` a rejection reason is logged with. Control-driven
/// and structural rejections are `execution`-sourced; sizing and position
/// caps are `risk`-sourced, matching
/// `original_source::process_signal`'s `source="execution"` vs
/// `source="risk"` split (`spec.md` §4.3).
fn reject_classification(reason: RejectReason) -> (ErrorSource, ErrorSeverity) {
    use RejectReason::*;
    match reason {
        MissingStrategyUniverse => (ErrorSource::Execution, ErrorSeverity::Error),
        TradingDisabledByControl | NewPositionsDisabledByControl => {
            (ErrorSource::Execution, ErrorSeverity::Info)
        }
        MaxTotalPositionsExceeded | MaxPositionsPerStrategyExceeded => {
            (ErrorSource::Risk, ErrorSeverity::Warning)
        }
        UnsupportedSizeMode | InvalidRiskSpan | TooWideStop | SizeTooSmall
        | InsufficientCash => (ErrorSource::Risk, ErrorSeverity::Warning),
        InvalidDirectionForOpen => (ErrorSource::Execution, ErrorSeverity::Warning),
    }
}

async fn reject(
    pool: &PgPool,
    signal: &LiveSignalRow,
    source: ErrorSource,
    severity: ErrorSeverity,
    reason: &str,
) -> Result<()> {
    tpd_store::errors::insert(
        pool,
        &NewLiveError {
            source,
            severity,
            message: reason.to_string(),
            details_json: Some(json!({"live_signal_id": signal.id})),
        },
    )
    .await;
    mark_processed_standalone(pool, signal.id).await
}
