//! Paper-fills `NEW` orders against the latest 1m close (`spec.md` §4.4).
//! Grounded on `original_source/demons/fake_broker.py`'s poll loop.

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::PgPool;
use tpd_config::PipelineConfig;
use tpd_portfolio::{AccountSnapshot, PositionSnapshot};
use tpd_schemas::{ErrorSeverity, ErrorSource, OrderType};
use tpd_store::errors::NewLiveError;
use tpd_store::orders::LiveOrderRow;
use tpd_store::trades::NewLiveTrade;

/// `service_status` identifies this daemon as `fake_broker`
/// (`original_source/demons/fake_broker.py`'s heartbeat name), distinct from
/// the `broker` `live_errors.source` taxonomy value.
pub const SERVICE_NAME: &str = "fake_broker";

/// One poll iteration: drains up to `cfg.batch_size` `NEW` orders, oldest
/// first, each filled (or rejected) in its own transaction (`spec.md` §4.4,
/// "Loop").
pub async fn tick(pool: &PgPool, cfg: &PipelineConfig) -> Result<()> {
    let orders = tpd_store::orders::fetch_new_batch(pool, cfg.batch_size).await?;
    for order in &orders {
        if let Err(e) = fill_order(pool, cfg, order).await {
            tpd_store::errors::insert(
                pool,
                &NewLiveError {
                    source: ErrorSource::Broker,
                    severity: ErrorSeverity::Error,
                    message: format!("broker fill failed on order {}: {e:#}", order.id),
                    details_json: Some(json!({"live_order_id": order.id})),
                },
            )
            .await;
        }
    }
    Ok(())
}

async fn fill_order(pool: &PgPool, cfg: &PipelineConfig, order: &LiveOrderRow) -> Result<()> {
    if !matches!(
        order.order_type,
        OrderType::Market | OrderType::Limit | OrderType::Stop
    ) {
        return reject(pool, order, "unsupported_order_type").await;
    }

    let symbol = tpd_store::symbols::get_by_ticker(pool, &order.symbol).await?;
    let Some(symbol) = symbol else {
        return reject(pool, order, "no_market_price_for_symbol").await;
    };

    let price = tpd_store::candles::last_1m_close(pool, symbol.id).await?;
    let Some(exec_price) = price else {
        return reject(pool, order, "no_market_price_for_symbol").await;
    };

    let fee = tpd_portfolio::fee(order.quantity, exec_price, cfg.fee_rate);

    let mut tx = pool.begin().await.context("begin fill tx")?;

    let position = tpd_store::positions::lock_or_create(
        &mut tx,
        order.strategy_universe_id,
        &order.symbol,
        order.timeframe,
    )
    .await?;
    let snapshot = PositionSnapshot {
        direction: position.direction,
        quantity: position.quantity,
        avg_price: position.avg_price,
        realized_pnl: position.realized_pnl,
    };
    let new_snapshot = tpd_portfolio::apply_fill(&snapshot, order.side, order.quantity, exec_price)
        .context("partial reversal unsupported by the simple position model")?;
    tpd_store::positions::save(
        &mut tx,
        &tpd_store::positions::LivePosition {
            id: position.id,
            strategy_universe_id: position.strategy_universe_id,
            direction: new_snapshot.direction,
            quantity: new_snapshot.quantity,
            avg_price: new_snapshot.avg_price,
            realized_pnl: new_snapshot.realized_pnl,
            gap_mode: position.gap_mode,
        },
    )
    .await?;

    let account = tpd_store::account::lock(&mut tx).await?;
    let account_snapshot = AccountSnapshot {
        free_cash: account.free_cash,
        used_margin: account.used_margin,
        equity: account.equity,
    };
    let new_account =
        tpd_portfolio::apply_cash(&account_snapshot, order.side, order.quantity, exec_price, fee);
    tpd_store::account::save(
        &mut tx,
        &tpd_store::account::AccountState {
            equity: new_account.equity,
            free_cash: new_account.free_cash,
            used_margin: new_account.used_margin,
        },
    )
    .await?;

    tpd_store::trades::insert(
        &mut tx,
        &NewLiveTrade {
            live_order_id: order.id,
            symbol: order.symbol.clone(),
            timeframe: order.timeframe,
            side: order.side,
            quantity: order.quantity,
            price: exec_price,
            fee,
            executed_at: chrono::Utc::now(),
            trade_type: "FILL".to_string(),
        },
    )
    .await?;

    let broker_order_id = format!("fake-{}", order.id);
    tpd_store::orders::finalize_filled(&mut tx, order.id, &broker_order_id).await?;

    tx.commit().await.context("commit fill tx")?;
    Ok(())
}

async fn reject(pool: &PgPool, order: &LiveOrderRow, reason: &str) -> Result<()> {
    tpd_store::errors::insert(
        pool,
        &NewLiveError {
            source: ErrorSource::Broker,
            severity: ErrorSeverity::Warning,
            message: reason.to_string(),
            details_json: Some(json!({"live_order_id": order.id})),
        },
    )
    .await;

    let mut tx = pool.begin().await.context("begin reject tx")?;
    tpd_store::orders::finalize_rejected(&mut tx, order.id).await?;
    tx.commit().await.context("commit reject tx")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fee_matches_default_rate() {
        let fee = tpd_portfolio::fee(dec!(100), dec!(50), dec!(0.0001));
        assert_eq!(fee, dec!(0.5));
    }

    #[test]
    fn unsupported_order_type_detection() {
        assert!(!matches!(OrderType::Market, OrderType::Limit));
    }
}
