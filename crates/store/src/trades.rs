use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tpd_schemas::{Side, Timeframe};

#[derive(Debug, Clone)]
pub struct NewLiveTrade {
    pub live_order_id: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub executed_at: DateTime<Utc>,
    pub trade_type: String,
}

/// Appends a fill record. `live_trades` is append-only (`spec.md` §3).
pub async fn insert(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    trade: &NewLiveTrade,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into live_trades (
            live_order_id, symbol, timeframe, side, quantity, price, fee,
            executed_at, trade_type
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        returning id
        "#,
    )
    .bind(trade.live_order_id)
    .bind(&trade.symbol)
    .bind(trade.timeframe.as_str())
    .bind(trade.side.as_str())
    .bind(trade.quantity)
    .bind(trade.price)
    .bind(trade.fee)
    .bind(trade.executed_at)
    .bind(&trade.trade_type)
    .fetch_one(&mut **tx)
    .await
    .context("insert trade failed")?;
    Ok(id)
}

pub async fn fetch_for_order(pool: &PgPool, live_order_id: i64) -> Result<Vec<(Decimal, Decimal)>> {
    let rows = sqlx::query_as::<_, (Decimal, Decimal)>(
        "select quantity, price from live_trades where live_order_id = $1",
    )
    .bind(live_order_id)
    .fetch_all(pool)
    .await
    .context("fetch_for_order failed")?;
    Ok(rows)
}
