use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tpd_schemas::{OrderStatus, OrderType, Side, Timeframe};

#[derive(Debug, Clone)]
pub struct NewLiveOrder {
    pub live_signal_id: Option<i64>,
    pub strategy_universe_id: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub order_type: OrderType,
}

/// Inserts a `NEW` order. Rejections (`spec.md` §4.3 admission checks) never
/// reach this function — a rejected signal is logged to `live_errors` and
/// marked processed without an order row, matching the teacher's pattern of
/// keeping rejection reasons out of the order table.
pub async fn insert_new(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order: &NewLiveOrder,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into live_orders (
            live_signal_id, strategy_universe_id, symbol, timeframe,
            side, quantity, price, order_type, status
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, 'NEW')
        returning id
        "#,
    )
    .bind(order.live_signal_id)
    .bind(order.strategy_universe_id)
    .bind(&order.symbol)
    .bind(order.timeframe.as_str())
    .bind(order.side.as_str())
    .bind(order.quantity)
    .bind(order.price)
    .bind(order.order_type.as_str())
    .fetch_one(&mut **tx)
    .await
    .context("insert_new order failed")?;
    Ok(id)
}

#[derive(Debug, Clone)]
pub struct LiveOrderRow {
    pub id: i64,
    pub live_signal_id: Option<i64>,
    pub strategy_universe_id: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub broker_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reads up to `limit` `NEW` orders ordered by `created_at` (`spec.md` §4.4,
/// "Loop").
pub async fn fetch_new_batch(pool: &PgPool, limit: i64) -> Result<Vec<LiveOrderRow>> {
    let rows = sqlx::query_as::<
        _,
        (
            i64,
            Option<i64>,
            i64,
            String,
            String,
            String,
            Decimal,
            Option<Decimal>,
            String,
            String,
            Option<String>,
            DateTime<Utc>,
        ),
    >(
        r#"
        select id, live_signal_id, strategy_universe_id, symbol, timeframe,
               side, quantity, price, order_type, status, broker_order_id, created_at
        from live_orders
        where status = 'NEW'
        order by created_at asc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch_new_batch failed")?;

    rows.into_iter()
        .map(
            |(
                id,
                live_signal_id,
                strategy_universe_id,
                symbol,
                timeframe,
                side,
                quantity,
                price,
                order_type,
                status,
                broker_order_id,
                created_at,
            )| {
                Ok(LiveOrderRow {
                    id,
                    live_signal_id,
                    strategy_universe_id,
                    symbol,
                    timeframe: Timeframe::parse(&timeframe)
                        .context("invalid live_orders.timeframe")?,
                    side: Side::parse(&side).context("invalid live_orders.side")?,
                    quantity,
                    price,
                    order_type: OrderType::parse(&order_type)
                        .context("invalid live_orders.order_type")?,
                    status: OrderStatus::parse(&status).context("invalid live_orders.status")?,
                    broker_order_id,
                    created_at,
                })
            },
        )
        .collect()
}

/// Non-terminal orders for a `(strategy_universe_id, symbol)` pair, used to
/// build a strategy's view of its own open orders (`spec.md` §4.2, "Plug-in
/// contract").
pub async fn open_for_universe(
    pool: &PgPool,
    strategy_universe_id: i64,
    symbol: &str,
) -> Result<Vec<LiveOrderRow>> {
    let rows = sqlx::query_as::<
        _,
        (
            i64,
            Option<i64>,
            i64,
            String,
            String,
            String,
            Decimal,
            Option<Decimal>,
            String,
            String,
            Option<String>,
            DateTime<Utc>,
        ),
    >(
        r#"
        select id, live_signal_id, strategy_universe_id, symbol, timeframe,
               side, quantity, price, order_type, status, broker_order_id, created_at
        from live_orders
        where strategy_universe_id = $1 and symbol = $2
          and status in ('NEW', 'PARTIALLY_FILLED')
        order by created_at asc
        "#,
    )
    .bind(strategy_universe_id)
    .bind(symbol)
    .fetch_all(pool)
    .await
    .context("open_for_universe failed")?;

    rows.into_iter()
        .map(
            |(
                id,
                live_signal_id,
                strategy_universe_id,
                symbol,
                timeframe,
                side,
                quantity,
                price,
                order_type,
                status,
                broker_order_id,
                created_at,
            )| {
                Ok(LiveOrderRow {
                    id,
                    live_signal_id,
                    strategy_universe_id,
                    symbol,
                    timeframe: Timeframe::parse(&timeframe)
                        .context("invalid live_orders.timeframe")?,
                    side: Side::parse(&side).context("invalid live_orders.side")?,
                    quantity,
                    price,
                    order_type: OrderType::parse(&order_type)
                        .context("invalid live_orders.order_type")?,
                    status: OrderStatus::parse(&status).context("invalid live_orders.status")?,
                    broker_order_id,
                    created_at,
                })
            },
        )
        .collect()
}

/// Finalizes an order to `FILLED`, setting `broker_order_id` exactly once
/// (`spec.md` §3, live order invariants). Terminal statuses never revert, so
/// this must only be called on a `NEW` row.
pub async fn finalize_filled(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order_id: i64,
    broker_order_id: &str,
) -> Result<()> {
    sqlx::query(
        "update live_orders set status = 'FILLED', broker_order_id = $2 where id = $1 and status = 'NEW'",
    )
    .bind(order_id)
    .bind(broker_order_id)
    .execute(&mut **tx)
    .await
    .context("finalize_filled failed")?;
    Ok(())
}

pub async fn finalize_rejected(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order_id: i64,
) -> Result<()> {
    sqlx::query("update live_orders set status = 'REJECTED' where id = $1 and status = 'NEW'")
        .bind(order_id)
        .execute(&mut **tx)
        .await
        .context("finalize_rejected failed")?;
    Ok(())
}
