//! Scenario S2 — a closing bucket that gaps down against an open LONG
//! position flags that position's `gap_mode`, without emitting any order
//! itself (`spec.md` §8, S2). Skips if `DATABASE_URL` is unset.

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use tpd_schemas::Bar;

#[tokio::test]
async fn down_gap_sets_gap_mode_on_long_position() -> anyhow::Result<()> {
    let Some(pool) = tpd_store::testkit_db_pool().await? else {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    };

    let ticker = format!("AG_{:x}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
    let (symbol_id,): (i64,) =
        sqlx::query_as("insert into symbols (ticker, lot_size) values ($1, 1) returning id")
            .bind(&ticker)
            .fetch_one(&pool)
            .await?;

    let (strategy_id,): (i64,) = sqlx::query_as(
        "insert into strategy_catalog (code, live_py_module, live_py_class) values ($1, 'm', 'noop') returning id",
    )
    .bind(format!("STRAT_{ticker}"))
    .fetch_one(&pool)
    .await?;

    let (universe_id,): (i64,) = sqlx::query_as(
        r#"
        insert into strategy_universe (
            strategy_id, symbol, timeframe, mode, risk_per_trade,
            max_drawdown_fraction, max_positions_per_strategy, max_total_positions
        ) values ($1, $2, '5m', 'paper', 0.02, 0.20, 10, 10)
        returning id
        "#,
    )
    .bind(strategy_id)
    .bind(&ticker)
    .fetch_one(&pool)
    .await?;

    sqlx::query(
        "insert into live_positions (strategy_universe_id, symbol, timeframe, direction, quantity, avg_price) values ($1, $2, '5m', 'LONG', 10, 100)",
    )
    .bind(universe_id)
    .bind(&ticker)
    .execute(&pool)
    .await?;

    // Anchor far enough into the future that this test's watermark advance
    // never collides with another test's run on the same shared DB.
    let probe = Utc::now() + Duration::minutes(120);
    let (bucket_start, bucket_end) = tpd_aggregator::bucket_bounds(probe, 5);

    sqlx::query(
        "insert into candles_5m (symbol_id, ts, open, high, low, close, volume) values ($1, $2, 100, 100, 100, 100, 0)",
    )
    .bind(symbol_id)
    .bind(bucket_start)
    .execute(&pool)
    .await?;

    let minute_in_bucket = Bar {
        symbol_id,
        ts: bucket_start + Duration::minutes(2),
        open: dec!(100),
        high: dec!(100),
        low: dec!(70),
        close: dec!(70),
        volume: dec!(5),
    };
    let rollover_minute = Bar {
        symbol_id,
        ts: bucket_end,
        open: dec!(70),
        high: dec!(70),
        low: dec!(70),
        close: dec!(70),
        volume: dec!(5),
    };
    tpd_store::candles::insert_1m(&pool, &minute_in_bucket).await?;
    tpd_store::candles::insert_1m(&pool, &rollover_minute).await?;

    let mut state = tpd_aggregator::AggregatorState::bootstrap(&pool).await?;
    let cfg = tpd_config::PipelineConfig::sane_defaults();
    tpd_aggregator::tick(&pool, &mut state, &cfg).await?;

    let (is_gap, gap_dir): (bool, Option<String>) = sqlx::query_as(
        "select is_gap, gap_dir from candles_5m where symbol_id = $1 and ts = $2",
    )
    .bind(symbol_id)
    .bind(bucket_start + Duration::minutes(5))
    .fetch_one(&pool)
    .await?;
    assert!(is_gap, "a 30% down move must be flagged as a gap");
    assert_eq!(gap_dir.as_deref(), Some("DOWN"));

    let (gap_mode,): (bool,) = sqlx::query_as(
        "select gap_mode from live_positions where strategy_universe_id = $1 and symbol = $2",
    )
    .bind(universe_id)
    .bind(&ticker)
    .fetch_one(&pool)
    .await?;
    assert!(gap_mode, "a LONG position must be flagged on a DOWN gap");

    let (order_count,): (i64,) = sqlx::query_as("select count(*) from live_orders where symbol = $1")
        .bind(&ticker)
        .fetch_one(&pool)
        .await?;
    assert_eq!(order_count, 0, "the aggregator itself must never emit orders");

    Ok(())
}
