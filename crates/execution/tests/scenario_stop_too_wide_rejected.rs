//! Scenario S3 — stop distance beyond `max_drawdown_fraction` is rejected
//! without creating an order (`spec.md` §8, "Stop distance exactly at
//! `max_drawdown_fraction`"). Skips if `DATABASE_URL` is unset.

use serde_json::json;
use tpd_schemas::{SignalType, Timeframe};
use tpd_store::signals::NewLiveSignal;

#[tokio::test]
async fn stop_too_wide_rejected_no_order_created() -> anyhow::Result<()> {
    let Some(pool) = tpd_store::testkit_db_pool().await? else {
        eprintln!("skipping: DATABASE_URL not set");
        return Ok(());
    };

    let (symbol_id,): (i64,) = sqlx::query_as(
        "insert into symbols (ticker, lot_size) values ($1, 1) returning id",
    )
    .bind(format!("S3_{}", uuid_like()))
    .fetch_one(&pool)
    .await?;
    let ticker: (String,) = sqlx::query_as("select ticker from symbols where id = $1")
        .bind(symbol_id)
        .fetch_one(&pool)
        .await?;
    let ticker = ticker.0;

    let (strategy_id,): (i64,) = sqlx::query_as(
        "insert into strategy_catalog (code, live_py_module, live_py_class) values ($1, 'm', 'noop') returning id",
    )
    .bind(format!("STRAT_S3_{}", ticker))
    .fetch_one(&pool)
    .await?;

    let (universe_id,): (i64,) = sqlx::query_as(
        r#"
        insert into strategy_universe (
            strategy_id, symbol, timeframe, mode, risk_per_trade,
            max_drawdown_fraction, max_positions_per_strategy, max_total_positions
        ) values ($1, $2, '1m', 'paper', 0.02, 0.20, 10, 10)
        returning id
        "#,
    )
    .bind(strategy_id)
    .bind(&ticker)
    .fetch_one(&pool)
    .await?;

    let payload = json!({
        "type": "OPEN",
        "direction": "LONG",
        "entry_type": "MARKET",
        "entry_price": "100",
        "stop_loss": "70",
        "size_mode": "RISK_FRACTION",
        "size_value": "1",
    });

    let signal_id = tpd_store::signals::insert(
        &pool,
        &NewLiveSignal {
            strategy_universe_id: universe_id,
            symbol: ticker.clone(),
            timeframe: Timeframe::M1,
            bar_timestamp: chrono::Utc::now(),
            signal_timestamp: chrono::Utc::now(),
            signal_type: SignalType::Open,
            signal_json: payload,
            gap_flag: false,
        },
    )
    .await?;

    let cfg = tpd_config::PipelineConfig::sane_defaults();
    tpd_execution::tick(&pool, &cfg).await?;

    let (processed,): (bool,) =
        sqlx::query_as("select processed from live_signals where id = $1")
            .bind(signal_id)
            .fetch_one(&pool)
            .await?;
    assert!(processed, "rejected signal must still be marked processed");

    let (order_count,): (i64,) =
        sqlx::query_as("select count(*) from live_orders where live_signal_id = $1")
            .bind(signal_id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(order_count, 0, "a rejected signal must not produce an order");

    let (error_count,): (i64,) = sqlx::query_as(
        "select count(*) from live_errors where message = 'too_wide_stop' and details_json->>'live_signal_id' = $1",
    )
    .bind(signal_id.to_string())
    .fetch_one(&pool)
    .await?;
    assert_eq!(error_count, 1, "expected one too_wide_stop rejection logged");

    Ok(())
}

fn uuid_like() -> String {
    format!("{:x}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}
