use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tpd_schemas::{SignalType, Timeframe};

#[derive(Debug, Clone)]
pub struct NewLiveSignal {
    pub strategy_universe_id: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bar_timestamp: DateTime<Utc>,
    pub signal_timestamp: DateTime<Utc>,
    pub signal_type: SignalType,
    pub signal_json: Value,
    pub gap_flag: bool,
}

pub async fn insert(pool: &PgPool, signal: &NewLiveSignal) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into live_signals (
            strategy_universe_id, symbol, timeframe, bar_timestamp,
            signal_timestamp, signal_type, signal_json, gap_flag, processed
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, false)
        returning id
        "#,
    )
    .bind(signal.strategy_universe_id)
    .bind(&signal.symbol)
    .bind(signal.timeframe.as_str())
    .bind(signal.bar_timestamp)
    .bind(signal.signal_timestamp)
    .bind(signal.signal_type.as_str())
    .bind(&signal.signal_json)
    .bind(signal.gap_flag)
    .fetch_one(pool)
    .await
    .context("insert signal failed")?;
    Ok(id)
}

#[derive(Debug, Clone)]
pub struct LiveSignalRow {
    pub id: i64,
    pub strategy_universe_id: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bar_timestamp: DateTime<Utc>,
    pub signal_timestamp: DateTime<Utc>,
    pub signal_type: SignalType,
    pub signal_json: Value,
    pub gap_flag: bool,
}

/// Reads up to `limit` unprocessed signals, FIFO by `signal_timestamp`
/// (`spec.md` §4.3, "Loop").
pub async fn fetch_unprocessed_batch(pool: &PgPool, limit: i64) -> Result<Vec<LiveSignalRow>> {
    let rows = sqlx::query_as::<
        _,
        (
            i64,
            i64,
            String,
            String,
            DateTime<Utc>,
            DateTime<Utc>,
            String,
            Value,
            bool,
        ),
    >(
        r#"
        select id, strategy_universe_id, symbol, timeframe, bar_timestamp,
               signal_timestamp, signal_type, signal_json, gap_flag
        from live_signals
        where not processed
        order by signal_timestamp asc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch_unprocessed_batch failed")?;

    rows.into_iter()
        .map(
            |(
                id,
                strategy_universe_id,
                symbol,
                timeframe,
                bar_timestamp,
                signal_timestamp,
                signal_type,
                signal_json,
                gap_flag,
            )| {
                Ok(LiveSignalRow {
                    id,
                    strategy_universe_id,
                    symbol,
                    timeframe: Timeframe::parse(&timeframe)
                        .context("invalid live_signals.timeframe")?,
                    bar_timestamp,
                    signal_timestamp,
                    signal_type: SignalType::parse(&signal_type)
                        .context("invalid live_signals.signal_type")?,
                    signal_json,
                    gap_flag,
                })
            },
        )
        .collect()
}

/// At-most-once transition to `processed=true` (`spec.md` §3, live signal
/// invariants). Must be called within the same transaction as the order
/// insert/rejection it caused.
pub async fn mark_processed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    signal_id: i64,
) -> Result<()> {
    sqlx::query("update live_signals set processed = true, processed_at = now() where id = $1")
        .bind(signal_id)
        .execute(&mut **tx)
        .await
        .context("mark_processed failed")?;
    Ok(())
}
