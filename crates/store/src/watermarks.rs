use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tpd_schemas::Timeframe;

/// `datafeed_state.last_1m_timestamp`, the aggregator's watermark into `candles_1m`.
pub async fn get_datafeed_watermark(pool: &PgPool) -> Result<Option<DateTime<Utc>>> {
    let (ts,): (Option<DateTime<Utc>>,) =
        sqlx::query_as("select last_1m_timestamp from datafeed_state where id = 1")
            .fetch_one(pool)
            .await
            .context("get_datafeed_watermark failed")?;
    Ok(ts)
}

/// Advances `datafeed_state.last_1m_timestamp`. Callers must only advance
/// forward; the aggregator computes the max processed `ts` before calling
/// this (`spec.md` §4.1, "Watermark advance").
pub async fn advance_datafeed_watermark(pool: &PgPool, ts: DateTime<Utc>) -> Result<()> {
    sqlx::query("update datafeed_state set last_1m_timestamp = $1 where id = 1")
        .bind(ts)
        .execute(pool)
        .await
        .context("advance_datafeed_watermark failed")?;
    Ok(())
}

/// `bar_state(service_name, timeframe) -> last_bar_timestamp`, the strategy
/// runner's per-timeframe watermark into `candles_<tf>`.
pub async fn get_bar_watermark(
    pool: &PgPool,
    service_name: &str,
    tf: Timeframe,
) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
        "select last_bar_timestamp from bar_state where service_name = $1 and timeframe = $2",
    )
    .bind(service_name)
    .bind(tf.as_str())
    .fetch_optional(pool)
    .await
    .context("get_bar_watermark failed")?;

    Ok(row.and_then(|(ts,)| ts))
}

pub async fn advance_bar_watermark(
    pool: &PgPool,
    service_name: &str,
    tf: Timeframe,
    ts: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into bar_state (service_name, timeframe, last_bar_timestamp)
        values ($1, $2, $3)
        on conflict (service_name, timeframe)
        do update set last_bar_timestamp = excluded.last_bar_timestamp
        "#,
    )
    .bind(service_name)
    .bind(tf.as_str())
    .bind(ts)
    .execute(pool)
    .await
    .context("advance_bar_watermark failed")?;
    Ok(())
}
