use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tpd_schemas::{Bar, GapDir, Timeframe};

/// A closed aggregated bar, with gap annotation (`candles_<tf>` rows beyond `M1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatedBar {
    pub bar: Bar,
    pub is_gap: bool,
    pub gap_dir: Option<GapDir>,
}

/// Inserts one minute candle. Minute candles are produced by external
/// ingest in production; this is used by tests and any bootstrap seeding.
pub async fn insert_1m(pool: &PgPool, bar: &Bar) -> Result<()> {
    sqlx::query(
        r#"
        insert into candles_1m (symbol_id, ts, open, high, low, close, volume)
        values ($1, $2, $3, $4, $5, $6, $7)
        on conflict (symbol_id, ts) do nothing
        "#,
    )
    .bind(bar.symbol_id)
    .bind(bar.ts)
    .bind(bar.open)
    .bind(bar.high)
    .bind(bar.low)
    .bind(bar.close)
    .bind(bar.volume)
    .execute(pool)
    .await
    .context("insert_1m failed")?;
    Ok(())
}

/// Reads `candles_1m` rows with `ts > watermark`, ordered `(ts, symbol_id)`
/// (`spec.md` §4.1, "Ingest loop"). `watermark = None` reads from the start.
pub async fn fetch_1m_after(
    pool: &PgPool,
    watermark: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<Bar>> {
    let rows = sqlx::query_as::<_, (i64, DateTime<Utc>, Decimal, Decimal, Decimal, Decimal, Decimal)>(
        r#"
        select symbol_id, ts, open, high, low, close, volume
        from candles_1m
        where ts > coalesce($1, to_timestamp(0))
        order by ts, symbol_id
        limit $2
        "#,
    )
    .bind(watermark)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch_1m_after failed")?;

    Ok(rows
        .into_iter()
        .map(
            |(symbol_id, ts, open, high, low, close, volume)| Bar {
                symbol_id,
                ts,
                open,
                high,
                low,
                close,
                volume,
            },
        )
        .collect())
}

/// Inserts a closed bucket into `candles_<tf>`. Guarded by the
/// `(symbol_id, ts)` unique constraint so that re-emission on retry after a
/// crash (`spec.md` §4.1 "Failure semantics", S6) is a no-op rather than an
/// error.
pub async fn insert_closed_bucket(
    pool: &PgPool,
    tf: Timeframe,
    bar: &Bar,
    is_gap: bool,
    gap_dir: Option<GapDir>,
) -> Result<()> {
    let table = tf.candles_table();
    let sql = format!(
        r#"
        insert into {table} (symbol_id, ts, open, high, low, close, volume, is_gap, gap_dir)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        on conflict (symbol_id, ts) do nothing
        "#
    );
    sqlx::query(&sql)
        .bind(bar.symbol_id)
        .bind(bar.ts)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.volume)
        .bind(is_gap)
        .bind(gap_dir.map(|d| d.as_str()))
        .execute(pool)
        .await
        .context("insert_closed_bucket failed")?;
    Ok(())
}

/// `insert_closed_bucket`, run inside the aggregator's batch transaction
/// (`spec.md` §4.1, "Failure semantics": a processing error must not leave a
/// partial bucket write, so the bucket insert and the gap reaction it
/// triggers share one unit of work).
pub async fn insert_closed_bucket_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tf: Timeframe,
    bar: &Bar,
    is_gap: bool,
    gap_dir: Option<GapDir>,
) -> Result<()> {
    let table = tf.candles_table();
    let sql = format!(
        r#"
        insert into {table} (symbol_id, ts, open, high, low, close, volume, is_gap, gap_dir)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        on conflict (symbol_id, ts) do nothing
        "#
    );
    sqlx::query(&sql)
        .bind(bar.symbol_id)
        .bind(bar.ts)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.volume)
        .bind(is_gap)
        .bind(gap_dir.map(|d| d.as_str()))
        .execute(&mut **tx)
        .await
        .context("insert_closed_bucket_tx failed")?;
    Ok(())
}

/// Reads `candles_<tf>` rows with `ts > watermark`, ordered `(ts, symbol_id)`
/// (`spec.md` §4.2, "Dispatch loop").
pub async fn fetch_tf_after(
    pool: &PgPool,
    tf: Timeframe,
    watermark: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<AggregatedBar>> {
    let table = tf.candles_table();
    let sql = format!(
        r#"
        select symbol_id, ts, open, high, low, close, volume, is_gap, gap_dir
        from {table}
        where ts > coalesce($1, to_timestamp(0))
        order by ts, symbol_id
        limit $2
        "#
    );
    let rows = sqlx::query_as::<
        _,
        (
            i64,
            DateTime<Utc>,
            Decimal,
            Decimal,
            Decimal,
            Decimal,
            Decimal,
            bool,
            Option<String>,
        ),
    >(&sql)
    .bind(watermark)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch_tf_after failed")?;

    rows.into_iter()
        .map(
            |(symbol_id, ts, open, high, low, close, volume, is_gap, gap_dir)| {
                let gap_dir = gap_dir
                    .map(|s| GapDir::parse(&s))
                    .transpose()
                    .context("invalid gap_dir in candles row")?;
                Ok(AggregatedBar {
                    bar: Bar {
                        symbol_id,
                        ts,
                        open,
                        high,
                        low,
                        close,
                        volume,
                    },
                    is_gap,
                    gap_dir,
                })
            },
        )
        .collect()
}

/// Rebuilds `prevC[tf, symbol_id]` on aggregator startup: last closed bar's
/// close per symbol (`spec.md` §4.1, `load_last_state`-style rebuild).
pub async fn last_closes(pool: &PgPool, tf: Timeframe) -> Result<Vec<(i64, Decimal)>> {
    let table = tf.candles_table();
    let sql = format!(
        r#"
        select distinct on (symbol_id) symbol_id, close
        from {table}
        order by symbol_id, ts desc
        "#
    );
    let rows = sqlx::query_as::<_, (i64, Decimal)>(&sql)
        .fetch_all(pool)
        .await
        .context("last_closes failed")?;
    Ok(rows)
}

/// History window handed to `Strategy::on_bar`: up to `n` prior bars for
/// `(symbol_id, tf)`, oldest first, excluding the bar at `before_ts` itself
/// (`spec.md` §4.2, "Plug-in contract").
pub async fn history_window(
    pool: &PgPool,
    tf: Timeframe,
    symbol_id: i64,
    before_ts: DateTime<Utc>,
    n: i64,
) -> Result<Vec<Bar>> {
    let table = tf.candles_table();
    let sql = format!(
        r#"
        select symbol_id, ts, open, high, low, close, volume
        from (
            select symbol_id, ts, open, high, low, close, volume
            from {table}
            where symbol_id = $1 and ts < $2
            order by ts desc
            limit $3
        ) recent
        order by ts asc
        "#
    );
    let rows = sqlx::query_as::<_, (i64, DateTime<Utc>, Decimal, Decimal, Decimal, Decimal, Decimal)>(
        &sql,
    )
    .bind(symbol_id)
    .bind(before_ts)
    .bind(n)
    .fetch_all(pool)
    .await
    .context("history_window failed")?;

    Ok(rows
        .into_iter()
        .map(
            |(symbol_id, ts, open, high, low, close, volume)| Bar {
                symbol_id,
                ts,
                open,
                high,
                low,
                close,
                volume,
            },
        )
        .collect())
}

/// Latest minute timestamp across all symbols, used by the health monitor's
/// data-lag check (`spec.md` §4.5).
pub async fn latest_1m_ts(pool: &PgPool) -> Result<Option<DateTime<Utc>>> {
    let (ts,): (Option<DateTime<Utc>>,) =
        sqlx::query_as("select max(ts) from candles_1m")
            .fetch_one(pool)
            .await
            .context("latest_1m_ts failed")?;
    Ok(ts)
}

/// Most recent minute close for a symbol, used by the broker adapter to
/// price market/limit/stop orders (`spec.md` §4.4, "Pricing").
pub async fn last_1m_close(pool: &PgPool, symbol_id: i64) -> Result<Option<Decimal>> {
    let row: Option<(Decimal,)> = sqlx::query_as(
        "select close from candles_1m where symbol_id = $1 order by ts desc limit 1",
    )
    .bind(symbol_id)
    .fetch_optional(pool)
    .await
    .context("last_1m_close failed")?;
    Ok(row.map(|(c,)| c))
}
