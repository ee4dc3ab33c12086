//! Minute-to-higher-timeframe bar aggregation and gap detection
//! (`spec.md` §4.1). Grounded on
//! `original_source/demons/datafeed_aggregator copy.py`.

mod bucket;

pub use bucket::{bucket_bounds, detect_gap, ingest_minute, OpenBucket};

use std::collections::HashMap;

/// `service_status` identity for this daemon; coincides with the `data_feed`
/// `live_errors.source` taxonomy value.
pub const SERVICE_NAME: &str = "data_feed";

/// Unlike the signal/order poll loops, the aggregator has no `B=100`
/// backpressure cap (`spec.md` §5, "Backpressure") — it must process
/// whatever minutes accumulated since the last watermark so an outage
/// longer than one batch can still catch up in a single tick.
const UNBOUNDED_FETCH: i64 = i64::MAX;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tpd_config::PipelineConfig;
use tpd_schemas::{Bar, Direction, ErrorSeverity, ErrorSource, Timeframe};
use tpd_store::errors::NewLiveError;

/// In-memory aggregation state, rebuilt fresh on every process start.
/// `open_buckets` is never persisted — a restart mid-bucket loses that
/// bucket's progress, matching `original_source`'s `current_bars` dict
/// (only the last closed close is rebuilt from the database on startup).
pub struct AggregatorState {
    open_buckets: HashMap<(Timeframe, i64), Option<OpenBucket>>,
    prev_close: HashMap<(Timeframe, i64), Decimal>,
}

impl AggregatorState {
    /// Rebuilds `prev_close` from the last closed bar per `(tf, symbol_id)`
    /// (`spec.md` §4.1 state note; `original_source::load_last_state`).
    pub async fn bootstrap(pool: &PgPool) -> Result<Self> {
        let mut prev_close = HashMap::new();
        for tf in Timeframe::aggregated() {
            for (symbol_id, close) in tpd_store::candles::last_closes(pool, tf).await? {
                prev_close.insert((tf, symbol_id), close);
            }
        }
        Ok(Self {
            open_buckets: HashMap::new(),
            prev_close,
        })
    }
}

/// One poll iteration: drains every new minute candle since the last
/// watermark (no batch cap — see `UNBOUNDED_FETCH`), updates every
/// aggregated timeframe's open bucket, persists closed buckets with gap
/// annotation, reacts to adverse gaps, and advances the watermark — all
/// inside one transaction (`spec.md` §4.1, "Failure semantics": a
/// processing error must not leave a partial bucket write).
pub async fn tick(pool: &PgPool, state: &mut AggregatorState, cfg: &PipelineConfig) -> Result<()> {
    let watermark = tpd_store::watermarks::get_datafeed_watermark(pool).await?;
    let minutes = tpd_store::candles::fetch_1m_after(pool, watermark, UNBOUNDED_FETCH).await?;
    if minutes.is_empty() {
        return Ok(());
    }

    match run_batch(pool, state, cfg, &minutes).await {
        Ok(max_ts) => {
            tpd_store::watermarks::advance_datafeed_watermark(pool, max_ts).await?;
            Ok(())
        }
        Err(e) => {
            tpd_store::errors::insert(
                pool,
                &NewLiveError {
                    source: ErrorSource::DataFeed,
                    severity: ErrorSeverity::Error,
                    message: format!("aggregator batch failed: {e:#}"),
                    details_json: None,
                },
            )
            .await;
            Err(e)
        }
    }
}

async fn run_batch(
    pool: &PgPool,
    state: &mut AggregatorState,
    cfg: &PipelineConfig,
    minutes: &[Bar],
) -> Result<chrono::DateTime<chrono::Utc>> {
    let mut tx = pool.begin().await.context("begin aggregator batch tx")?;
    let mut max_ts = minutes[0].ts;

    for minute in minutes {
        max_ts = max_ts.max(minute.ts);
        for tf in Timeframe::aggregated() {
            let key = (tf, minute.symbol_id);
            let open = state.open_buckets.entry(key).or_insert(None);
            if let Some(closed) = ingest_minute(open, minute, tf.width_minutes()) {
                close_bucket(&mut tx, state, tf, closed.into_bar(), cfg.gap_threshold).await?;
            }
        }
    }

    tx.commit().await.context("commit aggregator batch tx")?;
    Ok(max_ts)
}

async fn close_bucket(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    state: &mut AggregatorState,
    tf: Timeframe,
    bar: Bar,
    gap_threshold: Decimal,
) -> Result<()> {
    let key = (tf, bar.symbol_id);
    let prev = state.prev_close.get(&key).copied();
    let gap_dir = detect_gap(prev, bar.close, gap_threshold);

    tpd_store::candles::insert_closed_bucket_tx(tx, tf, &bar, gap_dir.is_some(), gap_dir)
        .await
        .context("insert closed bucket failed")?;

    state.prev_close.insert(key, bar.close);

    if let Some(dir) = gap_dir {
        let symbol = tpd_store::symbols::get_by_id_tx(tx, bar.symbol_id)
            .await
            .context("resolve symbol ticker for gap reaction")?;
        if let Some(symbol) = symbol {
            // LONG positions are hurt by a DOWN gap, SHORT by an UP gap
            // (`spec.md` §4.1, "Gap-against-position reaction").
            let direction_hurt = match dir {
                tpd_schemas::GapDir::Down => Direction::Long,
                tpd_schemas::GapDir::Up => Direction::Short,
            };
            tpd_store::positions::set_gap_mode_tx(tx, &symbol.ticker, tf, direction_hurt).await?;
        }
    }

    Ok(())
}
