use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: i64,
    pub ticker: String,
    pub lot_size: Decimal,
    pub enabled: bool,
}

/// Resolves `symbol_id -> ticker` (`candles_<tf>` and `live_positions` key
/// a symbol differently: by id and by ticker string, respectively).
pub async fn get_by_id(pool: &PgPool, id: i64) -> Result<Option<Symbol>> {
    let row = sqlx::query_as::<_, (i64, String, Decimal, bool)>(
        "select id, ticker, lot_size, enabled from symbols where id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("get_by_id failed")?;

    Ok(row.map(|(id, ticker, lot_size, enabled)| Symbol {
        id,
        ticker,
        lot_size,
        enabled,
    }))
}

/// `get_by_id`, run inside an existing transaction (the aggregator resolves
/// a gapped symbol's ticker inside its batch transaction).
pub async fn get_by_id_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: i64,
) -> Result<Option<Symbol>> {
    let row = sqlx::query_as::<_, (i64, String, Decimal, bool)>(
        "select id, ticker, lot_size, enabled from symbols where id = $1",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .context("get_by_id_tx failed")?;

    Ok(row.map(|(id, ticker, lot_size, enabled)| Symbol {
        id,
        ticker,
        lot_size,
        enabled,
    }))
}

pub async fn get_by_ticker(pool: &PgPool, ticker: &str) -> Result<Option<Symbol>> {
    let row = sqlx::query_as::<_, (i64, String, Decimal, bool)>(
        "select id, ticker, lot_size, enabled from symbols where ticker = $1",
    )
    .bind(ticker)
    .fetch_optional(pool)
    .await
    .context("get_by_ticker failed")?;

    Ok(row.map(|(id, ticker, lot_size, enabled)| Symbol {
        id,
        ticker,
        lot_size,
        enabled,
    }))
}

pub async fn list_enabled(pool: &PgPool) -> Result<Vec<Symbol>> {
    let rows = sqlx::query_as::<_, (i64, String, Decimal, bool)>(
        "select id, ticker, lot_size, enabled from symbols where enabled order by id",
    )
    .fetch_all(pool)
    .await
    .context("list_enabled failed")?;

    Ok(rows
        .into_iter()
        .map(|(id, ticker, lot_size, enabled)| Symbol {
            id,
            ticker,
            lot_size,
            enabled,
        })
        .collect())
}

/// `lot_history` is a read-only lookup (no write path implemented here —
/// the helper that populates it is out of scope). Falls back to
/// `symbols.lot_size` if no dated row applies yet.
pub async fn lot_size_as_of(
    pool: &PgPool,
    symbol_id: i64,
    as_of: chrono::NaiveDate,
) -> Result<Decimal> {
    let row = sqlx::query_as::<_, (Decimal,)>(
        r#"
        select lot_size from lot_history
        where symbol_id = $1 and effective_date <= $2
        order by effective_date desc
        limit 1
        "#,
    )
    .bind(symbol_id)
    .bind(as_of)
    .fetch_optional(pool)
    .await
    .context("lot_size_as_of failed")?;

    if let Some((lot_size,)) = row {
        return Ok(lot_size);
    }

    let (fallback,): (Decimal,) = sqlx::query_as("select lot_size from symbols where id = $1")
        .bind(symbol_id)
        .fetch_one(pool)
        .await
        .context("lot_size_as_of fallback failed")?;

    Ok(fallback)
}
