use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tpd_schemas::{Direction, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivePosition {
    pub id: i64,
    pub strategy_universe_id: i64,
    pub direction: Direction,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
    pub gap_mode: bool,
}

/// Reads the position for `(strategy_universe_id, symbol, timeframe)` under
/// `FOR UPDATE`, creating a `FLAT` row first if none exists. Must be called
/// inside the transaction that will mutate it (`spec.md` §5, row-level
/// locking).
pub async fn lock_or_create(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    strategy_universe_id: i64,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<LivePosition> {
    let existing = sqlx::query_as::<_, (i64, i64, String, Decimal, Decimal, Decimal, bool)>(
        r#"
        select id, strategy_universe_id, direction, quantity, avg_price, realized_pnl, gap_mode
        from live_positions
        where strategy_universe_id = $1 and symbol = $2 and timeframe = $3
        for update
        "#,
    )
    .bind(strategy_universe_id)
    .bind(symbol)
    .bind(timeframe.as_str())
    .fetch_optional(&mut **tx)
    .await
    .context("lock_or_create select failed")?;

    if let Some((id, strategy_universe_id, direction, quantity, avg_price, realized_pnl, gap_mode)) =
        existing
    {
        return Ok(LivePosition {
            id,
            strategy_universe_id,
            direction: Direction::parse(&direction).context("invalid live_positions.direction")?,
            quantity,
            avg_price,
            realized_pnl,
            gap_mode,
        });
    }

    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into live_positions (
            strategy_universe_id, symbol, timeframe, direction, quantity, avg_price, realized_pnl, gap_mode
        ) values ($1, $2, $3, 'FLAT', 0, 0, 0, false)
        returning id
        "#,
    )
    .bind(strategy_universe_id)
    .bind(symbol)
    .bind(timeframe.as_str())
    .fetch_one(&mut **tx)
    .await
    .context("lock_or_create insert failed")?;

    Ok(LivePosition {
        id,
        strategy_universe_id,
        direction: Direction::Flat,
        quantity: Decimal::ZERO,
        avg_price: Decimal::ZERO,
        realized_pnl: Decimal::ZERO,
        gap_mode: false,
    })
}

/// Persists the mutated position (`spec.md` §4.4, position transition table).
pub async fn save(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    position: &LivePosition,
) -> Result<()> {
    sqlx::query(
        r#"
        update live_positions
        set direction = $2, quantity = $3, avg_price = $4, realized_pnl = $5,
            gap_mode = $6, updated_at = now()
        where id = $1
        "#,
    )
    .bind(position.id)
    .bind(position.direction.as_str())
    .bind(position.quantity)
    .bind(position.avg_price)
    .bind(position.realized_pnl)
    .bind(position.gap_mode)
    .execute(&mut **tx)
    .await
    .context("save position failed")?;
    Ok(())
}

/// Sets `gap_mode = true` on an open position reacting to an adverse gap
/// (`spec.md` §4.1, "reacts to adverse gaps"). A no-op on `FLAT` positions.
pub async fn set_gap_mode(
    pool: &sqlx::PgPool,
    strategy_universe_id: i64,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<()> {
    sqlx::query(
        r#"
        update live_positions
        set gap_mode = true, updated_at = now()
        where strategy_universe_id = $1 and symbol = $2 and timeframe = $3
          and direction != 'FLAT'
        "#,
    )
    .bind(strategy_universe_id)
    .bind(symbol)
    .bind(timeframe.as_str())
    .execute(pool)
    .await
    .context("set_gap_mode failed")?;
    Ok(())
}

/// `set_gap_mode`, run inside the aggregator's batch transaction instead of
/// its own connection, so a gap reaction never outlives the bucket write
/// that discovered it (`spec.md` §4.1, "Failure semantics").
pub async fn set_gap_mode_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    symbol: &str,
    timeframe: Timeframe,
    gap_dir_matches: Direction,
) -> Result<()> {
    sqlx::query(
        r#"
        update live_positions
        set gap_mode = true, updated_at = now()
        where symbol = $1 and timeframe = $2 and direction = $3
        "#,
    )
    .bind(symbol)
    .bind(timeframe.as_str())
    .bind(gap_dir_matches.as_str())
    .execute(&mut **tx)
    .await
    .context("set_gap_mode_tx failed")?;
    Ok(())
}

/// All non-`FLAT` positions for a symbol/timeframe, used by the aggregator
/// to find positions to flag on a gap.
pub async fn open_positions_for_symbol_tf(
    pool: &sqlx::PgPool,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Vec<i64>> {
    let rows = sqlx::query_as::<_, (i64,)>(
        r#"
        select strategy_universe_id from live_positions
        where symbol = $1 and timeframe = $2 and direction != 'FLAT'
        "#,
    )
    .bind(symbol)
    .bind(timeframe.as_str())
    .fetch_all(pool)
    .await
    .context("open_positions_for_symbol_tf failed")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Count over all `live_positions` rows, for admission checks (`spec.md`
/// §4.3: the cap counts every row, not just non-`FLAT` ones — closed
/// positions are never deleted, so `original_source`'s unfiltered
/// `SELECT COUNT(*) FROM live_positions` is the behavior to match).
pub async fn count_total_open(pool: &sqlx::PgPool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as("select count(*) from live_positions")
        .fetch_one(pool)
        .await
        .context("count_total_open failed")?;
    Ok(n)
}

/// Position count for one `strategy_universe` row (`spec.md` §4.3,
/// admission check 4; `original_source::count_open_positions_for_strategy`
/// counts by `strategy_universe_id`, not the strategy's catalog id, and
/// is likewise an unfiltered count over all rows).
pub async fn count_open_for_universe(
    pool: &sqlx::PgPool,
    strategy_universe_id: i64,
) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        "select count(*) from live_positions where strategy_universe_id = $1",
    )
    .bind(strategy_universe_id)
    .fetch_one(pool)
    .await
    .context("count_open_for_universe failed")?;
    Ok(n)
}

pub async fn fetch_by_universe(
    pool: &sqlx::PgPool,
    strategy_universe_id: i64,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Option<LivePosition>> {
    let row = sqlx::query_as::<_, (i64, i64, String, Decimal, Decimal, Decimal, bool)>(
        r#"
        select id, strategy_universe_id, direction, quantity, avg_price, realized_pnl, gap_mode
        from live_positions
        where strategy_universe_id = $1 and symbol = $2 and timeframe = $3
        "#,
    )
    .bind(strategy_universe_id)
    .bind(symbol)
    .bind(timeframe.as_str())
    .fetch_optional(pool)
    .await
    .context("fetch_by_universe failed")?;

    row.map(
        |(id, strategy_universe_id, direction, quantity, avg_price, realized_pnl, gap_mode)| {
            Ok(LivePosition {
                id,
                strategy_universe_id,
                direction: Direction::parse(&direction)
                    .context("invalid live_positions.direction")?,
                quantity,
                avg_price,
                realized_pnl,
                gap_mode,
            })
        },
    )
    .transpose()
}
