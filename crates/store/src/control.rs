use anyhow::{Context, Result};
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq)]
pub struct TradingControl {
    pub allow_trading: bool,
    pub allow_new_positions: bool,
    pub comment: Option<String>,
}

/// Any daemon may read `trading_control`; only the health monitor and
/// operators mutate it (`spec.md` §3).
pub async fn read(pool: &PgPool) -> Result<TradingControl> {
    let (allow_trading, allow_new_positions, comment) =
        sqlx::query_as::<_, (bool, bool, Option<String>)>(
            "select allow_trading, allow_new_positions, comment from trading_control where id = 1",
        )
        .fetch_one(pool)
        .await
        .context("read trading_control failed")?;

    Ok(TradingControl {
        allow_trading,
        allow_new_positions,
        comment,
    })
}

pub async fn set_allow_trading(pool: &PgPool, allow: bool, comment: &str) -> Result<()> {
    sqlx::query(
        "update trading_control set allow_trading = $1, comment = $2, updated_at = now() where id = 1",
    )
    .bind(allow)
    .bind(comment)
    .execute(pool)
    .await
    .context("set_allow_trading failed")?;
    Ok(())
}

/// Sets both flags in one statement (`spec.md` §4.5: a down broker/execution
/// engine forces `allow_trading=false` *and* `allow_new_positions=false`
/// together, not as two independent writes).
pub async fn set_stop_trading(pool: &PgPool, comment: &str) -> Result<()> {
    sqlx::query(
        "update trading_control set allow_trading = false, allow_new_positions = false, comment = $1, updated_at = now() where id = 1",
    )
    .bind(comment)
    .execute(pool)
    .await
    .context("set_stop_trading failed")?;
    Ok(())
}

pub async fn set_allow_new_positions(pool: &PgPool, allow: bool, comment: &str) -> Result<()> {
    sqlx::query(
        "update trading_control set allow_new_positions = $1, comment = $2, updated_at = now() where id = 1",
    )
    .bind(allow)
    .bind(comment)
    .execute(pool)
    .await
    .context("set_allow_new_positions failed")?;
    Ok(())
}
