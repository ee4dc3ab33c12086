use anyhow::{Context, Result};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountState {
    pub equity: Decimal,
    pub free_cash: Decimal,
    pub used_margin: Decimal,
}

/// Locks the singleton `account_state` row for the duration of the caller's
/// transaction (`spec.md` §5, row-level locking).
pub async fn lock(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<AccountState> {
    let (equity, free_cash, used_margin) = sqlx::query_as::<_, (Decimal, Decimal, Decimal)>(
        "select equity, free_cash, used_margin from account_state where id = 1 for update",
    )
    .fetch_one(&mut **tx)
    .await
    .context("lock account_state failed")?;

    Ok(AccountState {
        equity,
        free_cash,
        used_margin,
    })
}

pub async fn read(pool: &sqlx::PgPool) -> Result<AccountState> {
    let (equity, free_cash, used_margin) = sqlx::query_as::<_, (Decimal, Decimal, Decimal)>(
        "select equity, free_cash, used_margin from account_state where id = 1",
    )
    .fetch_one(pool)
    .await
    .context("read account_state failed")?;

    Ok(AccountState {
        equity,
        free_cash,
        used_margin,
    })
}

/// Saves the mutated account state (`spec.md` §4.4, "Cash accounting":
/// `equity = free_cash + used_margin` under the simple cash model).
pub async fn save(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    state: &AccountState,
) -> Result<()> {
    sqlx::query(
        "update account_state set equity = $1, free_cash = $2, used_margin = $3, updated_at = now() where id = 1",
    )
    .bind(state.equity)
    .bind(state.free_cash)
    .bind(state.used_margin)
    .execute(&mut **tx)
    .await
    .context("save account_state failed")?;
    Ok(())
}
