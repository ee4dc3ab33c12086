//! Postgres-backed repository functions shared by every daemon.
//!
//! The store is both the message bus and the source of truth: daemons never
//! talk to each other directly, only through rows here. Every public
//! function takes a `&PgPool` (or an open `Transaction`) and returns
//! `anyhow::Result`, matching `mqk_db`'s style — this crate has no
//! crate-local error enum because almost every failure here is "the query
//! failed" and the caller only needs the context string.

pub mod account;
pub mod candles;
pub mod control;
pub mod errors;
pub mod heartbeat;
pub mod orders;
pub mod positions;
pub mod signals;
pub mod strategy;
pub mod symbols;
pub mod trades;
pub mod watermarks;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const ENV_DB_URL: &str = "DATABASE_URL";

/// Connects to Postgres using the URL built by `tpd_config::database_url`.
pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Runs the embedded migrations. Idempotent: safe to call on every daemon
/// startup.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Test helper: connect via `DATABASE_URL` and ensure migrations are applied.
/// Integration tests call this once and skip (not fail) if the env var is unset.
pub async fn testkit_db_pool() -> Result<Option<PgPool>> {
    let url = match std::env::var(ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    let pool = connect(&url).await?;
    migrate(&pool).await?;
    Ok(Some(pool))
}
