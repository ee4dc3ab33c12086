//! Shared daemon harness: tracing init, env bootstrap, store pool +
//! migration, heartbeat, and the tick/retry/sleep loop every daemon binary
//! runs. Generalizes `mqk-daemon::main`'s `init_tracing` +
//! `dotenvy::from_filename` startup sequence from a one-off HTTP server into
//! a reusable harness for the five poll-loop daemons.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Connects and migrates. Startup failures (missing env, schema mismatch)
/// are fatal (`spec.md` §6, "Process control": "non-zero on unrecoverable
/// startup failure").
pub async fn bootstrap() -> Result<PgPool> {
    init_tracing();
    let url = tpd_config::bootstrap_env().context("failed to resolve database URL")?;
    let pool = tpd_store::connect(&url)
        .await
        .context("failed to connect to Postgres")?;
    tpd_store::migrate(&pool)
        .await
        .context("failed to run migrations")?;
    Ok(pool)
}

/// Sleep applied after a loop-level exception (DB connectivity, resource
/// exhaustion) before retrying (`spec.md` §7, "Loop-level exceptions").
pub const LOOP_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Runs `tick` forever, sleeping `interval` between successful ticks and
/// [`LOOP_ERROR_BACKOFF`] after a tick returns an error. Heartbeats
/// `service_name` once per tick, win or lose, matching `spec.md` §4's
/// "Heartbeat each tick" refrain across all five daemons.
pub async fn run_loop<F, Fut>(pool: &PgPool, service_name: &str, interval: Duration, mut tick: F)
where
    F: FnMut(PgPool) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        if let Err(e) = tpd_store::heartbeat::beat(pool, service_name).await {
            warn!(error = %e, service = service_name, "heartbeat write failed");
        }

        match tick(pool.clone()).await {
            Ok(()) => {
                tokio::time::sleep(interval).await;
            }
            Err(e) => {
                error!(error = %e, service = service_name, "tick failed, backing off");
                tokio::time::sleep(LOOP_ERROR_BACKOFF).await;
            }
        }
    }
}

/// Logs a clean-shutdown message. Callers that handle SIGINT should call
/// this before returning `Ok(())` so the daemon exits 0 (`spec.md` §6,
/// "Exit code 0 on clean shutdown").
pub fn log_clean_shutdown(service_name: &str) {
    info!(service = service_name, "shutting down cleanly");
}
