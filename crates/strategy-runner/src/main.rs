use anyhow::Result;
use tpd_config::PipelineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let pool = tpd_runtime::bootstrap().await?;
    let cfg = PipelineConfig::from_env();

    tpd_runtime::run_loop(
        &pool,
        tpd_strategy_runner::SERVICE_NAME,
        cfg.strategy_runner_tick,
        move |pool| async move { tpd_strategy_runner::tick(&pool, &cfg).await },
    )
    .await;

    Ok(())
}
