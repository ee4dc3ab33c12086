use anyhow::Result;
use tpd_config::PipelineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let pool = tpd_runtime::bootstrap().await?;
    let cfg = PipelineConfig::from_env();

    tpd_runtime::run_loop(
        &pool,
        tpd_execution::SERVICE_NAME,
        cfg.execution_tick,
        move |pool| async move { tpd_execution::tick(&pool, &cfg).await },
    )
    .await;

    Ok(())
}
