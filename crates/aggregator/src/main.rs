use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tpd_config::PipelineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let pool = tpd_runtime::bootstrap().await?;
    let cfg = Arc::new(PipelineConfig::from_env());
    let state = Arc::new(Mutex::new(tpd_aggregator::AggregatorState::bootstrap(&pool).await?));

    tpd_runtime::run_loop(&pool, tpd_aggregator::SERVICE_NAME, cfg.aggregator_tick, move |pool| {
        let cfg = cfg.clone();
        let state = state.clone();
        async move {
            let mut state = state.lock().await;
            tpd_aggregator::tick(&pool, &mut state, &cfg).await
        }
    })
    .await;

    Ok(())
}
