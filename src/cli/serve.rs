//! `reunite serve`: run the scan scheduler in the foreground.

use anyhow::Result;
use std::sync::Arc;

use reunite::config::ReuniteConfig;
use reunite::matching::scheduler::Scheduler;

/// Run the scheduler until Ctrl-C.
pub async fn serve(config: ReuniteConfig) -> Result<()> {
    let pipeline = Arc::new(super::build_pipeline(&config)?);
    let scheduler = Scheduler::new(pipeline, config.scheduler.clone());

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down scan scheduler");
        })
        .await;

    Ok(())
}
