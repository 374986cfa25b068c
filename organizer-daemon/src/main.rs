mod config;
mod dispatcher;
mod lifecycle;
mod scanner_task;
mod worker;

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use lifecycle::Lifecycle;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(fmt::layer())
        .init();

    tracing::info!(
        source = %config.source_dir.display(),
        target = %config.target_dir.display(),
        workers = config.worker_count_at_least_one(),
        "starting media organizer"
    );

    let lifecycle = Lifecycle::start(config).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    lifecycle.shutdown().await;
    Ok(())
}
