use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use refset_sync::lingo::LingoClient;
use refset_sync::snowstorm::SnowstormClient;
use refset_sync::{auth, RunOrchestrator, SyncConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("STARTING: ECL REFSET PROCESS");

    let config = SyncConfig::from_env()?;
    let cookie = auth::login(&config).await?;
    let terminology = SnowstormClient::new(&config, &cookie)?;
    let lingo = LingoClient::new(&config, &cookie)?;

    RunOrchestrator::new(&config, &terminology, &lingo)
        .run()
        .await?;

    info!("FINISHED: ECL REFSET PROCESS");
    Ok(())
}
