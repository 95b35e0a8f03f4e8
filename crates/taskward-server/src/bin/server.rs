//! Taskward server binary.

use anyhow::Result;
use taskward_common_config::{load_dotenv, ConfigLoader};
use taskward_common_log::LogConfig;
use taskward_server::Server;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv()?;
    taskward_common_log::init(LogConfig::from_env())?;

    let config = ConfigLoader::default().load()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        sink = ?config.audit.sink,
        "Starting Taskward server"
    );

    let server = Server::new(config).await?;
    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}
