use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agentlink_core::config::AppConfig;
use agentlink_core::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenvy::dotenv().is_err() {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::load()?;
    let session = Session::from_config(&config)?;
    info!(
        servers = session.tool_servers.len(),
        poll_interval_ms = config.poll_interval_ms,
        timeout_secs = config.tool_execution_timeout_secs,
        "Agentlink node starting"
    );

    for (server_id, result) in session.discovery.discover_all().await {
        match result {
            Ok(tools) => {
                for tool in tools {
                    info!(
                        server_id = %server_id,
                        tool_id = %tool.id,
                        version = %tool.version,
                        "{}",
                        tool.description
                    );
                }
            }
            Err(e) => warn!(server_id = %server_id, "Discovery failed: {}", e),
        }
    }

    session.close();
    Ok(())
}
