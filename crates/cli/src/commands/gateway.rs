//! `steward gateway`: Start the HTTP API server.

use super::load_config;

pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = load_config()?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    config.validate()?;

    println!("Steward Gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Workspace: {}", config.storage.workspace_dir.display());

    steward_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("gateway stopped: {e}"))
}
