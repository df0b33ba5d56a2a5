//! `mediguard serve`: start the HTTP gateway.

use std::path::PathBuf;

pub async fn run(
    port_override: Option<u16>,
    records: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(records)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("MediGuard Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Records:   {}", config.data.records_path.display());
    println!("   Reasoner:  {} / {}", config.reasoner.provider, config.reasoner.model);

    mediguard_gateway::start(config)
        .await
        .map_err(|e| e as Box<dyn std::error::Error>)?;

    Ok(())
}
