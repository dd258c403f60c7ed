//! mcproxy - Minecraft Java Edition proxy
//!
//! Main binary: loads `config/proxyoptions.txt` and runs the accept loop.

use anyhow::Context;
use mcproxy_config::{ProxyConfig, DEFAULT_OPTIONS_PATH};
use mcproxy_network::{BackendServer, NetworkConfig, ProxyServer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn network_config(config: &ProxyConfig) -> NetworkConfig {
    NetworkConfig {
        bind_address: config.bind_address,
        max_connections: config.max_players,
        servers: config
            .servers
            .iter()
            .map(|server| BackendServer::new(server.name.clone(), server.address.clone()))
            .collect(),
        grace_period: config.grace_timeout,
        connect_timeout: config.connect_timeout,
        read_buffer_size: config.read_buffer_size,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("mcproxy {} starting up", env!("CARGO_PKG_VERSION"));
    info!("Loading configuration from {}", DEFAULT_OPTIONS_PATH);

    let config = match ProxyConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load {}: {}", DEFAULT_OPTIONS_PATH, e);
            warn!("Using default configuration");
            ProxyConfig::default()
        }
    };
    config.display();

    let server = ProxyServer::new(network_config(&config))
        .await
        .context("failed to start proxy")?;

    if let Err(e) = server.run().await {
        error!("Proxy error: {}", e);
        return Err(e.into());
    }

    info!("Proxy shut down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_network_config_from_options() {
        let config = ProxyConfig::parse("maxplayers = 10\nservers = a=127.0.0.1:1, b=127.0.0.1:2\ngracetimeout = 2\n").unwrap();
        let network = network_config(&config);

        assert_eq!(network.max_connections, 10);
        assert_eq!(network.servers, vec![BackendServer::new("a", "127.0.0.1:1"), BackendServer::new("b", "127.0.0.1:2")]);
        assert_eq!(network.grace_period, Duration::from_secs(2));
        assert!(network.validate().is_ok());
    }
}
