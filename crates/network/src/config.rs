//! # Network Configuration
//!
//! Runtime options of the proxy networking layer.
//!
//! # Example
//!
//! ```rust
//! use mcproxy_network::{BackendServer, NetworkConfig};
//! use std::time::Duration;
//!
//! let config = NetworkConfig {
//!     bind_address: "0.0.0.0:25577".parse().unwrap(),
//!     servers: vec![BackendServer::new("lobby", "127.0.0.1:25565")],
//!     grace_period: Duration::from_secs(3),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// A server players can be forwarded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendServer {
    /// Name used in logs
    pub name: String,

    /// `host:port`, resolved on every connection attempt
    pub address: String,
}

impl BackendServer {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Proxy networking options
///
/// # Purpose
/// Defines all configurable parameters of the accept loop and the links it
/// creates.
///
/// # Default Values
///
/// - Port 25565 (standard Minecraft port)
/// - 1000 max connections
/// - One server, `lobby` at `127.0.0.1:25566`
/// - 5-second grace period when a link shuts down
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Address and port to bind the TCP listener to
    ///
    /// # Default
    /// `0.0.0.0:25565` (all interfaces, standard Minecraft port)
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent player connections
    ///
    /// # Default
    /// 1000 connections
    ///
    /// # Notes
    /// - Connections still reading their handshake count too
    /// - Extra connections are closed right after accept
    pub max_connections: usize,

    /// Servers in order of preference
    ///
    /// # Notes
    /// Players are forwarded to the first server that accepts the
    /// connection.
    pub servers: Vec<BackendServer>,

    /// How long a stopping link waits for the other direction
    ///
    /// # Purpose
    /// Once one direction of a link stops, the other one is asked to finish
    /// its current message. After this period it is cancelled by force, and
    /// after the same period again the link is reported stuck.
    ///
    /// # Default
    /// 5 seconds
    pub grace_period: Duration,

    /// Time allowed for the player's handshake and for connecting to one
    /// server
    ///
    /// # Default
    /// 5 seconds
    pub connect_timeout: Duration,

    /// Bytes reserved on every socket read
    ///
    /// # Default
    /// 8192 bytes (8KB)
    ///
    /// # Recommended Values
    /// - 4096: Lower memory usage, slightly more syscalls
    /// - 8192: Good balance (default)
    /// - 65536: Chunk-heavy traffic, more memory
    pub read_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 25565)),
            max_connections: 1000,
            servers: vec![BackendServer::new("lobby", "127.0.0.1:25566")],
            grace_period: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            read_buffer_size: 8192,
        }
    }
}

impl NetworkConfig {
    /// Validate the configuration
    ///
    /// # Returns
    /// `Ok(())` if configuration is valid, `Err(String)` otherwise
    ///
    /// # Checks
    /// - `max_connections` must be > 0
    /// - at least one server, each with a `host:port` address
    /// - `grace_period` and `connect_timeout` must be > 0
    /// - `read_buffer_size` must be >= 1024
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.servers.is_empty() {
            return Err("at least one server must be configured".to_string());
        }

        for server in &self.servers {
            match server.address.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
                _ => {
                    return Err(format!(
                        "server {} has an invalid address '{}', expected host:port",
                        server.name, server.address
                    ))
                }
            }
        }

        if self.grace_period.is_zero() {
            return Err("grace_period must be > 0".to_string());
        }

        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0".to_string());
        }

        if self.read_buffer_size < 1024 {
            return Err("read_buffer_size must be >= 1024".to_string());
        }

        if !self.read_buffer_size.is_power_of_two() {
            tracing::warn!("read_buffer_size is not a power of 2, this may reduce performance");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.bind_address.port(), 25565);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_max_connections() {
        let mut config = NetworkConfig::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_servers_required() {
        let mut config = NetworkConfig::default();
        config.servers.clear();
        assert!(config.validate().is_err());

        config.servers.push(BackendServer::new("bad", "localhost"));
        assert!(config.validate().is_err());

        config.servers[0].address = "localhost:70000".into();
        assert!(config.validate().is_err());

        config.servers[0].address = "localhost:25566".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_durations_rejected() {
        let mut config = NetworkConfig::default();
        config.grace_period = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = NetworkConfig::default();
        config.connect_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_small_read_buffer_rejected() {
        let mut config = NetworkConfig::default();
        config.read_buffer_size = 512;
        assert!(config.validate().is_err());
    }
}
