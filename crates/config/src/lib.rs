//! Proxy Configuration Management
//!
//! Loads the proxy options from `config/proxyoptions.txt`. Every option has a
//! default, so a missing or partial file still yields a usable configuration.
//!
//! # File Format
//!
//! ```text
//! # listener
//! bind = 0.0.0.0:25565
//! maxplayers = 500
//!
//! # backends, tried in order
//! servers = lobby=127.0.0.1:25566, survival=10.0.0.2:25565
//! connecttimeout = 5
//! gracetimeout = 5
//! ```

use mcproxy_core::{ProxyError, Result};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Location of the options file relative to the working directory
pub const DEFAULT_OPTIONS_PATH: &str = "config/proxyoptions.txt";

/// A backend server entry from the `servers` option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub name: String,
    /// `host:port`
    pub address: String,
}

/// Complete proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Listener address (from "bind" option, default: 0.0.0.0:25565)
    pub bind_address: SocketAddr,
    /// Maximum concurrent players (from "maxplayers" option)
    pub max_players: usize,
    /// Backend servers in order of preference (from "servers" option)
    pub servers: Vec<ServerEntry>,
    /// Handshake and per-server connect timeout (from "connecttimeout", seconds)
    pub connect_timeout: Duration,
    /// Link shutdown grace period (from "gracetimeout", seconds)
    pub grace_timeout: Duration,
    /// Bytes reserved per socket read (from "readbuffersize" option)
    pub read_buffer_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 25565)),
            max_players: 1000,
            servers: vec![ServerEntry {
                name: "lobby".into(),
                address: "127.0.0.1:25566".into(),
            }],
            connect_timeout: Duration::from_secs(5),
            grace_timeout: Duration::from_secs(5),
            read_buffer_size: 8192,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from an options file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from [`DEFAULT_OPTIONS_PATH`]
    pub fn load_default() -> Result<Self> {
        Self::load_from_file(DEFAULT_OPTIONS_PATH)
    }

    /// Parse options file content
    ///
    /// Unknown keys and unparsable values are logged and ignored; an empty
    /// server list is an error since the proxy has nowhere to forward to.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                config.parse_option(key.trim(), value.trim());
            } else {
                warn!("Ignoring option line without '=': {}", line);
            }
        }

        if config.servers.is_empty() {
            return Err(ProxyError::Config("servers must name at least one backend".into()));
        }

        Ok(config)
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key {
            "bind" => match value.parse() {
                Ok(address) => self.bind_address = address,
                Err(_) => warn!("Invalid bind address '{}', keeping {}", value, self.bind_address),
            },
            "maxplayers" => {
                self.max_players = parse_or(key, value, self.max_players);
            }
            "servers" => {
                self.servers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(parse_server)
                    .collect();
            }
            "connecttimeout" => {
                let seconds = parse_or(key, value, self.connect_timeout.as_secs());
                self.connect_timeout = Duration::from_secs(seconds);
            }
            "gracetimeout" => {
                let seconds = parse_or(key, value, self.grace_timeout.as_secs());
                self.grace_timeout = Duration::from_secs(seconds);
            }
            "readbuffersize" => {
                self.read_buffer_size = parse_or(key, value, self.read_buffer_size);
            }
            _ => {
                tracing::debug!("Unknown config option: {} = {}", key, value);
            }
        }
    }

    /// Display configuration summary
    pub fn display(&self) {
        tracing::info!("Proxy configuration:");
        tracing::info!("  Bind: {}", self.bind_address);
        tracing::info!("  Max Players: {}", self.max_players);
        tracing::info!("  Connect Timeout: {}s", self.connect_timeout.as_secs());
        tracing::info!("  Grace Timeout: {}s", self.grace_timeout.as_secs());
        tracing::info!("  Read Buffer: {} bytes", self.read_buffer_size);
        tracing::info!("  Servers:");
        for server in &self.servers {
            tracing::info!("    {} -> {}", server.name, server.address);
        }
    }
}

fn parse_or<T: std::str::FromStr + std::fmt::Display + Copy>(key: &str, value: &str, current: T) -> T {
    value.parse().unwrap_or_else(|_| {
        warn!("Invalid value '{}' for {}, keeping {}", value, key, current);
        current
    })
}

/// `name=host:port`, or a bare `host:port` named after its address
fn parse_server(entry: &str) -> ServerEntry {
    match entry.split_once('=') {
        Some((name, address)) => ServerEntry {
            name: name.trim().into(),
            address: address.trim().into(),
        },
        None => ServerEntry {
            name: entry.into(),
            address: entry.into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.bind_address.port(), 25565);
        assert_eq!(config.max_players, 1000);
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.grace_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_simple_config() {
        let config_text = r#"
# proxy
bind = 127.0.0.1:25577
maxplayers = 50
servers = lobby=10.0.0.1:25565, 10.0.0.2:25565
connecttimeout = 3
gracetimeout = 10
"#;
        let config = ProxyConfig::parse(config_text).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:25577".parse().unwrap());
        assert_eq!(config.max_players, 50);
        assert_eq!(
            config.servers,
            vec![
                ServerEntry {
                    name: "lobby".into(),
                    address: "10.0.0.1:25565".into()
                },
                ServerEntry {
                    name: "10.0.0.2:25565".into(),
                    address: "10.0.0.2:25565".into()
                },
            ]
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.grace_timeout, Duration::from_secs(10));
        assert_eq!(config.read_buffer_size, 8192);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ProxyConfig::parse("bind = nowhere\nmaxplayers = lots\nreadbuffersize = -1\n").unwrap();
        assert_eq!(config.bind_address.port(), 25565);
        assert_eq!(config.max_players, 1000);
        assert_eq!(config.read_buffer_size, 8192);
    }

    #[test]
    fn test_empty_server_list_rejected() {
        let result = ProxyConfig::parse("servers = ,\n");
        assert!(matches!(result, Err(ProxyError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "maxplayers = 20").unwrap();
        writeln!(file, "servers = hub=play.example.net:25565").unwrap();

        let config = ProxyConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.max_players, 20);
        assert_eq!(config.servers[0].name, "hub");
        assert_eq!(config.servers[0].address, "play.example.net:25565");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProxyConfig::load_from_file(dir.path().join("proxyoptions.txt"));
        assert!(matches!(result, Err(ProxyError::Io(_))));
    }
}
