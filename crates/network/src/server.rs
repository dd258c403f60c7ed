//! # Proxy Server
//!
//! Accepts players and links each of them to a backend server.
//!
//! # Architecture
//!
//! 1. **TCP Listener** - Accepts incoming player connections
//! 2. **Connection Map** - Tracks every player, with its link once built
//!    (`DashMap` for concurrent access)
//! 3. **Protocol Tables** - Id spaces and phase transitions shared by all links
//! 4. **Event Bus** - Extra observers followed by the phase coordinator, so a
//!    vetoed trigger never switches phases
//!
//! # Per-Player Lifecycle
//!
//! ```text
//! accept → read handshake → connect to server → forward handshake
//!        → switch both channels to the requested phase → start link
//!        → wait for the link to stop
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use mcproxy_network::{NetworkConfig, ProxyServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ProxyServer::new(NetworkConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use crate::channel::Channel;
use crate::config::{BackendServer, NetworkConfig};
use crate::coordinator::PhaseCoordinator;
use crate::events::{EventBus, LinkObserver};
use crate::link::Link;
use dashmap::DashMap;
use mcproxy_core::{Phase, ProtocolVersion, ProxyError, Result, Side};
use mcproxy_protocol::packets::Handshake;
use mcproxy_protocol::ProtocolTables;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// A player connection tracked by the server
#[derive(Debug, Clone)]
pub struct PlayerConnection {
    pub address: SocketAddr,
    /// Set once the backend connection is made
    pub link: Option<Arc<Link>>,
}

/// Everything a connection task needs, shared by all of them
struct SessionContext {
    config: NetworkConfig,
    tables: Arc<ProtocolTables>,
    bus: EventBus,
    connections: Arc<DashMap<u64, PlayerConnection>>,
    shutdown: CancellationToken,
}

/// Main proxy instance
///
/// # Shutdown
///
/// The server runs until:
/// - `shutdown()` is called
/// - Ctrl-C is received
///
/// Every running link is then stopped before `run` returns.
pub struct ProxyServer {
    config: NetworkConfig,

    /// TCP listener for accepting players
    listener: TcpListener,

    tables: Arc<ProtocolTables>,

    /// Observers subscribed ahead of the phase coordinator
    observers: Vec<Arc<dyn LinkObserver>>,

    /// All player connections
    /// Key: connection id, Value: address and link
    connections: Arc<DashMap<u64, PlayerConnection>>,

    next_id: AtomicU64,

    shutdown: CancellationToken,
}

impl ProxyServer {
    /// Create a new server instance with the system protocol tables
    ///
    /// # Errors
    /// Returns an error if:
    /// - Configuration is invalid
    /// - TCP listener cannot be bound to the specified address
    pub async fn new(config: NetworkConfig) -> Result<Self> {
        Self::with_tables(config, ProtocolTables::system()?).await
    }

    /// Create a new server instance with custom protocol tables
    pub async fn with_tables(config: NetworkConfig, tables: ProtocolTables) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ProxyError::Config(format!("Invalid configuration: {}", e)))?;

        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ProxyError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", config.bind_address, e),
            ))
        })?;

        tracing::info!("Proxy listening on {}", listener.local_addr()?);
        tracing::info!(
            "Configuration: max_connections={}, servers={}",
            config.max_connections,
            config.servers.len()
        );

        Ok(Self {
            config,
            listener,
            tables: Arc::new(tables),
            observers: Vec::new(),
            connections: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// Subscribe an observer to every link created from now on
    pub fn add_observer(&mut self, observer: Arc<dyn LinkObserver>) {
        self.observers.push(observer);
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Get the number of tracked player connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the link of a connection, if it was built already
    pub fn get_link(&self, id: u64) -> Option<Arc<Link>> {
        self.connections.get(&id).and_then(|entry| entry.link.clone())
    }

    /// Stop accepting players and stop every link
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn session_context(&self) -> Arc<SessionContext> {
        let mut bus = EventBus::new();
        for observer in &self.observers {
            bus.subscribe(Arc::clone(observer));
        }
        bus.subscribe(Arc::new(PhaseCoordinator::new(Arc::clone(&self.tables))));

        Arc::new(SessionContext {
            config: self.config.clone(),
            tables: Arc::clone(&self.tables),
            bus,
            connections: Arc::clone(&self.connections),
            shutdown: self.shutdown.clone(),
        })
    }

    /// Run the accept loop
    ///
    /// # Lifecycle
    ///
    /// ```text
    /// 1. Accept incoming connection
    /// 2. Check connection limit
    /// 3. Track the connection
    /// 4. Spawn connection task
    /// 5. Repeat until shutdown, then stop all links
    /// ```
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Proxy starting main loop");
        let context = self.session_context();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((mut socket, addr)) => {
                            if self.connections.len() >= self.config.max_connections {
                                tracing::warn!("Connection from {} rejected: proxy full ({} connections)",
                                    addr, self.connections.len());
                                let _ = socket.shutdown().await;
                                continue;
                            }

                            if let Err(e) = socket.set_nodelay(true) {
                                tracing::debug!("Cannot disable Nagle for {}: {}", addr, e);
                            }

                            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                            self.connections.insert(id, PlayerConnection { address: addr, link: None });
                            tracing::debug!("New connection {} from {}", id, addr);

                            let context = Arc::clone(&context);
                            tokio::spawn(async move {
                                let result = serve(&context, id, socket, addr).await;
                                context.connections.remove(&id);

                                match result {
                                    Ok(()) => tracing::info!("Connection {} ({}) closed", id, addr),
                                    Err(e) => tracing::error!("Connection {} ({}) failed: {}", id, addr, e),
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Error accepting connection: {:?}", e);
                        }
                    }
                }

                _ = self.shutdown.cancelled() => {
                    tracing::info!("Shutdown requested");
                    break;
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received, initiating shutdown");
                    self.shutdown.cancel();
                    break;
                }
            }
        }

        tracing::info!("Proxy main loop ended");

        let links: Vec<Arc<Link>> = self
            .connections
            .iter()
            .filter_map(|entry| entry.link.clone())
            .collect();
        tracing::info!("Stopping {} links", links.len());

        for link in links {
            if let Err(e) = link.stop().await {
                tracing::error!("Failed to stop link {}: {}", link.name(), e);
            }
        }

        Ok(())
    }
}

/// Handle one player from handshake to link shutdown
async fn serve(context: &SessionContext, id: u64, socket: TcpStream, addr: SocketAddr) -> Result<()> {
    let prepared = tokio::select! {
        _ = context.shutdown.cancelled() => return Ok(()),
        prepared = prepare(context, socket, addr) => prepared?,
    };
    let (player, server, backend) = prepared;

    let link = Arc::new(
        Link::new(format!("{} -> {}", addr, backend.name), player, server, context.bus.clone())
            .with_grace_period(context.config.grace_period),
    );

    if let Some(mut entry) = context.connections.get_mut(&id) {
        entry.link = Some(Arc::clone(&link));
    }

    link.start().await?;
    // a shutdown that raced the start would have missed this link
    if context.shutdown.is_cancelled() {
        link.stop().await?;
    }
    link.join().await
}

/// Read the handshake, connect to a server and bring both channels into the
/// phase the player asked for
async fn prepare(
    context: &SessionContext,
    socket: TcpStream,
    addr: SocketAddr,
) -> Result<(Channel, Channel, BackendServer)> {
    let config = &context.config;
    let tables = &context.tables;

    let mut player = Channel::new(Side::Client, socket, config.read_buffer_size);
    // the handshake layout does not depend on the version
    player.set_version(ProtocolVersion::OLDEST);
    player.switch_phase(Phase::Handshake, |direction| tables.mappings(Phase::Handshake, direction))?;

    let message = tokio::time::timeout(config.connect_timeout, player.reader.read_message())
        .await
        .map_err(|_| ProxyError::Malformed(format!("no handshake from {} in time", addr)))??;

    let handshake = message
        .downcast_ref::<Handshake>()
        .ok_or_else(|| ProxyError::Malformed(format!("expected a handshake, got {}", message.name())))?;
    let version = handshake.version();
    let next = handshake.next_phase()?;
    tracing::info!("{} connecting with protocol {} for {}", addr, version, next);

    let (backend, stream) = connect(config).await?;
    let mut server = Channel::new(Side::Server, stream, config.read_buffer_size);

    for channel in [&mut player, &mut server] {
        channel.set_version(version);
        channel.switch_phase(Phase::Handshake, |direction| tables.mappings(Phase::Handshake, direction))?;
    }

    server.writer.write_message(&message).await?;

    for channel in [&mut player, &mut server] {
        channel.switch_phase(next, |direction| tables.mappings(next, direction))?;
    }

    Ok((player, server, backend))
}

/// Connect to the first reachable server
async fn connect(config: &NetworkConfig) -> Result<(BackendServer, TcpStream)> {
    for server in &config.servers {
        match tokio::time::timeout(config.connect_timeout, TcpStream::connect(&server.address)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Cannot disable Nagle for {}: {}", server.name, e);
                }
                tracing::debug!("Connected to {} ({})", server.name, server.address);
                return Ok((server.clone(), stream));
            }
            Ok(Err(e)) => tracing::warn!("Server {} ({}) is unreachable: {}", server.name, server.address, e),
            Err(_) => tracing::warn!("Server {} ({}) did not answer in time", server.name, server.address),
        }
    }

    Err(ProxyError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "no server is reachable",
    )))
}
