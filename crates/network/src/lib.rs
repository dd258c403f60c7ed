//! # Proxy Networking Layer
//!
//! Tokio-based forwarding between players and backend servers.
//!
//! ## Modules
//!
//! - [`config`] - Network configuration options
//! - [`layer`] - Framing, compression and encryption of a byte stream
//! - [`channel`] - Socket halves with their registries and control mailboxes
//! - [`events`] - Link observers and the event bus
//! - [`link`] - Two-direction forwarding with coordinated shutdown
//! - [`coordinator`] - Phase and compression switches driven by packets
//! - [`server`] - Accept loop

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod layer;
pub mod link;
pub mod server;

// Re-export commonly used items
pub use channel::{Channel, ChannelControl, ChannelControls, ChannelReader, ChannelWriter, Half, Reconfigure, Transport};
pub use config::{BackendServer, NetworkConfig};
pub use coordinator::PhaseCoordinator;
pub use events::{EventBus, HookOutcome, LinkControls, LinkEvent, LinkObserver, MessageContext};
pub use layer::{InboundLayers, OutboundLayers};
pub use link::{Link, LinkState, DEFAULT_GRACE_PERIOD};
pub use server::{PlayerConnection, ProxyServer};
