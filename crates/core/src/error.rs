//! Core error types for the proxy

use crate::types::Direction;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("End of buffer: attempted to read {requested} bytes at position {position}, length {length}")]
    EndOfBuffer {
        position: usize,
        requested: usize,
        length: usize,
    },

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("Attempted to write into a read-only buffer")]
    ReadOnlyViolation,

    #[error("Registry conflict: {0}")]
    RegistryConflict(String),

    #[error("Invalid packet mapping: {0}")]
    InvalidMapping(String),

    #[error("Packet {0} has no id registered for writing")]
    UnregisteredPacket(String),

    #[error("{packet} packet was not fully read: {position} of {length} bytes consumed")]
    NotFullyConsumed {
        packet: String,
        position: usize,
        length: usize,
    },

    #[error("Failed to decode packet 0x{id:02X}: {source}")]
    PacketDecode {
        id: i32,
        #[source]
        source: Box<ProxyError>,
    },

    #[error("Frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLarge(usize),

    #[error("Stream closed")]
    StreamClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid link state: {0}")]
    LinkState(String),

    #[error("Hook error: {0}")]
    Hook(String),

    #[error("Link {link} cannot be stopped ({direction:?} direction did not settle after forced cancellation)")]
    LinkStuck { link: String, direction: Direction },
}

impl ProxyError {
    /// Whether the error only invalidates the message being processed.
    ///
    /// The framing around the message is intact, so the forwarding loop may
    /// carry on with the next frame.
    pub fn is_message_local(&self) -> bool {
        matches!(
            self,
            ProxyError::EndOfBuffer { .. }
                | ProxyError::Malformed(_)
                | ProxyError::NotFullyConsumed { .. }
                | ProxyError::PacketDecode { .. }
        )
    }

    /// Whether the error means the peer went away.
    pub fn is_closed(&self) -> bool {
        match self {
            ProxyError::StreamClosed => true,
            ProxyError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
