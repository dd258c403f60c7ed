//! System packets
//!
//! The few native packets the proxy must understand to follow a connection
//! through its phases. Payloads that do not matter to the proxy are kept as
//! raw bytes and written back unchanged.
//!
//! | Packet                           | Phase         | Direction   |
//! |----------------------------------|---------------|-------------|
//! | [`Handshake`]                    | handshake     | serverbound |
//! | [`SetCompression`]               | login         | clientbound |
//! | [`LoginSuccess`]                 | login         | clientbound |
//! | [`LoginAcknowledged`]            | login         | serverbound |
//! | [`FinishConfiguration`]          | configuration | clientbound |
//! | [`AcknowledgeFinishConfiguration`] | configuration | serverbound |
//! | [`StartConfiguration`]           | play          | clientbound |
//! | [`AcknowledgeConfiguration`]     | play          | serverbound |

use crate::buffer::MinecraftBuffer;
use crate::packet::{DecodePacket, Packet};
use bytes::Bytes;
use mcproxy_core::{Phase, ProtocolVersion, ProxyError, Result};

/// Maximum length of the handshake server address
pub const MAX_SERVER_ADDRESS_LENGTH: usize = 255;

/// First packet of every connection
///
/// # Packet Format
/// ```text
/// {VarInt protocolVersion}{String serverAddress}{u16 serverPort}{VarInt nextState}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: i32,
}

impl Handshake {
    /// Phase the connection moves to after this packet
    ///
    /// # Errors
    /// `Malformed` for an unknown next state.
    pub fn next_phase(&self) -> Result<Phase> {
        Phase::from_next_state(self.next_state)
            .ok_or_else(|| ProxyError::Malformed(format!("unknown next state {}", self.next_state)))
    }

    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::new(self.protocol_version)
    }
}

impl Packet for Handshake {
    fn encode(&self, buffer: &mut MinecraftBuffer<'_>, _: ProtocolVersion) -> Result<()> {
        buffer.write_var_int(self.protocol_version)?;
        buffer.write_string(&self.server_address)?;
        buffer.write_u16(self.server_port)?;
        buffer.write_var_int(self.next_state)?;
        Ok(())
    }
}

impl DecodePacket for Handshake {
    fn decode(buffer: &mut MinecraftBuffer<'_>, _: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            protocol_version: buffer.read_var_int()?,
            server_address: buffer.read_string_bounded(MAX_SERVER_ADDRESS_LENGTH)?,
            server_port: buffer.read_u16()?,
            next_state: buffer.read_var_int()?,
        })
    }
}

/// Enables compression for every following frame in both directions
///
/// # Packet Format
/// ```text
/// {VarInt threshold}
/// ```
/// A negative threshold disables compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCompression {
    pub threshold: i32,
}

impl Packet for SetCompression {
    fn encode(&self, buffer: &mut MinecraftBuffer<'_>, _: ProtocolVersion) -> Result<()> {
        buffer.write_var_int(self.threshold)?;
        Ok(())
    }
}

impl DecodePacket for SetCompression {
    fn decode(buffer: &mut MinecraftBuffer<'_>, _: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            threshold: buffer.read_var_int()?,
        })
    }
}

/// Ends the login phase; the profile payload is kept opaque
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub payload: Bytes,
}

impl Packet for LoginSuccess {
    fn encode(&self, buffer: &mut MinecraftBuffer<'_>, _: ProtocolVersion) -> Result<()> {
        buffer.write(&self.payload)?;
        Ok(())
    }
}

impl DecodePacket for LoginSuccess {
    fn decode(buffer: &mut MinecraftBuffer<'_>, _: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            payload: Bytes::copy_from_slice(&buffer.read_to_end()?),
        })
    }
}

macro_rules! empty_packet {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl Packet for $name {
            fn encode(&self, _: &mut MinecraftBuffer<'_>, _: ProtocolVersion) -> Result<()> {
                Ok(())
            }
        }

        impl DecodePacket for $name {
            fn decode(_: &mut MinecraftBuffer<'_>, _: ProtocolVersion) -> Result<Self> {
                Ok($name)
            }
        }
    };
}

empty_packet!(
    /// Player confirms the login success (1.20.2+)
    LoginAcknowledged
);

empty_packet!(
    /// Server ends the configuration phase (1.20.2+)
    FinishConfiguration
);

empty_packet!(
    /// Player confirms the end of the configuration phase (1.20.2+)
    AcknowledgeFinishConfiguration
);

empty_packet!(
    /// Server sends a playing player back to configuration (1.20.2+)
    StartConfiguration
);

empty_packet!(
    /// Player confirms the return to configuration (1.20.2+)
    AcknowledgeConfiguration
);
