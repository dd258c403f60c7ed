//! # mcproxy Protocol Library
//!
//! Wire-level building blocks of the Minecraft (Java edition) protocol, as
//! needed by a proxy that forwards traffic it mostly does not interpret.
//!
//! ## Architecture
//!
//! ### 1. Buffer codec ([`buffer`])
//! [`MinecraftBuffer`] reads and writes protocol primitives (VarInt, VarLong,
//! VarShort, strings, UUIDs, big-endian numbers) over borrowed bytes.
//!
//! ### 2. Packets ([`packet`])
//! The [`Packet`] / [`DecodePacket`] traits, [`PacketKind`] decoder entries and
//! the [`Message`] envelope, which falls back to [`BinaryPacket`] for ids the
//! proxy does not know.
//!
//! ### 3. Id tables and registries ([`mapping`], [`registry`], [`holder`])
//! Declarative `(id, from, to?)` tables validated once when built, resolved
//! into per-version [`PacketIdRegistry`]s, grouped per channel half in a
//! [`RegistryHolder`].
//!
//! ### 4. Stream transforms ([`compression`], [`encryption`], [`codecs`])
//! Threshold-gated zlib bodies, AES-128/CFB8 stream encryption and framing
//! helpers.
//!
//! ### 5. System packets ([`packets`], [`tables`])
//! The handful of packets that drive phase changes, and [`ProtocolTables`]
//! describing their ids and transitions for every known version.

pub mod buffer;
pub mod codecs;
pub mod compression;
pub mod encryption;
pub mod holder;
pub mod mapping;
pub mod packet;
pub mod packets;
pub mod registry;
pub mod tables;

// Re-export commonly used items
pub use buffer::{BufferError, MinecraftBuffer, Property, DEFAULT_MAX_STRING_LENGTH};
pub use codecs::*;
pub use compression::*;
pub use encryption::*;
pub use holder::*;
pub use mapping::*;
pub use packet::*;
pub use registry::*;
pub use tables::*;
