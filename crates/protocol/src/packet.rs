//! Packets and messages
//!
//! A [`Packet`] is a native, typed packet whose payload layout is supplied by
//! registration code. The engine never inspects payloads itself; it only
//! stores a [`PacketKind`] per registered type, which carries the type's
//! identity and a plain function pointer to its decoder.
//!
//! Anything the active registry does not know travels as a
//! [`BinaryPacket`], so unrecognized traffic is forwarded untouched.

use crate::buffer::MinecraftBuffer;
use bytes::Bytes;
use mcproxy_core::{ProtocolVersion, Result};
use std::any::{Any, TypeId};
use std::fmt;

/// Upcast helper for downcasting packets
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A native packet
pub trait Packet: AsAny + fmt::Debug + Send + Sync {
    /// Write the payload (without the packet id)
    fn encode(&self, buffer: &mut MinecraftBuffer<'_>, version: ProtocolVersion) -> Result<()>;

    /// Short type name used in logs and errors
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// A native packet that can be read back from its payload
pub trait DecodePacket: Packet + Sized {
    fn decode(buffer: &mut MinecraftBuffer<'_>, version: ProtocolVersion) -> Result<Self>;
}

impl dyn Packet {
    /// Runtime type of the concrete packet
    #[inline]
    pub fn packet_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    #[inline]
    pub fn is<T: Packet>(&self) -> bool {
        self.as_any().is::<T>()
    }

    #[inline]
    pub fn downcast_ref<T: Packet>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Decoder entry point stored in the registry
pub type DecodeFn = fn(&mut MinecraftBuffer<'_>, ProtocolVersion) -> Result<Box<dyn Packet>>;

fn decode_boxed<T: DecodePacket>(
    buffer: &mut MinecraftBuffer<'_>,
    version: ProtocolVersion,
) -> Result<Box<dyn Packet>> {
    Ok(Box::new(T::decode(buffer, version)?))
}

/// Identity and decoder of one registered packet type
#[derive(Clone, Copy)]
pub struct PacketKind {
    type_id: TypeId,
    name: &'static str,
    decode: DecodeFn,
}

impl PacketKind {
    pub fn of<T: DecodePacket>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: short_type_name(std::any::type_name::<T>()),
            decode: decode_boxed::<T>,
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn decoder(&self) -> DecodeFn {
        self.decode
    }

    pub fn decode(&self, buffer: &mut MinecraftBuffer<'_>, version: ProtocolVersion) -> Result<Box<dyn Packet>> {
        (self.decode)(buffer, version)
    }
}

impl PartialEq for PacketKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for PacketKind {}

impl fmt::Debug for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Packet forwarded without interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryPacket {
    pub id: i32,
    pub payload: Bytes,
}

impl BinaryPacket {
    pub fn new(id: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// Unit of traffic flowing through a channel
#[derive(Debug)]
pub enum Message {
    Packet(Box<dyn Packet>),
    Binary(BinaryPacket),
}

impl Message {
    pub fn packet(packet: impl Packet) -> Self {
        Message::Packet(Box::new(packet))
    }

    /// Borrow the native packet if it is a `T`
    pub fn downcast_ref<T: Packet>(&self) -> Option<&T> {
        match self {
            Message::Packet(packet) => packet.as_ref().downcast_ref::<T>(),
            Message::Binary(_) => None,
        }
    }

    pub fn is<T: Packet>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    /// Runtime type of the native packet, `None` for binary messages
    pub fn packet_type_id(&self) -> Option<TypeId> {
        match self {
            Message::Packet(packet) => Some(packet.as_ref().packet_type_id()),
            Message::Binary(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::Packet(packet) => packet.name(),
            Message::Binary(_) => "BinaryPacket",
        }
    }
}

impl From<BinaryPacket> for Message {
    fn from(packet: BinaryPacket) -> Self {
        Message::Binary(packet)
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    // generic parameters are not expected on packet types
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct KeepAlive(i64);

    impl Packet for KeepAlive {
        fn encode(&self, buffer: &mut MinecraftBuffer<'_>, _: ProtocolVersion) -> Result<()> {
            buffer.write_i64(self.0)?;
            Ok(())
        }
    }

    impl DecodePacket for KeepAlive {
        fn decode(buffer: &mut MinecraftBuffer<'_>, _: ProtocolVersion) -> Result<Self> {
            Ok(KeepAlive(buffer.read_i64()?))
        }
    }

    #[test]
    fn test_kind_decodes_through_function_pointer() {
        let kind = PacketKind::of::<KeepAlive>();
        assert_eq!(kind.name(), "KeepAlive");
        assert_eq!(kind.type_id(), TypeId::of::<KeepAlive>());

        let bytes = 42i64.to_be_bytes();
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        let packet = kind.decode(&mut buffer, ProtocolVersion::LATEST).unwrap();
        assert_eq!(packet.downcast_ref::<KeepAlive>(), Some(&KeepAlive(42)));
        assert_eq!(packet.as_ref().packet_type_id(), TypeId::of::<KeepAlive>());
    }

    #[test]
    fn test_message_downcast() {
        let message = Message::packet(KeepAlive(7));
        assert!(message.is::<KeepAlive>());
        assert_eq!(message.name(), "KeepAlive");
        assert_eq!(message.packet_type_id(), Some(TypeId::of::<KeepAlive>()));

        let message = Message::from(BinaryPacket::new(0x21, vec![1, 2, 3]));
        assert!(!message.is::<KeepAlive>());
        assert_eq!(message.packet_type_id(), None);
    }
}
