//! Packet id registry
//!
//! A [`PacketIdRegistry`] is the id↔type table of one direction, resolved for
//! one protocol version. It is rebuilt wholesale on each phase transition and
//! is owned by a single channel half, so it carries no locking.

use crate::buffer::MinecraftBuffer;
use crate::mapping::PacketMappings;
use crate::packet::{DecodeFn, Message, Packet, PacketKind};
use bytes::Bytes;
use mcproxy_core::{ProtocolVersion, ProxyError, Result};
use std::any::TypeId;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PacketIdRegistry {
    by_id: HashMap<i32, PacketKind>,
    by_type: HashMap<TypeId, i32>,
}

impl PacketIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty() && self.by_type.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Registered packet kinds, in no particular order
    pub fn packet_kinds(&self) -> impl Iterator<Item = &PacketKind> {
        self.by_id.values()
    }

    /// Add every entry of `mappings` active at `version`
    ///
    /// # Errors
    /// `RegistryConflict` when an id or a type is already registered. The
    /// registry may be partially filled in that case.
    pub fn add_packets(&mut self, mappings: &PacketMappings, version: ProtocolVersion) -> Result<&mut Self> {
        for entry in mappings.active(version) {
            if let Some(existing) = self.by_id.get(&entry.id) {
                return Err(ProxyError::RegistryConflict(format!(
                    "{} cannot be registered with packet id 0x{:02X}, because there is already {}",
                    entry.kind.name(),
                    entry.id,
                    existing.name()
                )));
            }

            if let Some(existing_id) = self.by_type.get(&entry.kind.type_id()) {
                return Err(ProxyError::RegistryConflict(format!(
                    "{} cannot be registered with packet id 0x{:02X}, because it already has 0x{:02X}",
                    entry.kind.name(),
                    entry.id,
                    existing_id
                )));
            }

            self.by_id.insert(entry.id, entry.kind);
            self.by_type.insert(entry.kind.type_id(), entry.id);
        }

        Ok(self)
    }

    /// Clear, then add `mappings` for `version`
    pub fn replace_packets(&mut self, mappings: &PacketMappings, version: ProtocolVersion) -> Result<&mut Self> {
        self.clear();
        self.add_packets(mappings, version)
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_type.clear();
    }

    pub fn try_get_kind(&self, id: i32) -> Option<&PacketKind> {
        self.by_id.get(&id)
    }

    /// Decoder registered for `id`, `None` for unknown ids
    pub fn try_create_decoder(&self, id: i32) -> Option<DecodeFn> {
        self.by_id.get(&id).map(PacketKind::decoder)
    }

    /// Id of the packet's runtime type
    pub fn try_get_packet_id(&self, packet: &dyn Packet) -> Option<i32> {
        self.by_type.get(&packet.packet_type_id()).copied()
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }

    pub fn contains_type<T: Packet>(&self) -> bool {
        self.contains(TypeId::of::<T>())
    }

    pub fn contains_packet(&self, packet: &dyn Packet) -> bool {
        self.contains(packet.packet_type_id())
    }

    /// Decode one frame body into a message.
    ///
    /// Returns `Ok(None)` when the id is not registered here. The decoder
    /// must consume the whole payload.
    ///
    /// # Errors
    /// - `PacketDecode` wrapping the decoder's failure
    /// - `NotFullyConsumed` when bytes remain after decoding
    pub fn decode(&self, id: i32, payload: &Bytes, version: ProtocolVersion) -> Result<Option<Message>> {
        let Some(kind) = self.by_id.get(&id) else {
            return Ok(None);
        };

        let mut buffer = MinecraftBuffer::read_only(payload);
        let packet = kind.decode(&mut buffer, version).map_err(|source| ProxyError::PacketDecode {
            id,
            source: Box::new(source),
        })?;

        if buffer.has_data() {
            return Err(ProxyError::NotFullyConsumed {
                packet: kind.name().to_string(),
                position: buffer.position(),
                length: buffer.length(),
            });
        }

        Ok(Some(Message::Packet(packet)))
    }
}
