//! Registry holder of one channel half
//!
//! The holder pairs the system registry (packets the proxy itself must
//! understand) with registries owned by plugins. Lookups consult the system
//! registry first, then plugin registries in insertion order; the first
//! match owns the packet.

use crate::buffer::MinecraftBuffer;
use crate::mapping::PacketMappings;
use crate::packet::{BinaryPacket, Message, Packet};
use crate::registry::PacketIdRegistry;
use bytes::{Bytes, BytesMut};
use mcproxy_core::{Phase, ProtocolVersion, ProxyError, Result};
use std::io::SeekFrom;
use tracing::trace;

/// Registry owning a packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryOwner<'a> {
    System,
    Plugin(&'a str),
}

#[derive(Debug, Default)]
pub struct RegistryHolder {
    version: Option<ProtocolVersion>,
    phase: Option<Phase>,
    system: PacketIdRegistry,
    plugins: Vec<(String, PacketIdRegistry)>,
}

impl RegistryHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved protocol version, `None` until the handshake is read
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = Some(version);
    }

    /// Phase whose id space is loaded
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn system(&self) -> &PacketIdRegistry {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut PacketIdRegistry {
        &mut self.system
    }

    /// Load the system id space of `phase`.
    ///
    /// Plugin registries belong to the previous id space and are cleared.
    ///
    /// # Errors
    /// - `LinkState` when no protocol version is resolved yet
    /// - `RegistryConflict` from the underlying registry
    pub fn switch_phase(&mut self, phase: Phase, mappings: &PacketMappings) -> Result<()> {
        let version = self
            .version
            .ok_or_else(|| ProxyError::LinkState(format!("cannot enter {} before the protocol version is known", phase)))?;

        self.system.replace_packets(mappings, version)?;
        for (_, registry) in &mut self.plugins {
            registry.clear();
        }
        self.phase = Some(phase);

        trace!("Registry switched to {} ({} system packets)", phase, self.system.len());
        Ok(())
    }

    pub fn plugin(&self, plugin: &str) -> Option<&PacketIdRegistry> {
        self.plugins
            .iter()
            .find(|(owner, _)| owner == plugin)
            .map(|(_, registry)| registry)
    }

    /// Registry of `plugin`, created empty on first use
    pub fn plugin_mut(&mut self, plugin: &str) -> &mut PacketIdRegistry {
        let index = match self.plugins.iter().position(|(owner, _)| owner == plugin) {
            Some(index) => index,
            None => {
                self.plugins.push((plugin.to_string(), PacketIdRegistry::new()));
                self.plugins.len() - 1
            }
        };
        &mut self.plugins[index].1
    }

    pub fn remove_plugin(&mut self, plugin: &str) -> Option<PacketIdRegistry> {
        let index = self.plugins.iter().position(|(owner, _)| owner == plugin)?;
        Some(self.plugins.remove(index).1)
    }

    pub fn clear_plugins(&mut self) {
        self.plugins.clear();
    }

    /// Registry that owns the packet's type
    pub fn owner_of(&self, packet: &dyn Packet) -> Option<RegistryOwner<'_>> {
        if self.system.contains_packet(packet) {
            return Some(RegistryOwner::System);
        }

        self.plugins
            .iter()
            .find(|(_, registry)| registry.contains_packet(packet))
            .map(|(owner, _)| RegistryOwner::Plugin(owner.as_str()))
    }

    fn try_get_packet_id(&self, packet: &dyn Packet) -> Option<i32> {
        self.system.try_get_packet_id(packet).or_else(|| {
            self.plugins
                .iter()
                .find_map(|(_, registry)| registry.try_get_packet_id(packet))
        })
    }

    /// Back to the state of a freshly accepted connection
    pub fn reset(&mut self) {
        self.version = None;
        self.phase = None;
        self.system.clear();
        self.plugins.clear();
    }

    /// Decode a frame body (`id` already read) into a message.
    ///
    /// Unregistered ids, and every id before the version is resolved, come
    /// back as [`BinaryPacket`]s.
    pub fn decode(&self, id: i32, payload: Bytes) -> Result<Message> {
        let Some(version) = self.version else {
            return Ok(BinaryPacket::new(id, payload).into());
        };

        if let Some(message) = self.system.decode(id, &payload, version)? {
            return Ok(message);
        }

        for (_, registry) in &self.plugins {
            if let Some(message) = registry.decode(id, &payload, version)? {
                return Ok(message);
            }
        }

        Ok(BinaryPacket::new(id, payload).into())
    }

    /// Append the id and payload of `message` to `out`
    ///
    /// # Errors
    /// `UnregisteredPacket` for a native packet without an id in this holder.
    pub fn encode(&self, message: &Message, out: &mut BytesMut) -> Result<()> {
        let mut buffer = MinecraftBuffer::growable(out);
        buffer.seek(SeekFrom::End(0))?;

        match message {
            Message::Binary(binary) => {
                buffer.write_var_int(binary.id)?;
                buffer.write(&binary.payload)?;
            }
            Message::Packet(packet) => {
                let packet = packet.as_ref();
                let (version, id) = match (self.version, self.try_get_packet_id(packet)) {
                    (Some(version), Some(id)) => (version, id),
                    _ => return Err(ProxyError::UnregisteredPacket(packet.name().to_string())),
                };

                buffer.write_var_int(id)?;
                packet.encode(&mut buffer, version)?;
            }
        }

        Ok(())
    }
}
