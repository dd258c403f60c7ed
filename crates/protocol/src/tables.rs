//! Protocol tables
//!
//! Everything version-specific the proxy needs at runtime is data held by
//! [`ProtocolTables`]: one validated [`PacketMappings`] per phase and
//! direction, and the list of [`PhaseTransition`]s telling which packet moves
//! which channel halves into which phase.

use crate::mapping::{PacketIdMapping, PacketMappings};
use crate::packet::Packet;
use crate::packets::*;
use mcproxy_core::{Direction, Phase, ProtocolVersion, Result, VersionRange};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// A packet that moves a connection into another phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    /// Packet type that triggers the transition
    pub trigger: TypeId,
    pub trigger_name: &'static str,
    /// Direction the trigger travels in
    pub direction: Direction,
    /// Versions the transition applies to
    pub versions: VersionRange,
    pub next: Phase,
    /// Whether the halves of the opposite direction switch too
    pub peer: bool,
}

impl PhaseTransition {
    pub fn on<T: Packet>(direction: Direction, versions: VersionRange, next: Phase) -> Self {
        Self {
            trigger: TypeId::of::<T>(),
            trigger_name: std::any::type_name::<T>()
                .rsplit("::")
                .next()
                .unwrap_or("packet"),
            direction,
            versions,
            next,
            peer: false,
        }
    }

    /// Also switch the halves of the opposite direction
    pub fn with_peer(mut self) -> Self {
        self.peer = true;
        self
    }

    pub fn matches(&self, trigger: TypeId, direction: Direction, version: ProtocolVersion) -> bool {
        self.trigger == trigger && self.direction == direction && self.versions.contains(version)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolTables {
    mappings: HashMap<(Phase, Direction), Arc<PacketMappings>>,
    transitions: Vec<PhaseTransition>,
    empty: Arc<PacketMappings>,
}

impl ProtocolTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the table of one phase and direction, replacing any previous one
    pub fn with_mappings(mut self, phase: Phase, direction: Direction, mappings: PacketMappings) -> Self {
        self.mappings.insert((phase, direction), Arc::new(mappings));
        self
    }

    pub fn with_transition(mut self, transition: PhaseTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Table of one phase and direction; empty when none was registered
    pub fn mappings(&self, phase: Phase, direction: Direction) -> Arc<PacketMappings> {
        self.mappings
            .get(&(phase, direction))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.empty))
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// First transition triggered by a packet type travelling in `direction`
    pub fn transition_for(
        &self,
        trigger: TypeId,
        direction: Direction,
        version: ProtocolVersion,
    ) -> Option<&PhaseTransition> {
        self.transitions
            .iter()
            .find(|transition| transition.matches(trigger, direction, version))
    }

    /// Tables of the system packets for every known version
    pub fn system() -> Result<Self> {
        use Direction::{Clientbound, Serverbound};
        use ProtocolVersion as V;

        let configuration_era = ProtocolVersion::range(V::MINECRAFT_1_20_2, V::LATEST);
        let before_configuration = ProtocolVersion::range(V::OLDEST, V::MINECRAFT_1_20);

        Ok(Self::new()
            .with_mappings(
                Phase::Handshake,
                Serverbound,
                PacketMappings::builder()
                    .register::<Handshake>([PacketIdMapping::new(0x00, V::OLDEST)])
                    .build()?,
            )
            .with_mappings(
                Phase::Login,
                Clientbound,
                PacketMappings::builder()
                    .register::<LoginSuccess>([PacketIdMapping::new(0x02, V::OLDEST)])
                    .register::<SetCompression>([PacketIdMapping::new(0x03, V::MINECRAFT_1_8)])
                    .build()?,
            )
            .with_mappings(
                Phase::Login,
                Serverbound,
                PacketMappings::builder()
                    .register::<LoginAcknowledged>([PacketIdMapping::new(0x03, V::MINECRAFT_1_20_2)])
                    .build()?,
            )
            .with_mappings(
                Phase::Configuration,
                Clientbound,
                PacketMappings::builder()
                    .register::<FinishConfiguration>([
                        PacketIdMapping::new(0x02, V::MINECRAFT_1_20_2),
                        PacketIdMapping::new(0x03, V::MINECRAFT_1_20_5),
                    ])
                    .build()?,
            )
            .with_mappings(
                Phase::Configuration,
                Serverbound,
                PacketMappings::builder()
                    .register::<AcknowledgeFinishConfiguration>([
                        PacketIdMapping::new(0x02, V::MINECRAFT_1_20_2),
                        PacketIdMapping::new(0x03, V::MINECRAFT_1_20_5),
                    ])
                    .build()?,
            )
            .with_mappings(
                Phase::Play,
                Clientbound,
                PacketMappings::builder()
                    .register::<StartConfiguration>([
                        PacketIdMapping::new(0x65, V::MINECRAFT_1_20_2),
                        PacketIdMapping::new(0x67, V::MINECRAFT_1_20_3),
                        PacketIdMapping::new(0x69, V::MINECRAFT_1_20_5),
                        PacketIdMapping::new(0x70, V::MINECRAFT_1_21_2),
                    ])
                    .build()?,
            )
            .with_mappings(
                Phase::Play,
                Serverbound,
                PacketMappings::builder()
                    .register::<AcknowledgeConfiguration>([
                        PacketIdMapping::new(0x0B, V::MINECRAFT_1_20_2),
                        PacketIdMapping::new(0x0C, V::MINECRAFT_1_20_5),
                        PacketIdMapping::new(0x0E, V::MINECRAFT_1_21_2),
                    ])
                    .build()?,
            )
            .with_transition(PhaseTransition::on::<LoginSuccess>(Clientbound, before_configuration, Phase::Play).with_peer())
            .with_transition(PhaseTransition::on::<LoginSuccess>(Clientbound, configuration_era, Phase::Configuration))
            .with_transition(PhaseTransition::on::<LoginAcknowledged>(Serverbound, configuration_era, Phase::Configuration))
            .with_transition(PhaseTransition::on::<FinishConfiguration>(Clientbound, configuration_era, Phase::Play))
            .with_transition(PhaseTransition::on::<AcknowledgeFinishConfiguration>(
                Serverbound,
                configuration_era,
                Phase::Play,
            ))
            .with_transition(PhaseTransition::on::<StartConfiguration>(Clientbound, configuration_era, Phase::Configuration))
            .with_transition(PhaseTransition::on::<AcknowledgeConfiguration>(
                Serverbound,
                configuration_era,
                Phase::Configuration,
            )))
    }
}
