//! Declarative packet id tables
//!
//! Registration code describes each packet type with an ordered list of
//! [`PacketIdMapping`]s. An entry without an explicit last version stays valid
//! until the next entry of the same type starts, or until
//! [`ProtocolVersion::LATEST`] for the final entry.
//!
//! ```rust,ignore
//! let mappings = PacketMappings::builder()
//!     .register::<KeepAlive>([
//!         PacketIdMapping::new(0x00, ProtocolVersion::MINECRAFT_1_7_2),
//!         PacketIdMapping::new(0x1F, ProtocolVersion::MINECRAFT_1_9),
//!     ])
//!     .build()?;
//! ```
//!
//! [`PacketMappingsBuilder::build`] checks the table against every version
//! at once, so a conflict surfaces when the table is loaded even if no
//! connection ever negotiates the conflicting version.

use crate::packet::{DecodePacket, PacketKind};
use mcproxy_core::{ProtocolVersion, ProxyError, Result, VersionRange};

/// One `(id, from, to?)` entry of a packet type's table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketIdMapping {
    pub id: i32,
    pub from: ProtocolVersion,
    pub to: Option<ProtocolVersion>,
}

impl PacketIdMapping {
    /// Mapping open-ended until the next entry
    pub const fn new(id: i32, from: ProtocolVersion) -> Self {
        Self { id, from, to: None }
    }

    /// Mapping valid for `[from, to]`
    pub const fn until(id: i32, from: ProtocolVersion, to: ProtocolVersion) -> Self {
        Self {
            id,
            from,
            to: Some(to),
        }
    }
}

/// Mapping entry with its effective version range
#[derive(Debug, Clone, Copy)]
pub struct ResolvedMapping {
    pub kind: PacketKind,
    pub id: i32,
    pub range: VersionRange,
}

/// Validated id table for one phase and direction
#[derive(Debug, Clone, Default)]
pub struct PacketMappings {
    entries: Vec<ResolvedMapping>,
}

impl PacketMappings {
    pub fn builder() -> PacketMappingsBuilder {
        PacketMappingsBuilder::default()
    }

    /// Empty table; registries replaced with it forward everything as binary
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ResolvedMapping] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries active at `version`
    pub fn active(&self, version: ProtocolVersion) -> impl Iterator<Item = &ResolvedMapping> {
        self.entries
            .iter()
            .filter(move |entry| entry.range.contains(version))
    }
}

#[derive(Debug, Default)]
pub struct PacketMappingsBuilder {
    declared: Vec<(PacketKind, Vec<PacketIdMapping>)>,
}

impl PacketMappingsBuilder {
    /// Declare the id history of packet type `T`, oldest first
    pub fn register<T: DecodePacket>(mut self, mappings: impl IntoIterator<Item = PacketIdMapping>) -> Self {
        self.declared
            .push((PacketKind::of::<T>(), mappings.into_iter().collect()));
        self
    }

    /// Resolve effective ranges and reject any conflict
    ///
    /// # Errors
    /// - `InvalidMapping` when an entry's range is empty (`from > to`)
    /// - `RegistryConflict` when two types share an id over overlapping
    ///   ranges, or one type has two entries over overlapping ranges
    pub fn build(self) -> Result<PacketMappings> {
        let mut entries = Vec::new();

        for (kind, mappings) in &self.declared {
            for resolved in resolve(*kind, mappings)? {
                check_conflicts(&entries, &resolved)?;
                entries.push(resolved);
            }
        }

        Ok(PacketMappings { entries })
    }
}

/// Effective range of every entry of one type
fn resolve(kind: PacketKind, mappings: &[PacketIdMapping]) -> Result<Vec<ResolvedMapping>> {
    let mut resolved = Vec::with_capacity(mappings.len());

    for (index, current) in mappings.iter().enumerate() {
        let next = mappings.get(index + 1).filter(|next| *next != current);

        let from = current.from;
        let to = match (current.to, next) {
            (Some(to), _) => to,
            (None, Some(next)) => next.from.previous(),
            (None, None) => ProtocolVersion::LATEST,
        };

        let range = ProtocolVersion::range(from, to);
        if !range.is_valid() {
            return Err(ProxyError::InvalidMapping(format!(
                "{} id 0x{:02X}: version {} is after its last valid version {}",
                kind.name(),
                current.id,
                from.version(),
                to.version()
            )));
        }

        resolved.push(ResolvedMapping {
            kind,
            id: current.id,
            range,
        });
    }

    Ok(resolved)
}

fn check_conflicts(existing: &[ResolvedMapping], candidate: &ResolvedMapping) -> Result<()> {
    for entry in existing {
        if !entry.range.overlaps(&candidate.range) {
            continue;
        }

        if entry.id == candidate.id && entry.kind != candidate.kind {
            return Err(ProxyError::RegistryConflict(format!(
                "{} cannot be registered with packet id 0x{:02X} for {}, because {} already uses it for {}",
                candidate.kind.name(),
                candidate.id,
                candidate.range,
                entry.kind.name(),
                entry.range
            )));
        }

        if entry.kind == candidate.kind {
            return Err(ProxyError::RegistryConflict(format!(
                "{} is mapped to both 0x{:02X} ({}) and 0x{:02X} ({})",
                candidate.kind.name(),
                entry.id,
                entry.range,
                candidate.id,
                candidate.range
            )));
        }
    }

    Ok(())
}
