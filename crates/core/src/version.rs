//! Minecraft protocol versions
//!
//! A protocol version is an ordinal identifying one released wire format.
//! Consecutive releases that share a wire format share the ordinal, so the
//! table below maps each ordinal to every release name it covers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Protocol version ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(i32);

macro_rules! protocol_versions {
    ($($name:ident = $version:literal => [$($release:literal),+];)+) => {
        impl ProtocolVersion {
            $(pub const $name: ProtocolVersion = ProtocolVersion($version);)+
        }

        /// Every known protocol version, oldest first
        const KNOWN: &[(ProtocolVersion, &[&str])] = &[
            $((ProtocolVersion($version), &[$($release),+]),)+
        ];
    };
}

protocol_versions! {
    MINECRAFT_1_7_2 = 4 => ["1.7.2", "1.7.3", "1.7.4", "1.7.5"];
    MINECRAFT_1_7_6 = 5 => ["1.7.6", "1.7.7", "1.7.8", "1.7.9", "1.7.10"];
    MINECRAFT_1_8 = 47 => ["1.8", "1.8.1", "1.8.2", "1.8.3", "1.8.4", "1.8.5", "1.8.6", "1.8.7", "1.8.8", "1.8.9"];
    MINECRAFT_1_9 = 107 => ["1.9"];
    MINECRAFT_1_9_1 = 108 => ["1.9.1"];
    MINECRAFT_1_9_2 = 109 => ["1.9.2"];
    MINECRAFT_1_9_4 = 110 => ["1.9.3", "1.9.4"];
    MINECRAFT_1_10 = 210 => ["1.10", "1.10.1", "1.10.2"];
    MINECRAFT_1_11 = 315 => ["1.11"];
    MINECRAFT_1_11_1 = 316 => ["1.11.1", "1.11.2"];
    MINECRAFT_1_12 = 335 => ["1.12"];
    MINECRAFT_1_12_1 = 338 => ["1.12.1"];
    MINECRAFT_1_12_2 = 340 => ["1.12.2"];
    MINECRAFT_1_13 = 393 => ["1.13"];
    MINECRAFT_1_13_1 = 401 => ["1.13.1"];
    MINECRAFT_1_13_2 = 404 => ["1.13.2"];
    MINECRAFT_1_14 = 477 => ["1.14"];
    MINECRAFT_1_14_1 = 480 => ["1.14.1"];
    MINECRAFT_1_14_2 = 485 => ["1.14.2"];
    MINECRAFT_1_14_3 = 490 => ["1.14.3"];
    MINECRAFT_1_14_4 = 498 => ["1.14.4"];
    MINECRAFT_1_15 = 573 => ["1.15"];
    MINECRAFT_1_15_1 = 575 => ["1.15.1"];
    MINECRAFT_1_15_2 = 578 => ["1.15.2"];
    MINECRAFT_1_16 = 735 => ["1.16"];
    MINECRAFT_1_16_1 = 736 => ["1.16.1"];
    MINECRAFT_1_16_2 = 751 => ["1.16.2"];
    MINECRAFT_1_16_3 = 753 => ["1.16.3"];
    MINECRAFT_1_16_4 = 754 => ["1.16.4", "1.16.5"];
    MINECRAFT_1_17 = 755 => ["1.17"];
    MINECRAFT_1_17_1 = 756 => ["1.17.1"];
    MINECRAFT_1_18 = 757 => ["1.18", "1.18.1"];
    MINECRAFT_1_18_2 = 758 => ["1.18.2"];
    MINECRAFT_1_19 = 759 => ["1.19"];
    MINECRAFT_1_19_1 = 760 => ["1.19.1", "1.19.2"];
    MINECRAFT_1_19_3 = 761 => ["1.19.3"];
    MINECRAFT_1_19_4 = 762 => ["1.19.4"];
    MINECRAFT_1_20 = 763 => ["1.20", "1.20.1"];
    MINECRAFT_1_20_2 = 764 => ["1.20.2"];
    MINECRAFT_1_20_3 = 765 => ["1.20.3", "1.20.4"];
    MINECRAFT_1_20_5 = 766 => ["1.20.5", "1.20.6"];
    MINECRAFT_1_21 = 767 => ["1.21", "1.21.1"];
    MINECRAFT_1_21_2 = 768 => ["1.21.2", "1.21.3"];
    MINECRAFT_1_21_4 = 769 => ["1.21.4"];
}

impl ProtocolVersion {
    /// Oldest version in the known table
    pub const OLDEST: ProtocolVersion = ProtocolVersion::MINECRAFT_1_7_2;

    /// Latest version in the known table
    pub const LATEST: ProtocolVersion = ProtocolVersion::MINECRAFT_1_21_4;

    /// Wrap a raw ordinal, known or not
    pub const fn new(version: i32) -> Self {
        Self(version)
    }

    /// Look up a known version by its ordinal
    pub fn get(version: i32) -> Option<Self> {
        KNOWN
            .iter()
            .find(|(known, _)| known.0 == version)
            .map(|(known, _)| *known)
    }

    /// Raw ordinal as sent in the handshake
    pub const fn version(self) -> i32 {
        self.0
    }

    /// Ordinal immediately below this one
    pub const fn previous(self) -> Self {
        Self(self.0 - 1)
    }

    pub fn is_known(self) -> bool {
        Self::get(self.0).is_some()
    }

    /// Release names sharing this wire format
    pub fn names(self) -> &'static [&'static str] {
        KNOWN
            .iter()
            .find(|(known, _)| *known == self)
            .map(|(_, names)| *names)
            .unwrap_or(&[])
    }

    /// Release this version was introduced in
    pub fn introduced_in(self) -> Option<&'static str> {
        self.names().first().copied()
    }

    /// Most recent release using this version
    pub fn most_recent_release(self) -> Option<&'static str> {
        self.names().last().copied()
    }

    /// Inclusive range `[start, end]`
    pub const fn range(start: Self, end: Self) -> VersionRange {
        VersionRange { start, end }
    }

    /// Every known version in `[start, end]`, oldest first
    pub fn known_between(start: Self, end: Self) -> impl Iterator<Item = ProtocolVersion> {
        KNOWN
            .iter()
            .map(|(version, _)| *version)
            .filter(move |version| *version >= start && *version <= end)
    }

    /// Every known version, oldest first
    pub fn all() -> impl Iterator<Item = ProtocolVersion> {
        KNOWN.iter().map(|(version, _)| *version)
    }
}

impl From<i32> for ProtocolVersion {
    fn from(version: i32) -> Self {
        Self(version)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.introduced_in() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "unknown ({})", self.0),
        }
    }
}

/// Inclusive range of protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub start: ProtocolVersion,
    pub end: ProtocolVersion,
}

impl VersionRange {
    /// Whether `start <= end`
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    pub fn contains(&self, version: ProtocolVersion) -> bool {
        version >= self.start && version <= self.end
    }

    pub fn overlaps(&self, other: &VersionRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl From<RangeInclusive<ProtocolVersion>> for VersionRange {
    fn from(range: RangeInclusive<ProtocolVersion>) -> Self {
        let (start, end) = range.into_inner();
        Self { start, end }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start.0, self.end.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_versions_are_ordered() {
        let versions: Vec<_> = ProtocolVersion::all().collect();
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(versions.first(), Some(&ProtocolVersion::OLDEST));
        assert_eq!(versions.last(), Some(&ProtocolVersion::LATEST));
    }

    #[test]
    fn test_lookup_and_names() {
        assert_eq!(ProtocolVersion::get(47), Some(ProtocolVersion::MINECRAFT_1_8));
        assert_eq!(ProtocolVersion::get(48), None);
        assert_eq!(ProtocolVersion::MINECRAFT_1_8.introduced_in(), Some("1.8"));
        assert_eq!(ProtocolVersion::MINECRAFT_1_8.most_recent_release(), Some("1.8.9"));
        assert!(ProtocolVersion::new(9999).names().is_empty());
    }

    #[test]
    fn test_range_containment() {
        let range = ProtocolVersion::range(ProtocolVersion::MINECRAFT_1_12, ProtocolVersion::MINECRAFT_1_13);
        assert!(range.contains(ProtocolVersion::MINECRAFT_1_12_2));
        assert!(range.contains(ProtocolVersion::MINECRAFT_1_13));
        assert!(!range.contains(ProtocolVersion::MINECRAFT_1_13_1));
        assert!(range.is_valid());

        let reversed = ProtocolVersion::range(ProtocolVersion::MINECRAFT_1_13, ProtocolVersion::MINECRAFT_1_12);
        assert!(!reversed.is_valid());
    }

    #[test]
    fn test_range_overlap() {
        let a = VersionRange::from(ProtocolVersion::MINECRAFT_1_8..=ProtocolVersion::MINECRAFT_1_12);
        let b = VersionRange::from(ProtocolVersion::MINECRAFT_1_12..=ProtocolVersion::LATEST);
        let c = VersionRange::from(ProtocolVersion::MINECRAFT_1_13..=ProtocolVersion::LATEST);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_known_between() {
        let versions: Vec<_> = ProtocolVersion::known_between(
            ProtocolVersion::MINECRAFT_1_20_2,
            ProtocolVersion::MINECRAFT_1_20_5,
        )
        .collect();
        assert_eq!(
            versions,
            vec![
                ProtocolVersion::MINECRAFT_1_20_2,
                ProtocolVersion::MINECRAFT_1_20_3,
                ProtocolVersion::MINECRAFT_1_20_5,
            ]
        );
    }
}
