//! Plugin identity: id, kind, version and references

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PluginError;

/// Capability a plugin provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    /// Chooses candidate materials per position
    Policy,
    /// Narrows a candidate list
    Filter,
    /// Scores a candidate
    Scorer,
    /// Renders ads, positions and the global response
    Serializer,
    /// Chooses a serializer
    SerializerSelector,
}

impl PluginKind {
    /// Every kind, in pipeline order
    pub const ALL: [PluginKind; 5] = [
        PluginKind::Policy,
        PluginKind::Filter,
        PluginKind::Scorer,
        PluginKind::SerializerSelector,
        PluginKind::Serializer,
    ];

    /// Lower-case name
    pub fn as_str(self) -> &'static str {
        match self {
            PluginKind::Policy => "policy",
            PluginKind::Filter => "filter",
            PluginKind::Scorer => "scorer",
            PluginKind::Serializer => "serializer",
            PluginKind::SerializerSelector => "serializer_selector",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plugin identifier, unique per kind
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    /// Create a plugin id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PluginId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PluginId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `major.minor.patch` plugin version, ordered component-wise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PluginVersion {
    /// Major component
    pub major: u32,
    /// Minor component
    pub minor: u32,
    /// Patch component
    pub patch: u32,
}

impl PluginVersion {
    /// Lowest possible version
    pub const ZERO: PluginVersion = PluginVersion::new(0, 0, 0);

    /// Create a version
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for PluginVersion {
    type Err = PluginError;

    /// Parses `1`, `1.2` or `1.2.3`; missing components are zero
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u32; 3];
        let mut count = 0;
        for part in input.trim().split('.') {
            if count == parts.len() {
                return Err(PluginError::invalid_version(input, "too many components"));
            }
            parts[count] = part
                .parse()
                .map_err(|err| PluginError::invalid_version(input, format!("{err}")))?;
            count += 1;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl Serialize for PluginVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PluginVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Binding to a plugin by id and minimum acceptable version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginReference {
    /// Referenced plugin
    pub id: PluginId,
    /// Lowest acceptable version
    pub minimum: PluginVersion,
    /// Kind of the referenced plugin
    pub kind: PluginKind,
}

impl PluginReference {
    /// Create a reference
    pub fn new(kind: PluginKind, id: impl Into<PluginId>, minimum: PluginVersion) -> Self {
        Self {
            id: id.into(),
            minimum,
            kind,
        }
    }
}

impl fmt::Display for PluginReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}>={}", self.kind, self.id, self.minimum)
    }
}
