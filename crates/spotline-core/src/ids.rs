//! Identifier newtypes
//!
//! Numeric identifiers issued by the planning and configuration systems.
//! They are transparent on the wire so snapshot and configuration files
//! stay plain numbers.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create an identifier from its raw value
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw numeric value
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

numeric_id!(
    /// A publishing medium (site, app, channel) requesting ads
    MediaId,
    "media"
);
numeric_id!(
    /// A single ad position (slot group on a page or an ad break)
    PositionId,
    "position"
);
numeric_id!(
    /// A group of positions served together
    GroupId,
    "group"
);
numeric_id!(
    /// Creative type of a material (video, banner, ...)
    CreativeTypeId,
    "creative-type"
);
numeric_id!(
    /// A deliverable creative
    MaterialId,
    "material"
);

/// Server instance identifier used in service status records
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub String);

impl ServerId {
    /// Create a server identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Target of a human-readable position code: a single position or a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PositionOrGroup {
    /// A single position
    Position(PositionId),
    /// A group of positions
    Group(GroupId),
}

impl fmt::Display for PositionOrGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionOrGroup::Position(id) => id.fmt(f),
            PositionOrGroup::Group(id) => id.fmt(f),
        }
    }
}
