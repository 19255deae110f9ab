//! Spotline Plugin: delivery pipeline contracts and registry
//!
//! A delivery pipeline is a chain of independently versioned plugins:
//!
//! - **Policy**: chooses, per matched position, an ordered queue of
//!   candidate materials from the current dispatch slice
//! - **Filter** and **Scorer**: helpers a policy may consult
//! - **SerializerSelector**: picks which serializer renders each level
//! - **Serializer**: renders ads, positions and the global response
//!
//! Pipelines bind plugins by `(id, minimum version)`, so the
//! [`PluginRegistry`] always resolves to the highest registered version at
//! or above the minimum. A newer compatible version can be registered at
//! run time and picked up by the next request.
//!
//! Plugin calls are synchronous and run on the caller's thread.

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod builtin;
pub mod context;
pub mod contracts;
pub mod errors;
pub mod pipeline;
pub mod registry;
pub mod version;

pub use context::{MaterialCandidate, MaterialRelease, Parameters, PolicyContext, PositionQueue};
pub use contracts::{
    FilterPlugin, PluginInstance, PolicyPlugin, ScorerPlugin, SerializerPlugin,
    SerializerSelectorPlugin,
};
pub use errors::{PluginError, PluginResult};
pub use pipeline::{
    best_mapping, Creative, Group, PipelineConfiguration, Position, SerializerLevel,
    SerializerMapping,
};
pub use registry::{PluginRegistry, Resolved};
pub use version::{PluginId, PluginKind, PluginReference, PluginVersion};
