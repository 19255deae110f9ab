//! Reference plugins
//!
//! Small, deterministic implementations of every contract so a runtime can
//! serve end to end without external plugins. They make no targeting
//! decisions: the policy releases whatever the dispatch plan holds, in
//! slot order.

mod filter;
mod policy;
mod scorer;
mod selector;
mod serializer;

pub use filter::ExhaustedFilter;
pub use policy::PlanOrderPolicy;
pub use scorer::RemainingCountScorer;
pub use selector::{StaticSelector, SERIALIZER_PARAMETER};
pub use serializer::JsonSerializer;

use crate::contracts::PluginInstance;
use crate::registry::PluginRegistry;
use crate::version::{PluginKind, PluginReference, PluginVersion};

/// Version every reference plugin registers at
pub const BUILTIN_VERSION: PluginVersion = PluginVersion::new(1, 0, 0);

/// Id of [`PlanOrderPolicy`]
pub const PLAN_ORDER_POLICY: &str = "plan-order";
/// Id of [`ExhaustedFilter`]
pub const EXHAUSTED_FILTER: &str = "exhausted";
/// Id of [`RemainingCountScorer`]
pub const REMAINING_COUNT_SCORER: &str = "remaining-count";
/// Id of [`JsonSerializer`]
pub const JSON_SERIALIZER: &str = "json";
/// Id of [`StaticSelector`]
pub const STATIC_SELECTOR: &str = "static";

/// Register every reference plugin at [`BUILTIN_VERSION`]
pub fn register_builtins(registry: &PluginRegistry) {
    registry.register(
        PLAN_ORDER_POLICY,
        BUILTIN_VERSION,
        PluginInstance::policy(PlanOrderPolicy),
    );
    registry.register(
        EXHAUSTED_FILTER,
        BUILTIN_VERSION,
        PluginInstance::filter(ExhaustedFilter),
    );
    registry.register(
        REMAINING_COUNT_SCORER,
        BUILTIN_VERSION,
        PluginInstance::scorer(RemainingCountScorer),
    );
    registry.register(
        JSON_SERIALIZER,
        BUILTIN_VERSION,
        PluginInstance::serializer(JsonSerializer),
    );
    registry.register(
        STATIC_SELECTOR,
        BUILTIN_VERSION,
        PluginInstance::serializer_selector(StaticSelector::new(json_serializer_reference())),
    );
}

/// Reference to the JSON serializer at any version
pub fn json_serializer_reference() -> PluginReference {
    PluginReference::new(PluginKind::Serializer, JSON_SERIALIZER, PluginVersion::ZERO)
}

/// Reference to the static selector at any version
pub fn static_selector_reference() -> PluginReference {
    PluginReference::new(
        PluginKind::SerializerSelector,
        STATIC_SELECTOR,
        PluginVersion::ZERO,
    )
}
