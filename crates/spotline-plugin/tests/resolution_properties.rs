//! Property-Based Tests for Plugin Resolution
//!
//! ## Properties Verified
//!
//! - Resolution never returns a version below the requested minimum
//! - Resolution returns the highest registered version when one qualifies
//! - Resolution fails exactly when no registered version qualifies

use proptest::prelude::*;
use spotline_plugin::builtin::RemainingCountScorer;
use spotline_plugin::{PluginId, PluginInstance, PluginRegistry, PluginVersion};

fn arb_version() -> impl Strategy<Value = PluginVersion> {
    (0u32..4, 0u32..4, 0u32..4).prop_map(|(major, minor, patch)| PluginVersion::new(major, minor, patch))
}

proptest! {
    /// Property: resolution picks the greatest version >= minimum, or fails
    #[test]
    fn prop_resolution_respects_minimum(
        registered in proptest::collection::btree_set(arb_version(), 0..8),
        minimum in arb_version(),
    ) {
        let registry = PluginRegistry::new();
        for version in &registered {
            registry.register("scorer", *version, PluginInstance::scorer(RemainingCountScorer));
        }

        let expected = registered.iter().filter(|version| **version >= minimum).max().copied();
        match registry.resolve_scorer(&PluginId::new("scorer"), minimum) {
            Ok(resolved) => {
                prop_assert!(resolved.version >= minimum);
                prop_assert_eq!(Some(resolved.version), expected);
            }
            Err(err) => {
                prop_assert!(err.is_not_found());
                prop_assert_eq!(expected, None);
            }
        }
    }
}

#[test]
fn test_registered_one_two_three_minimum_two() {
    let registry = PluginRegistry::new();
    for major in 1..=3 {
        registry.register(
            "scorer",
            PluginVersion::new(major, 0, 0),
            PluginInstance::scorer(RemainingCountScorer),
        );
    }

    let resolved = registry
        .resolve_scorer(&PluginId::new("scorer"), PluginVersion::new(2, 0, 0))
        .unwrap();
    assert_ne!(resolved.version, PluginVersion::new(1, 0, 0));
    assert!(resolved.version >= PluginVersion::new(2, 0, 0));
}
