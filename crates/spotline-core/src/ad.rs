//! The allocation unit issued by the planning subsystem.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An allocation unit: one spot plan within its master plan, edition and group.
///
/// The four identifiers are correlated and always travel together. `Ad` is an
/// immutable value type with structural equality, so it can key the
/// dispatch-plan maps directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ad {
    /// Spot plan identifier
    pub spot_plan_id: u64,
    /// Master plan the spot plan belongs to
    pub master_plan_id: u64,
    /// Edition of the spot plan
    pub edition_id: u64,
    /// Spot plan group
    pub group_id: u64,
}

impl Ad {
    /// Create an ad from its four identifiers
    pub const fn new(spot_plan_id: u64, master_plan_id: u64, edition_id: u64, group_id: u64) -> Self {
        Self {
            spot_plan_id,
            master_plan_id,
            edition_id,
            group_id,
        }
    }
}

impl fmt::Display for Ad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ad({}/{}/{}/{})",
            self.spot_plan_id, self.master_plan_id, self.edition_id, self.group_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ad_structural_equality() {
        let a = Ad::new(1, 2, 3, 4);
        let b = Ad::new(1, 2, 3, 4);
        let c = Ad::new(1, 2, 3, 5);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }
}
