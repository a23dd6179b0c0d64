//! Single-point-of-failure grouping (§4.7): disks that share a SPOF group
//! must not back two slots of the same redundancy unit.

use serde::{Deserialize, Serialize};

/// Identifies a single point of failure a disk depends on (an enclosure, a
/// controller, a host — whatever the administrator names at group-creation
/// time). Disks with no stated dependency each get their own singleton group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpofGroupId(pub u32);

impl SpofGroupId {
    pub const NONE: SpofGroupId = SpofGroupId(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SpofGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "spof-{}", self.0)
    }
}
