//! Incarnation discipline (§4.10, Property 8): each node's own incarnation
//! is a monotone counter bumped on every accepted membership; an inbound
//! message is admitted only against the receiver's locally-known
//! incarnation of its sender.

use crate::os::Mutex;
use crate::prelude::*;

use super::transport::NodeId;

/// What to do with a message once its `to_incarn` has been checked against
/// the locally-known incarnation of its sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// `to_incarn == local_incarn(from)`: process it now.
    Accept,
    /// `to_incarn < local_incarn(from)`: drop it silently.
    Stale,
    /// `to_incarn > local_incarn(from)`: buffer it until the matching
    /// membership is installed locally.
    Deferred,
}

/// Tracks this node's own incarnation plus its last-known incarnation of
/// every peer, and classifies inbound messages against the latter.
pub struct IncarnationTracker {
    own_node: NodeId,
    own: Mutex<u16>,
    known: Mutex<HashMap<NodeId, u16>>,
}

impl IncarnationTracker {
    pub fn new(own_node: NodeId) -> Self {
        Self {
            own_node,
            own: Mutex::new(0),
            known: Mutex::new(HashMap::new()),
        }
    }

    pub fn own_node(&self) -> NodeId {
        self.own_node
    }

    /// This node's current incarnation.
    pub fn own(&self) -> u16 {
        *self.own.lock()
    }

    /// Bumps this node's own incarnation on an accepted membership change,
    /// returning the new value.
    pub fn bump_own(&self) -> u16 {
        let mut own = self.own.lock();
        *own = own.wrapping_add(1);
        *own
    }

    /// The locally-known incarnation of `node`, `0` if never observed.
    pub fn local_incarn(&self, node: NodeId) -> u16 {
        *self.known.lock().get(&node).unwrap_or(&0)
    }

    /// Records `node`'s incarnation as of the membership just installed
    /// locally.
    pub fn set_local_incarn(&self, node: NodeId, incarn: u16) {
        self.known.lock().insert(node, incarn);
    }

    /// Classifies a message whose `to_incarn` targets `from`'s incarnation
    /// as known locally.
    pub fn admit(&self, from: NodeId, to_incarn: u16) -> Admission {
        let local = self.local_incarn(from);
        if to_incarn == local {
            Admission::Accept
        } else if to_incarn < local {
            Admission::Stale
        } else {
            Admission::Deferred
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_incarnation_is_accepted() {
        let tracker = IncarnationTracker::new(0);
        tracker.set_local_incarn(1, 5);
        assert_eq!(tracker.admit(1, 5), Admission::Accept);
    }

    #[test]
    fn lower_incarnation_is_stale() {
        let tracker = IncarnationTracker::new(0);
        tracker.set_local_incarn(1, 5);
        assert_eq!(tracker.admit(1, 4), Admission::Stale);
    }

    #[test]
    fn higher_incarnation_is_deferred() {
        let tracker = IncarnationTracker::new(0);
        tracker.set_local_incarn(1, 5);
        assert_eq!(tracker.admit(1, 6), Admission::Deferred);
    }

    #[test]
    fn bump_own_is_monotone() {
        let tracker = IncarnationTracker::new(0);
        assert_eq!(tracker.bump_own(), 1);
        assert_eq!(tracker.bump_own(), 2);
        assert_eq!(tracker.own(), 2);
    }
}
