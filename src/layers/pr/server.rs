//! Server role of the PR lock FSM (§4.10): chosen as the cluster's first
//! live node in incarnation order, `Standby -> WaitAllOk -> ReadyUnlocked
//! <-> ReadyLocked`.

use std::collections::VecDeque;

use crate::os::Mutex;
use crate::prelude::*;

use super::incarnation::IncarnationTracker;
use super::message::{Message, MessageType};
use super::transport::{NodeId, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    Standby,
    WaitAllOk,
    ReadyUnlocked,
    ReadyLocked,
}

struct Inner {
    state: ServerState,
    members: Vec<NodeId>,
    acked: BTreeMap<NodeId, u16>,
    arbiter: Option<(NodeId, u16)>,
    owner: Option<NodeId>,
    queue: VecDeque<NodeId>,
}

/// The server side of the PR lock. Every node constructs one, but only the
/// node chosen to run the role ever has [`PrServer::install_membership`]
/// called on it by the outer membership layer.
pub struct PrServer {
    own_node: NodeId,
    transport: Arc<dyn Transport>,
    incarnations: IncarnationTracker,
    inner: Mutex<Inner>,
}

impl PrServer {
    pub fn new(own_node: NodeId, transport: Arc<dyn Transport>) -> Self {
        Self {
            own_node,
            transport,
            incarnations: IncarnationTracker::new(own_node),
            inner: Mutex::new(Inner {
                state: ServerState::Standby,
                members: Vec::new(),
                acked: BTreeMap::new(),
                arbiter: None,
                owner: None,
                queue: VecDeque::new(),
            }),
        }
    }

    pub fn state(&self) -> ServerState {
        self.inner.lock().state
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.inner.lock().owner
    }

    pub fn arbiter(&self) -> Option<(NodeId, u16)> {
        self.inner.lock().arbiter
    }

    /// Installs a new membership, resetting the barrier: every surviving
    /// member must send a fresh `LOCKSERVER_OK` before the lock resumes
    /// (§4.10: "on new membership ... all clients send LOCKSERVER_OK").
    pub fn install_membership(&self, members: Vec<NodeId>) {
        let mut inner = self.inner.lock();
        inner.members = members;
        inner.acked.clear();
        inner.arbiter = None;
        inner.owner = None;
        inner.queue.clear();
        inner.state = ServerState::WaitAllOk;
    }

    /// Handles one inbound message addressed to the server role.
    pub fn handle(&self, msg: Message) -> Result<()> {
        match msg.msg_type {
            MessageType::LockserverOk => self.on_lockserver_ok(msg),
            MessageType::Lock => self.on_lock(msg),
            MessageType::Unlock => self.on_unlock(msg),
            _ => return_errno_with_msg!(Errno::Invalid, "message not valid for the server role"),
        }
    }

    fn on_lockserver_ok(&self, msg: Message) -> Result<()> {
        let send = {
            let mut inner = self.inner.lock();
            if inner.state != ServerState::WaitAllOk {
                return Ok(());
            }
            inner.acked.insert(msg.from_node, msg.from_incarn);
            if !inner.members.iter().all(|m| inner.acked.contains_key(m)) {
                return Ok(());
            }
            let arbiter = *inner
                .acked
                .iter()
                .max_by_key(|(node, incarn)| (**incarn, **node))
                .expect("WaitAllOk barrier requires a non-empty membership");
            inner.arbiter = Some(arbiter);
            inner.owner = Some(arbiter.0);
            inner.state = ServerState::ReadyLocked;
            arbiter
        };
        self.transport.send(
            send.0,
            self.outbound(MessageType::LockUpdateOtherNode, send.0, 0),
        )
    }

    fn on_lock(&self, msg: Message) -> Result<()> {
        let grant = {
            let mut inner = self.inner.lock();
            match inner.state {
                ServerState::ReadyUnlocked => {
                    inner.owner = Some(msg.from_node);
                    inner.state = ServerState::ReadyLocked;
                    true
                }
                ServerState::ReadyLocked => {
                    inner.queue.push_back(msg.from_node);
                    false
                }
                // A LOCK that arrives before the barrier completes is
                // dropped; the client resends once it sees LOCKSERVER_OK
                // processed (no client state in this FSM depends on it).
                ServerState::Standby | ServerState::WaitAllOk => false,
            }
        };
        if grant {
            self.transport.send(
                msg.from_node,
                self.outbound(MessageType::Locked, msg.from_node, msg.from_incarn),
            )
        } else {
            Ok(())
        }
    }

    fn on_unlock(&self, msg: Message) -> Result<()> {
        let next = {
            let mut inner = self.inner.lock();
            if inner.state != ServerState::ReadyLocked || inner.owner != Some(msg.from_node) {
                return Ok(());
            }
            match inner.queue.pop_front() {
                Some(next) => {
                    inner.owner = Some(next);
                    Some(next)
                }
                None => {
                    inner.owner = None;
                    inner.state = ServerState::ReadyUnlocked;
                    None
                }
            }
        };
        match next {
            Some(next) => self
                .transport
                .send(next, self.outbound(MessageType::Locked, next, 0)),
            None => Ok(()),
        }
    }

    fn outbound(&self, msg_type: MessageType, to_node: NodeId, to_incarn: u16) -> Message {
        Message {
            msg_type,
            from_server: true,
            from_node: self.own_node,
            to_server: false,
            to_node,
            emitter_seq: 0,
            to_incarn,
            from_incarn: self.incarnations.own(),
            payload: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::transport::ChannelTransport;

    fn ok(node: NodeId) -> Message {
        Message {
            msg_type: MessageType::LockserverOk,
            from_server: false,
            from_node: node,
            to_server: true,
            to_node: 0,
            emitter_seq: 0,
            to_incarn: 0,
            from_incarn: node as u16,
            payload: Vec::new(),
        }
    }

    fn lock(node: NodeId) -> Message {
        Message {
            msg_type: MessageType::Lock,
            from_server: false,
            from_node: node,
            to_server: true,
            to_node: 0,
            emitter_seq: 0,
            to_incarn: 0,
            from_incarn: 0,
            payload: Vec::new(),
        }
    }

    fn unlock(node: NodeId) -> Message {
        Message {
            msg_type: MessageType::Unlock,
            from_server: false,
            from_node: node,
            to_server: true,
            to_node: 0,
            emitter_seq: 0,
            to_incarn: 0,
            from_incarn: 0,
            payload: Vec::new(),
        }
    }

    #[test]
    fn full_barrier_picks_highest_incarnation_as_arbiter() {
        let transport = ChannelTransport::new();
        let rx_a = transport.register(1);
        let server = PrServer::new(0, transport);
        server.install_membership(vec![1, 2, 3]);
        server.handle(ok(1)).unwrap();
        assert_eq!(server.state(), ServerState::WaitAllOk);
        server.handle(ok(3)).unwrap();
        server.handle(ok(2)).unwrap();
        assert_eq!(server.state(), ServerState::ReadyLocked);
        assert_eq!(server.owner(), Some(1));
        let msg = rx_a.try_recv().unwrap();
        assert_eq!(msg.msg_type, MessageType::LockUpdateOtherNode);
        assert_eq!(msg.to_node, 1);
    }

    #[test]
    fn lock_in_ready_unlocked_grants_immediately() {
        let transport = ChannelTransport::new();
        let rx_b = transport.register(2);
        let server = PrServer::new(0, transport);
        server.install_membership(vec![1]);
        server.handle(ok(1)).unwrap();
        assert_eq!(server.state(), ServerState::ReadyLocked);
        assert_eq!(server.owner(), Some(1));
        // Owner releases, then a fresh LOCK is granted right away.
        server.handle(unlock(1)).unwrap();
        assert_eq!(server.state(), ServerState::ReadyUnlocked);
        server.handle(lock(2)).unwrap();
        assert_eq!(server.owner(), Some(2));
        let msg = rx_b.try_recv().unwrap();
        assert_eq!(msg.msg_type, MessageType::Locked);
    }

    #[test]
    fn queued_lock_is_granted_fifo_on_unlock() {
        let transport = ChannelTransport::new();
        let rx_b = transport.register(2);
        let server = PrServer::new(0, transport);
        server.install_membership(vec![1]);
        server.handle(ok(1)).unwrap();
        assert_eq!(server.owner(), Some(1));
        server.handle(lock(2)).unwrap();
        assert!(rx_b.try_recv().is_err()); // queued, not granted yet
        server.handle(unlock(1)).unwrap();
        assert_eq!(server.owner(), Some(2));
        let msg = rx_b.try_recv().unwrap();
        assert_eq!(msg.msg_type, MessageType::Locked);
    }

    #[test]
    fn new_membership_resets_the_barrier() {
        let transport = ChannelTransport::new();
        let server = PrServer::new(0, transport);
        server.install_membership(vec![1, 2, 3]);
        server.handle(ok(1)).unwrap();
        server.handle(ok(2)).unwrap();
        assert_eq!(server.state(), ServerState::WaitAllOk);
        // C leaves; new membership {1,2} only needs those two to re-arm.
        server.install_membership(vec![1, 2]);
        assert_eq!(server.state(), ServerState::WaitAllOk);
        server.handle(ok(1)).unwrap();
        server.handle(ok(2)).unwrap();
        assert_eq!(server.state(), ServerState::ReadyLocked);
    }
}
