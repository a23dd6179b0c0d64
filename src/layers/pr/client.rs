//! Client role of the PR lock FSM (§4.10): `Passive <-> WaitProcessRemote`,
//! run on every node (including whichever one also runs
//! [`super::server::PrServer`]).

use crate::os::Mutex;
use crate::prelude::*;

use super::incarnation::IncarnationTracker;
use super::message::{Message, MessageType};
use super::transport::{NodeId, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    Passive,
    WaitProcessRemote,
}

/// The SCSI PR payload logic this FSM serializes access to; treated as an
/// external collaborator (§1: the target/PR subsystem itself is out of
/// scope, only the serializing FSM is specified here).
pub trait PrCallbacks: Send + Sync {
    /// Produces the payload to broadcast once this node wins the lock.
    fn write_metadata(&self) -> Vec<u8>;
    /// Applies a payload received from the current lock owner.
    fn read_metadata(&self, payload: &[u8]);
    /// Called exactly once per job, once every peer has processed its
    /// broadcast payload.
    fn finished(&self);
}

struct Inner {
    state: ClientState,
    server: NodeId,
    members: Vec<NodeId>,
    pending_jobs: usize,
    received: usize,
    expected: usize,
    started_incarn: u16,
}

/// The client side of the PR lock.
pub struct PrClient<C: PrCallbacks> {
    own_node: NodeId,
    transport: Arc<dyn Transport>,
    incarnations: IncarnationTracker,
    callbacks: C,
    inner: Mutex<Inner>,
}

impl<C: PrCallbacks> PrClient<C> {
    pub fn new(
        own_node: NodeId,
        server: NodeId,
        members: Vec<NodeId>,
        transport: Arc<dyn Transport>,
        callbacks: C,
    ) -> Self {
        Self {
            own_node,
            transport,
            incarnations: IncarnationTracker::new(own_node),
            callbacks,
            inner: Mutex::new(Inner {
                state: ClientState::Passive,
                server,
                members,
                pending_jobs: 0,
                received: 0,
                expected: 0,
                started_incarn: 0,
            }),
        }
    }

    pub fn state(&self) -> ClientState {
        self.inner.lock().state
    }

    /// Posts a new-PR job: sends `LOCK` to the server if none is already in
    /// flight, otherwise queues it to be sent once the in-flight job's
    /// broadcast completes.
    pub fn new_pr(&self) -> Result<()> {
        let send_now = {
            let mut inner = self.inner.lock();
            inner.pending_jobs += 1;
            inner.state == ClientState::Passive && inner.pending_jobs == 1
        };
        if send_now {
            self.send_lock()
        } else {
            Ok(())
        }
    }

    /// Handles `LOCKED` or `LOCK_UPDATE_OTHER_NODE`: this node now owns the
    /// lock, so broadcast the payload and wait for every peer's
    /// `PR_CMD_DONE`.
    pub fn on_granted(&self, _msg: Message) -> Result<()> {
        let payload = self.callbacks.write_metadata();
        let peers = {
            let mut inner = self.inner.lock();
            let peers: Vec<NodeId> = inner
                .members
                .iter()
                .copied()
                .filter(|&m| m != self.own_node)
                .collect();
            inner.expected = peers.len();
            inner.received = 0;
            inner.started_incarn = self.incarnations.own();
            inner.state = ClientState::WaitProcessRemote;
            peers
        };
        if peers.is_empty() {
            return self.after_job_done();
        }
        for peer in peers {
            let mut m = self.outbound(MessageType::PrCmd, false, peer, 0);
            m.payload = payload.clone();
            self.transport.send(peer, m)?;
        }
        Ok(())
    }

    /// Handles an inbound `PR_CMD`: applies the payload, replies with
    /// `PR_CMD_DONE`.
    pub fn on_pr_cmd(&self, msg: Message) -> Result<()> {
        self.callbacks.read_metadata(&msg.payload);
        self.transport.send(
            msg.from_node,
            self.outbound(MessageType::PrCmdDone, false, msg.from_node, msg.from_incarn),
        )
    }

    /// Handles an inbound `PR_CMD_DONE`; once every peer has replied, calls
    /// `finished` and releases the server-side lock.
    pub fn on_pr_cmd_done(&self, _msg: Message) -> Result<()> {
        let done = {
            let mut inner = self.inner.lock();
            if inner.state != ClientState::WaitProcessRemote {
                return Ok(());
            }
            inner.received += 1;
            inner.received >= inner.expected
        };
        if done {
            self.after_job_done()
        } else {
            Ok(())
        }
    }

    fn send_lock(&self) -> Result<()> {
        let server = self.inner.lock().server;
        let incarn = self.incarnations.own();
        self.transport
            .send(server, self.outbound(MessageType::Lock, true, server, incarn))
    }

    /// Common tail of a completed job: report it finished, release the
    /// server-side lock (or re-arm via `LOCKSERVER_OK` if this node's own
    /// incarnation moved on while the broadcast was outstanding), and kick
    /// off the next queued job, if any.
    fn after_job_done(&self) -> Result<()> {
        let (server, incarn_changed, more_queued) = {
            let mut inner = self.inner.lock();
            let incarn_changed = inner.started_incarn != self.incarnations.own();
            inner.pending_jobs = inner.pending_jobs.saturating_sub(1);
            inner.state = ClientState::Passive;
            (inner.server, incarn_changed, inner.pending_jobs > 0)
        };
        self.callbacks.finished();
        let release = if incarn_changed {
            self.outbound(MessageType::LockserverOk, true, server, 0)
        } else {
            self.outbound(MessageType::Unlock, true, server, 0)
        };
        self.transport.send(server, release)?;
        if more_queued {
            self.send_lock()?;
        }
        Ok(())
    }

    fn outbound(&self, msg_type: MessageType, to_server: bool, to_node: NodeId, to_incarn: u16) -> Message {
        Message {
            msg_type,
            from_server: false,
            from_node: self.own_node,
            to_server,
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCallbacks {
        finished_count: AtomicUsize,
        applied: Mutex<Vec<u8>>,
    }

    impl CountingCallbacks {
        fn new() -> Self {
            Self {
                finished_count: AtomicUsize::new(0),
                applied: Mutex::new(Vec::new()),
            }
        }
    }

    impl PrCallbacks for CountingCallbacks {
        fn write_metadata(&self) -> Vec<u8> {
            vec![0xAB]
        }
        fn read_metadata(&self, payload: &[u8]) {
            *self.applied.lock() = payload.to_vec();
        }
        fn finished(&self) {
            self.finished_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn granted(to_node: NodeId) -> Message {
        Message {
            msg_type: MessageType::Locked,
            from_server: true,
            from_node: 0,
            to_server: false,
            to_node,
            emitter_seq: 0,
            to_incarn: 0,
            from_incarn: 0,
            payload: Vec::new(),
        }
    }

    #[test]
    fn new_pr_sends_lock_to_the_server() {
        let transport = ChannelTransport::new();
        let rx_server = transport.register(0);
        let client = PrClient::new(1, 0, vec![1, 2, 3], transport, CountingCallbacks::new());
        client.new_pr().unwrap();
        let msg = rx_server.try_recv().unwrap();
        assert_eq!(msg.msg_type, MessageType::Lock);
        assert_eq!(msg.from_node, 1);
    }

    #[test]
    fn granted_broadcasts_and_finishes_after_every_done() {
        let transport = ChannelTransport::new();
        let rx_2 = transport.register(2);
        let rx_3 = transport.register(3);
        let rx_server = transport.register(0);
        let client = PrClient::new(1, 0, vec![1, 2, 3], transport, CountingCallbacks::new());
        client.new_pr().unwrap();
        let _ = rx_server.try_recv().unwrap(); // the LOCK sent above

        client.on_granted(granted(1)).unwrap();
        assert_eq!(client.state(), ClientState::WaitProcessRemote);
        let to_2 = rx_2.try_recv().unwrap();
        let to_3 = rx_3.try_recv().unwrap();
        assert_eq!(to_2.msg_type, MessageType::PrCmd);
        assert_eq!(to_2.payload, vec![0xAB]);
        assert_eq!(to_3.msg_type, MessageType::PrCmd);

        let done = Message {
            msg_type: MessageType::PrCmdDone,
            from_server: false,
            from_node: 2,
            to_server: false,
            to_node: 1,
            emitter_seq: 0,
            to_incarn: 0,
            from_incarn: 0,
            payload: Vec::new(),
        };
        client.on_pr_cmd_done(done.clone()).unwrap();
        assert_eq!(client.state(), ClientState::WaitProcessRemote); // still waiting on node 3
        client
            .on_pr_cmd_done(Message {
                from_node: 3,
                ..done
            })
            .unwrap();
        assert_eq!(client.state(), ClientState::Passive);
        let release = rx_server.try_recv().unwrap();
        assert_eq!(release.msg_type, MessageType::Unlock);
    }

    #[test]
    fn a_second_new_pr_is_queued_until_the_first_job_completes() {
        let transport = ChannelTransport::new();
        let rx_server = transport.register(0);
        let client = PrClient::new(1, 0, vec![1], transport, CountingCallbacks::new());
        client.new_pr().unwrap();
        let _ = rx_server.try_recv().unwrap(); // LOCK for job 1
        client.new_pr().unwrap();
        assert!(rx_server.try_recv().is_err()); // job 2 queued, not sent yet

        client.on_granted(granted(1)).unwrap(); // no peers besides self: finishes immediately
        let release = rx_server.try_recv().unwrap();
        assert_eq!(release.msg_type, MessageType::Unlock);
        let requeued = rx_server.try_recv().unwrap();
        assert_eq!(requeued.msg_type, MessageType::Lock);
    }

    #[test]
    fn incoming_pr_cmd_applies_payload_and_replies_done() {
        let transport = ChannelTransport::new();
        let rx_owner = transport.register(1);
        let client = PrClient::new(2, 0, vec![1, 2, 3], transport, CountingCallbacks::new());
        let cmd = Message {
            msg_type: MessageType::PrCmd,
            from_server: false,
            from_node: 1,
            to_server: false,
            to_node: 2,
            emitter_seq: 0,
            to_incarn: 0,
            from_incarn: 5,
            payload: vec![0xCD],
        };
        client.on_pr_cmd(cmd).unwrap();
        let reply = rx_owner.try_recv().unwrap();
        assert_eq!(reply.msg_type, MessageType::PrCmdDone);
        assert_eq!(reply.to_incarn, 5);
    }
}
