//! The seam between the PR FSMs and the network (§4.10): the shipped
//! implementation is an in-process, channel-backed transport used by tests
//! and by a single-process multi-group deployment; a real cluster backs
//! the same trait with the messaging bus, out of scope here.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::os::Mutex;
use crate::prelude::*;

use super::message::Message;

/// A node identity within the PR cluster.
pub type NodeId = u8;

/// Delivers PR messages to other cluster members.
pub trait Transport: Send + Sync {
    fn send(&self, to: NodeId, msg: Message) -> Result<()>;
}

/// An in-process transport: every member registers an inbox, and `send`
/// hands the message directly to the recipient's channel.
pub struct ChannelTransport {
    senders: Mutex<HashMap<NodeId, Sender<Message>>>,
}

impl ChannelTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            senders: Mutex::new(HashMap::new()),
        })
    }

    /// Registers `node`, returning the receiving end of its inbox. Replaces
    /// any previous registration for the same node.
    pub fn register(&self, node: NodeId) -> Receiver<Message> {
        let (tx, rx) = mpsc::channel();
        self.senders.lock().insert(node, tx);
        rx
    }
}

impl Transport for ChannelTransport {
    fn send(&self, to: NodeId, msg: Message) -> Result<()> {
        let senders = self.senders.lock();
        let tx = senders.get(&to).ok_or_else(|| {
            Error::with_msg(Errno::NotFound, "PR transport has no inbox for that node")
        })?;
        tx.send(msg)
            .map_err(|_| Error::with_msg(Errno::IoError, "PR transport peer is gone"))
    }
}
