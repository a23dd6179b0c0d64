//! The PR (persistent reservation) lock algorithm (C10): a per-cluster
//! distributed lock serializing metadata updates across the iSCSI target
//! cluster, with a membership-incarnation discipline that discards stale
//! messages and a bounded, finite-state client/server protocol.

mod client;
mod incarnation;
mod message;
mod server;
mod transport;

pub use client::{ClientState, PrCallbacks, PrClient};
pub use incarnation::{Admission, IncarnationTracker};
pub use message::{Message, MessageType, HEADER_LEN};
pub use server::{PrServer, ServerState};
pub use transport::{ChannelTransport, NodeId, Transport};
