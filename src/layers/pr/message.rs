//! On-wire PR message framing (§6): a fixed 20-byte header, little-endian,
//! followed by an optional payload whose length is framed by the transport
//! rather than carried in the header itself.

use crate::prelude::*;

pub const HEADER_LEN: usize = 20;

/// The PR protocol's message kinds (§4.10).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    LockserverOk = 0,
    LockUpdateOtherNode = 1,
    Lock = 2,
    Locked = 3,
    Unlock = 4,
    PrCmd = 5,
    PrCmdDone = 6,
}

impl MessageType {
    fn from_u32(v: u32) -> Result<Self> {
        Ok(match v {
            0 => Self::LockserverOk,
            1 => Self::LockUpdateOtherNode,
            2 => Self::Lock,
            3 => Self::Locked,
            4 => Self::Unlock,
            5 => Self::PrCmd,
            6 => Self::PrCmdDone,
            _ => return_errno_with_msg!(Errno::Invalid, "unknown PR message type"),
        })
    }
}

/// A single PR protocol message: header fields plus an optional payload
/// (carried by `PR_CMD`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    pub from_server: bool,
    pub from_node: u8,
    pub to_server: bool,
    pub to_node: u8,
    pub emitter_seq: u16,
    pub to_incarn: u16,
    pub from_incarn: u16,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&(self.msg_type as u32).to_le_bytes());
        buf.push(self.from_server as u8);
        buf.push(self.from_node);
        buf.push(self.to_server as u8);
        buf.push(self.to_node);
        buf.extend_from_slice(&self.emitter_seq.to_le_bytes());
        buf.extend_from_slice(&self.to_incarn.to_le_bytes());
        buf.extend_from_slice(&self.from_incarn.to_le_bytes());
        buf.extend_from_slice(&[0u8; 6]);
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_LEN {
            return_errno_with_msg!(Errno::Invalid, "PR message shorter than its header");
        }
        let msg_type = MessageType::from_u32(u32::from_le_bytes(frame[0..4].try_into().unwrap()))?;
        Ok(Self {
            msg_type,
            from_server: frame[4] != 0,
            from_node: frame[5],
            to_server: frame[6] != 0,
            to_node: frame[7],
            emitter_seq: u16::from_le_bytes(frame[8..10].try_into().unwrap()),
            to_incarn: u16::from_le_bytes(frame[10..12].try_into().unwrap()),
            from_incarn: u16::from_le_bytes(frame[12..14].try_into().unwrap()),
            payload: frame[HEADER_LEN..].to_vec(),
        })
    }
}
