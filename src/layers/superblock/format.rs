//! Superblock wire format (§4.6): a fixed, checksummed frame wrapping a
//! `postcard`-encoded payload, stored as two copies per disk.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksum::checksum;
use crate::prelude::*;
use crate::version::{major_compatible, Version};

/// Frame magic, little-endian on the wire.
pub const MAGIC: [u8; 4] = *b"XANO";

/// Byte length of the fixed header, not counting the variable-length payload.
pub const HEADER_LEN: usize =
    4 /* magic */ + 4 /* version */ + 4 /* reserved */ + 2 /* crc16 */ + 4 /* payload_len */
    + 16 /* group_uuid */ + 16 /* disk_uuid */ + 4 /* node_id */ + 4 /* layout_tag */;

/// The variable-length, `postcard`-encoded part of a superblock: everything
/// that isn't needed to validate the frame itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperblockPayload {
    /// Monotonically increasing; the higher generation wins when both
    /// copies on a disk are otherwise valid.
    pub generation: u64,
    pub group_name: String,
    /// Layout-specific parameters (SU size, slot width, ...), opaque here.
    pub layout_params: Vec<u8>,
    pub disk_roster: Vec<Uuid>,
}

/// A decoded superblock: the fixed header fields plus the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Superblock {
    pub format_version: Version,
    pub group_uuid: Uuid,
    pub disk_uuid: Uuid,
    pub node_id: u32,
    pub layout_tag: u32,
    pub payload: SuperblockPayload,
}

impl Superblock {
    /// Encodes the frame: header + `postcard`-serialized payload, with the
    /// CRC computed over the whole frame with the CRC field zeroed.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload_bytes =
            postcard::to_allocvec(&self.payload).map_err(|e| Error::with_source(Errno::Invalid, e))?;
        let payload_len: u32 = payload_bytes
            .len()
            .try_into()
            .map_err(|_| Error::with_msg(Errno::Invalid, "payload too large for a superblock"))?;

        let mut frame = Vec::with_capacity(HEADER_LEN + payload_bytes.len());
        frame.extend_from_slice(&MAGIC);
        frame.extend_from_slice(&encode_version(&self.format_version));
        frame.extend_from_slice(&[0u8; 4]); // reserved
        frame.extend_from_slice(&[0u8; 2]); // crc placeholder
        frame.extend_from_slice(&payload_len.to_le_bytes());
        frame.extend_from_slice(self.group_uuid.as_bytes());
        frame.extend_from_slice(self.disk_uuid.as_bytes());
        frame.extend_from_slice(&self.node_id.to_le_bytes());
        frame.extend_from_slice(&self.layout_tag.to_le_bytes());
        frame.extend_from_slice(&payload_bytes);

        let crc = checksum(&frame);
        frame[12..14].copy_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Decodes and validates one frame copy: magic, CRC, then (if
    /// `expected_format_version` is given) major-version compatibility.
    pub fn decode(frame: &[u8], expected_format_version: Option<&Version>) -> Result<Self> {
        if frame.len() < HEADER_LEN {
            return_errno_with_msg!(Errno::Corruption, "superblock frame shorter than its header");
        }
        if frame[0..4] != MAGIC {
            return_errno_with_msg!(Errno::Corruption, "superblock magic mismatch");
        }

        let stored_crc = u16::from_le_bytes([frame[12], frame[13]]);
        let mut check_frame = frame.to_vec();
        check_frame[12..14].copy_from_slice(&[0, 0]);
        if checksum(&check_frame) != stored_crc {
            return_errno_with_msg!(Errno::Corruption, "superblock CRC mismatch");
        }

        let format_version = decode_version([frame[4], frame[5], frame[6], frame[7]]);
        if let Some(expected) = expected_format_version {
            if !major_compatible(&format_version, expected) {
                return_errno_with_msg!(Errno::VersionMismatch, "superblock format version incompatible");
            }
        }

        let payload_len = u32::from_le_bytes([frame[14], frame[15], frame[16], frame[17]]) as usize;
        let group_uuid = Uuid::from_slice(&frame[18..34])
            .map_err(|e| Error::with_source(Errno::Corruption, e))?;
        let disk_uuid = Uuid::from_slice(&frame[34..50])
            .map_err(|e| Error::with_source(Errno::Corruption, e))?;
        let node_id = u32::from_le_bytes([frame[50], frame[51], frame[52], frame[53]]);
        let layout_tag = u32::from_le_bytes([frame[54], frame[55], frame[56], frame[57]]);

        let payload_bytes = frame
            .get(HEADER_LEN..HEADER_LEN + payload_len)
            .ok_or_else(|| Error::with_msg(Errno::Corruption, "payload_len exceeds frame size"))?;
        let payload: SuperblockPayload = postcard::from_bytes(payload_bytes)
            .map_err(|e| Error::with_source(Errno::Corruption, e))?;

        Ok(Self {
            format_version,
            group_uuid,
            disk_uuid,
            node_id,
            layout_tag,
            payload,
        })
    }
}

fn encode_version(v: &Version) -> [u8; 4] {
    let (major, minor) = v.get_major();
    let mut out = [0u8; 4];
    out[0..2].copy_from_slice(&(major as u16).to_le_bytes());
    out[2..4].copy_from_slice(&(minor as u16).to_le_bytes());
    out
}

fn decode_version(bytes: [u8; 4]) -> Version {
    let major = u16::from_le_bytes([bytes[0], bytes[1]]) as u32;
    let minor = u16::from_le_bytes([bytes[2], bytes[3]]) as u32;
    Version::new([major, minor])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Superblock {
        Superblock {
            format_version: Version::new([1, 0]),
            group_uuid: Uuid::from_u128(1),
            disk_uuid: Uuid::from_u128(2),
            node_id: 3,
            layout_tag: 7,
            payload: SuperblockPayload {
                generation: 42,
                group_name: "tank".to_string(),
                layout_params: vec![1, 2, 3],
                disk_roster: vec![Uuid::from_u128(2), Uuid::from_u128(5)],
            },
        }
    }

    #[test]
    fn encode_decode_round_trips() {
        let sb = sample();
        let frame = sb.encode().unwrap();
        let decoded = Superblock::decode(&frame, Some(&Version::new([1, 0]))).unwrap();
        assert_eq!(decoded, sb);
    }

    #[test]
    fn corrupted_byte_fails_crc() {
        let sb = sample();
        let mut frame = sb.encode().unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let err = Superblock::decode(&frame, None).unwrap_err();
        assert_eq!(err.errno(), Errno::Corruption);
    }

    #[test]
    fn incompatible_major_version_is_rejected() {
        let sb = sample();
        let frame = sb.encode().unwrap();
        let err = Superblock::decode(&frame, Some(&Version::new([2, 0]))).unwrap_err();
        assert_eq!(err.errno(), Errno::VersionMismatch);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let sb = sample();
        let mut frame = sb.encode().unwrap();
        frame[0] = b'!';
        let err = Superblock::decode(&frame, None).unwrap_err();
        assert_eq!(err.errno(), Errno::Corruption);
    }
}
