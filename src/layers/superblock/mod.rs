//! Superblock persistence (C6): write/read the two on-disk copies described
//! by [`format`], applying the generation-counter tiebreak on read.

mod format;

pub use format::{Superblock, SuperblockPayload, HEADER_LEN, MAGIC};

use crate::config::{ClusterConfig, SECTOR_SIZE};
use crate::layers::bio::{AccessMode, BlockDevice};
use crate::layers::stream::BlockStream;
use crate::prelude::*;
use crate::version::Version;
use uuid::Uuid;

/// Serializes `sb`, writes it to both superblock offsets named by `config`,
/// and flushes the device.
pub fn write(device: &dyn BlockDevice, config: &ClusterConfig, sb: &Superblock) -> Result<()> {
    let frame = sb.encode()?;
    if frame.len() as u64 > config.superblock_size_sectors * SECTOR_SIZE as u64 {
        return_errno_with_msg!(Errno::Invalid, "superblock frame exceeds its reserved region");
    }

    let mut stream = BlockStream::open(device, AccessMode::ReadWrite, 1)?;
    for offset in [config.superblock_offset_a, config.superblock_offset_b] {
        stream.seek((offset * SECTOR_SIZE as u64) as i64, 0)?;
        stream.write(&frame)?;
    }
    stream.flush()
}

/// Reads both superblock copies, validates each independently, and returns
/// the one with the higher generation counter when both are valid.
/// `expected_group`, if given, rejects a superblock belonging to a
/// different group.
pub fn read(
    device: &dyn BlockDevice,
    config: &ClusterConfig,
    expected_format_version: Option<&Version>,
    expected_group: Option<Uuid>,
) -> Result<Superblock> {
    let region_len = (config.superblock_size_sectors * SECTOR_SIZE as u64) as usize;
    let mut stream = BlockStream::open(device, AccessMode::Read, 1)?;

    let mut read_copy = |offset: u64| -> Result<Option<Superblock>> {
        stream.seek((offset * SECTOR_SIZE as u64) as i64, 0)?;
        let mut buf = vec![0u8; region_len];
        stream.read(&mut buf)?;
        Ok(Superblock::decode(&buf, expected_format_version).ok())
    };

    let a = read_copy(config.superblock_offset_a)?;
    let b = read_copy(config.superblock_offset_b)?;

    let sb = match (a, b) {
        (Some(a), Some(b)) => {
            if a.payload.generation >= b.payload.generation {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => {
            return_errno_with_msg!(
                Errno::Corruption,
                "neither superblock copy is valid"
            )
        }
    };

    if let Some(expected) = expected_group {
        if sb.group_uuid != expected {
            return_errno_with_msg!(
                Errno::UuidMismatch,
                "superblock belongs to a different group"
            );
        }
    }

    Ok(sb)
}
