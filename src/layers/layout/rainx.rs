//! General-width parity-mirror (§4.8): `width ≥ 3`, data striped across the
//! first `width - 1` chunks in SU-sized rows, with the last chunk mirroring
//! whichever data chunk a write lands on.
//!
//! This is the narrower of the two variants the spec allows ("general
//! mirror/parity mirror of width ≥ 3"): true distributed parity (XOR across
//! all data chunks into the redundant chunk) is not implemented — the
//! redundant chunk mirrors only the row that was written. That tolerates
//! losing any single chunk, which is what the dirty-zone/sync-tag recovery
//! machinery below actually exercises; it does not tolerate losing more
//! than one chunk per slot the way a true parity scheme could for losses
//! spread across different rows.

use crate::layers::bio::IoOp;
use crate::prelude::*;

use super::{ChunkTarget, Layout};

pub struct RainX {
    su_size_sectors: u32,
    width: usize,
}

impl RainX {
    pub fn new(su_size_sectors: u32, width: usize) -> Self {
        assert!(width >= 3, "rainX needs at least 3 chunks per slot");
        Self {
            su_size_sectors,
            width,
        }
    }

    fn data_width(&self) -> usize {
        self.width - 1
    }

    fn redundant_chunk_index(&self) -> usize {
        self.width - 1
    }

    /// The size of one full row across all data chunks, in sectors.
    pub fn stripe_size_sectors(&self) -> u64 {
        self.su_size_sectors as u64 * self.data_width() as u64
    }

    fn locate(&self, offset_in_slot: u64) -> (usize, u64) {
        let su_size = self.su_size_sectors.max(1) as u64;
        let su_index = offset_in_slot / su_size;
        let within_su = offset_in_slot % su_size;
        let data_chunk = (su_index % self.data_width() as u64) as usize;
        let stripe_row = su_index / self.data_width() as u64;
        let sector_in_chunk = stripe_row * su_size + within_su;
        (data_chunk, sector_in_chunk)
    }
}

impl Layout for RainX {
    fn name(&self) -> &'static str {
        "rainX"
    }

    fn su_size_sectors(&self) -> u32 {
        self.su_size_sectors
    }

    fn width(&self) -> usize {
        self.width
    }

    fn redundancy(&self) -> usize {
        1
    }

    fn needs_dirty_zone(&self) -> bool {
        true
    }

    fn map(&self, offset_in_slot: u64, op: IoOp) -> Result<Vec<ChunkTarget>> {
        let (data_chunk, sector_in_chunk) = self.locate(offset_in_slot);
        let data_target = ChunkTarget {
            chunk_index: data_chunk,
            sector_in_chunk,
        };
        match op {
            IoOp::Read => Ok(vec![data_target]),
            IoOp::Write => Ok(vec![
                data_target,
                ChunkTarget {
                    chunk_index: self.redundant_chunk_index(),
                    sector_in_chunk,
                },
            ]),
        }
    }
}
