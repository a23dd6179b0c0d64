//! Two-way mirror (§4.8): reads load-balance across replicas, writes touch
//! both.

use crate::layers::bio::IoOp;
use crate::prelude::*;

use super::{ChunkTarget, Layout};

pub struct Rain1 {
    su_size_sectors: u32,
}

impl Rain1 {
    pub fn new(su_size_sectors: u32) -> Self {
        Self { su_size_sectors }
    }

    /// Picks a replica for a read by hashing the sector, spreading read
    /// load across both copies instead of always favoring replica 0.
    fn read_replica(&self, sector: u64) -> usize {
        (sector / self.su_size_sectors.max(1) as u64 % 2) as usize
    }
}

impl Layout for Rain1 {
    fn name(&self) -> &'static str {
        "rain1"
    }

    fn su_size_sectors(&self) -> u32 {
        self.su_size_sectors
    }

    fn width(&self) -> usize {
        2
    }

    fn redundancy(&self) -> usize {
        1
    }

    fn needs_dirty_zone(&self) -> bool {
        false
    }

    fn map(&self, offset_in_slot: u64, op: IoOp) -> Result<Vec<ChunkTarget>> {
        match op {
            IoOp::Read => Ok(vec![ChunkTarget {
                chunk_index: self.read_replica(offset_in_slot),
                sector_in_chunk: offset_in_slot,
            }]),
            IoOp::Write => Ok((0..2)
                .map(|chunk_index| ChunkTarget {
                    chunk_index,
                    sector_in_chunk: offset_in_slot,
                })
                .collect()),
        }
    }
}
