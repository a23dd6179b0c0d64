//! Unmirrored striping (§4.8): `width = 1`, map is the identity.

use crate::layers::bio::IoOp;
use crate::prelude::*;

use super::{ChunkTarget, Layout};

pub struct SStriping {
    su_size_sectors: u32,
}

impl SStriping {
    pub fn new(su_size_sectors: u32) -> Self {
        Self { su_size_sectors }
    }
}

impl Layout for SStriping {
    fn name(&self) -> &'static str {
        "sstriping"
    }

    fn su_size_sectors(&self) -> u32 {
        self.su_size_sectors
    }

    fn width(&self) -> usize {
        1
    }

    fn redundancy(&self) -> usize {
        0
    }

    fn needs_dirty_zone(&self) -> bool {
        false
    }

    fn map(&self, offset_in_slot: u64, _op: IoOp) -> Result<Vec<ChunkTarget>> {
        Ok(vec![ChunkTarget {
            chunk_index: 0,
            sector_in_chunk: offset_in_slot,
        }])
    }
}
