//! The disk (rdev) entity (§3): a physical backing for part of a group.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::layers::assembly::{ChunkAllocator, SlotCandidate, SpofGroupId};

/// A disk's administrative state, independent of any per-I/O errors it may
/// be reporting at the block-device layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskState {
    Up,
    Down,
    /// Still reachable but failing validation (e.g. a corrupted superblock).
    Corrupted,
}

/// A disk participating in a group: identity, placement, and its chunk
/// allocator. Owns its chunks; a slot references them by index, never by
/// pointer, so a disk can be inspected or resized independently of the
/// slots built on top of it.
pub struct Disk {
    uuid: Uuid,
    node_id: u32,
    sector_count: u64,
    state: DiskState,
    spof_group: SpofGroupId,
    index_in_group: usize,
    chunk_alloc: ChunkAllocator,
}

impl Disk {
    /// Creates a disk with `total_chunks` chunks of `chunk_size_sectors`
    /// sectors each, all initially free.
    pub fn new(
        uuid: Uuid,
        node_id: u32,
        sector_count: u64,
        spof_group: SpofGroupId,
        index_in_group: usize,
        chunk_size_sectors: u32,
        total_chunks: u32,
    ) -> Self {
        Self {
            uuid,
            node_id,
            sector_count,
            state: DiskState::Up,
            spof_group,
            index_in_group,
            chunk_alloc: ChunkAllocator::new(chunk_size_sectors, total_chunks),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn sector_count(&self) -> u64 {
        self.sector_count
    }

    pub fn state(&self) -> DiskState {
        self.state
    }

    pub fn is_up(&self) -> bool {
        self.state == DiskState::Up
    }

    pub fn set_state(&mut self, state: DiskState) {
        self.state = state;
    }

    pub fn index_in_group(&self) -> usize {
        self.index_in_group
    }

    pub fn chunk_allocator(&self) -> &ChunkAllocator {
        &self.chunk_alloc
    }
}

impl SlotCandidate for Disk {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn spof_group(&self) -> SpofGroupId {
        self.spof_group
    }

    fn chunk_allocator(&self) -> &ChunkAllocator {
        &self.chunk_alloc
    }
}
