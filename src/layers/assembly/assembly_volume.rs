//! Per-volume slot array with grow/shrink resize (§4.7).

use crate::os::Mutex;
use crate::prelude::*;

use super::slot::{allocate_slot, release_slot, Slot, SlotCandidate};

/// The ordered array of redundancy-unit positions backing one volume.
/// Each position holds `width` slots (1 for unmirrored striping, 2 for a
/// mirror, N for a parity-mirror group); layout (C8) maps a volume offset
/// to a position and reads/writes `width` slots there.
///
/// Resize is serialized by `resize_lock`: only one grow or shrink may be in
/// flight for a given volume at a time, matching the "at most one resize
/// per volume" rule.
pub struct AssemblyVolume {
    width: usize,
    positions: Mutex<Vec<Vec<Slot>>>,
    resize_lock: Mutex<()>,
}

impl AssemblyVolume {
    /// Creates an empty volume with the given redundancy width.
    pub fn new(width: usize) -> Self {
        assert!(width >= 1, "a volume needs at least one slot per position");
        Self {
            width,
            positions: Mutex::new(Vec::new()),
            resize_lock: Mutex::new(()),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn position_count(&self) -> usize {
        self.positions.lock().len()
    }

    /// The `width` slots backing `position`, or `None` if out of range.
    pub fn slots_at(&self, position: usize) -> Option<Vec<Slot>> {
        self.positions.lock().get(position).cloned()
    }

    /// Appends `additional_positions` new positions, each allocated from
    /// disjoint SPOF groups across its `width` slots. Fails
    /// `LayoutConstraintsInfringed` or `NotEnoughDevices` (see
    /// `allocate_slot`) and rolls back everything allocated by this call if
    /// any position cannot be fully placed.
    pub fn grow<D: SlotCandidate>(&self, disks: &[D], additional_positions: usize) -> Result<()> {
        let _serialize = self.resize_lock.lock();
        let mut positions = self.positions.lock();

        let mut grown: Vec<Vec<Slot>> = Vec::with_capacity(additional_positions);
        for _ in 0..additional_positions {
            let mut excluded = Vec::with_capacity(self.width);
            let mut slots = Vec::with_capacity(self.width);
            let mut failure = None;
            for _ in 0..self.width {
                match allocate_slot(disks, &excluded) {
                    Ok(slot) => {
                        excluded.push(disks[slot.disk_index].spof_group());
                        slots.push(slot);
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = failure {
                for slot in slots {
                    release_slot(disks, slot);
                }
                for position in grown {
                    for slot in position {
                        release_slot(disks, slot);
                    }
                }
                return Err(e);
            }
            grown.push(slots);
        }

        positions.extend(grown);
        Ok(())
    }

    /// Removes `remove_positions` trailing positions, releasing their slots
    /// back to the disks that held them. Fails `Invalid` if that would take
    /// the volume below zero positions.
    pub fn shrink<D: SlotCandidate>(&self, disks: &[D], remove_positions: usize) -> Result<()> {
        let _serialize = self.resize_lock.lock();
        let mut positions = self.positions.lock();

        if remove_positions > positions.len() {
            return_errno_with_msg!(Errno::Invalid, "cannot shrink a volume below zero positions");
        }
        for _ in 0..remove_positions {
            let Some(slots) = positions.pop() else {
                break;
            };
            for slot in slots {
                release_slot(disks, slot);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::assembly::chunk_alloc::ChunkAllocator;
    use crate::layers::assembly::spof::SpofGroupId;

    struct FakeDisk {
        id: u128,
        group: SpofGroupId,
        alloc: ChunkAllocator,
    }
    impl SlotCandidate for FakeDisk {
        fn uuid(&self) -> uuid::Uuid {
            uuid::Uuid::from_u128(self.id)
        }
        fn spof_group(&self) -> SpofGroupId {
            self.group
        }
        fn chunk_allocator(&self) -> &ChunkAllocator {
            &self.alloc
        }
    }

    fn disks() -> Vec<FakeDisk> {
        vec![
            FakeDisk {
                id: 1,
                group: SpofGroupId::new(1),
                alloc: ChunkAllocator::new(512, 4),
            },
            FakeDisk {
                id: 2,
                group: SpofGroupId::new(2),
                alloc: ChunkAllocator::new(512, 4),
            },
        ]
    }

    #[test]
    fn grow_then_shrink_returns_to_empty() {
        let disks = disks();
        let volume = AssemblyVolume::new(2);
        volume.grow(&disks, 3).unwrap();
        assert_eq!(volume.position_count(), 3);
        volume.shrink(&disks, 3).unwrap();
        assert_eq!(volume.position_count(), 0);
        for d in &disks {
            assert_eq!(d.alloc.free_chunks_count(), d.alloc.total_chunks_count());
        }
    }

    #[test]
    fn grow_rolls_back_on_partial_failure() {
        let disks = disks();
        let volume = AssemblyVolume::new(2);
        // Each position needs 2 disjoint SPOF groups; there are only 2 disks
        // with 4 chunks each, so the 5th position (9th/10th slot overall)
        // cannot be placed. Both SPOF groups still exist, so this is a
        // capacity failure, not a topology one, and the whole grow call
        // must roll back.
        let err = volume.grow(&disks, 5).unwrap_err();
        assert_eq!(err.errno(), Errno::NotEnoughDevices);
        assert_eq!(volume.position_count(), 0);
        for d in &disks {
            assert_eq!(d.alloc.free_chunks_count(), d.alloc.total_chunks_count());
        }
    }

    #[test]
    fn shrink_past_zero_fails_invalid() {
        let disks = disks();
        let volume = AssemblyVolume::new(1);
        volume.grow(&disks, 1).unwrap();
        let err = volume.shrink(&disks, 2).unwrap_err();
        assert_eq!(err.errno(), Errno::Invalid);
    }
}
