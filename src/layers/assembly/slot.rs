//! SPOF-group-aware slot allocation (§4.7).
//!
//! A slot is one redundancy unit's worth of storage: a chunk on one disk.
//! Allocating the N slots of a stripe picks, among disks whose SPOF group
//! isn't already backing another slot of the same stripe, the one whose
//! group currently carries the least allocated capacity — so load spreads
//! evenly across SPOF groups instead of draining them in disk-index order.
//! Ties are broken by SPOF-group id, then disk UUID, so allocation is
//! deterministic given the same disk list and exclusion set.

use uuid::Uuid;

use super::chunk_alloc::ChunkAllocator;
use super::spof::SpofGroupId;
use crate::prelude::*;

/// One allocated redundancy unit: a chunk on a specific disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub disk_index: usize,
    pub chunk_index: u32,
}

/// A disk as seen by the slot allocator — just enough to place a slot on it.
pub trait SlotCandidate {
    fn uuid(&self) -> Uuid;
    fn spof_group(&self) -> SpofGroupId;
    fn chunk_allocator(&self) -> &ChunkAllocator;
}

/// Picks a disk from a SPOF group not in `excluded_groups`, favoring the
/// group with the least chunks already allocated across all its disks.
///
/// Fails `LayoutConstraintsInfringed` when fewer than one more distinct SPOF
/// group exists among `disks` beyond `excluded_groups` — a topology that can
/// never satisfy the requested width no matter how much free space remains.
/// Fails `NotEnoughDevices` when such a group exists but every disk in it
/// (and every other eligible group) is out of free chunks — a capacity
/// problem, not a topology one.
pub fn allocate_slot<D: SlotCandidate>(
    disks: &[D],
    excluded_groups: &[SpofGroupId],
) -> Result<Slot> {
    let mut group_usage: BTreeMap<SpofGroupId, u64> = BTreeMap::new();
    for disk in disks {
        let alloc = disk.chunk_allocator();
        let used = (alloc.total_chunks_count() - alloc.free_chunks_count()) as u64;
        *group_usage.entry(disk.spof_group()).or_insert(0) += used;
    }

    let another_group_exists = disks
        .iter()
        .any(|d| !excluded_groups.contains(&d.spof_group()));

    let best = disks
        .iter()
        .enumerate()
        .filter(|(_, disk)| {
            !excluded_groups.contains(&disk.spof_group())
                && disk.chunk_allocator().free_chunks_count() > 0
        })
        .min_by(|(_, a), (_, b)| {
            group_usage[&a.spof_group()]
                .cmp(&group_usage[&b.spof_group()])
                .then_with(|| a.spof_group().cmp(&b.spof_group()))
                .then_with(|| a.uuid().cmp(&b.uuid()))
        });

    let Some((disk_index, disk)) = best else {
        if another_group_exists {
            return_errno_with_msg!(
                Errno::NotEnoughDevices,
                "every disk outside the excluded SPOF groups is out of free chunks"
            );
        }
        return_errno_with_msg!(
            Errno::LayoutConstraintsInfringed,
            "not enough distinct SPOF groups remain for the requested width"
        );
    };

    let chunk_index = disk.chunk_allocator().allocate()?;
    Ok(Slot {
        disk_index,
        chunk_index,
    })
}

/// Returns a slot's chunk to its disk's allocator.
///
/// # Panics
///
/// Panics if `slot.disk_index` is out of range for `disks`.
pub fn release_slot<D: SlotCandidate>(disks: &[D], slot: Slot) {
    disks[slot.disk_index]
        .chunk_allocator()
        .release(slot.chunk_index);
}
