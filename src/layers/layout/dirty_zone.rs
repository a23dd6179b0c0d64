//! Per-slot dirty-zone tracking for rainX (§4.8): a bitmap of zones that
//! have been written since their last confirmed resync, latched to a
//! [`SyncTag`] generation so recovery can resync only what changed.

use crate::util::BitMap;

use super::synctag::{greater, inc, SyncTag};

/// Tracks which zones of one slot are dirty and the sync generation each
/// was last latched at.
pub struct DirtyZoneTracker {
    zone_size_sectors: u32,
    dirty: BitMap,
    tags: Vec<SyncTag>,
    current_generation: SyncTag,
}

impl DirtyZoneTracker {
    /// Builds a tracker covering `total_sectors` in zones of
    /// `zone_size_sectors`, all initially clean and unsynced (`Blank`).
    pub fn new(total_sectors: u64, zone_size_sectors: u32) -> Self {
        let zone_count = total_sectors.div_ceil(zone_size_sectors as u64) as usize;
        Self {
            zone_size_sectors,
            dirty: BitMap::repeat(false, zone_count.max(1)),
            tags: vec![SyncTag::BLANK; zone_count.max(1)],
            current_generation: SyncTag::ZERO,
        }
    }

    pub fn zone_size_sectors(&self) -> u32 {
        self.zone_size_sectors
    }

    pub fn zone_count(&self) -> usize {
        self.tags.len()
    }

    fn zone_of(&self, sector: u64) -> usize {
        (sector / self.zone_size_sectors as u64) as usize
    }

    /// Marks the zone containing `sector` dirty, ahead of the write that
    /// touches it.
    pub fn mark_dirty(&mut self, sector: u64) {
        let zone = self.zone_of(sector);
        self.dirty.set(zone, true);
    }

    /// Marks every zone touched by a write covering `len_sectors` sectors
    /// starting at `sector`.
    pub fn mark_dirty_range(&mut self, sector: u64, len_sectors: u64) {
        if len_sectors == 0 {
            return;
        }
        let start_zone = self.zone_of(sector);
        let end_zone = self.zone_of(sector + len_sectors - 1);
        for zone in start_zone..=end_zone {
            self.dirty.set(zone, true);
        }
    }

    /// Fraction of zones currently dirty, as `(dirty, total)`.
    pub fn dirty_zone_count(&self) -> usize {
        (0..self.zone_count()).filter(|&z| self.is_dirty(z)).count()
    }

    pub fn is_dirty(&self, zone: usize) -> bool {
        self.dirty.test_bit(zone)
    }

    /// Latches every currently-dirty zone to the current generation and
    /// advances it, batching what would otherwise be one metadata write per
    /// dirty sector into one write per latch call.
    pub fn latch(&mut self) {
        let generation = self.current_generation;
        for zone in 0..self.tags.len() {
            if self.dirty.test_bit(zone) {
                self.tags[zone] = generation;
            }
        }
        self.current_generation = inc(self.current_generation);
    }

    /// Zones that must be resynced to catch up to `known_good`: those
    /// latched at a generation no older than it, plus any zone that was
    /// never latched (`Blank`) — a zone with no recorded generation has
    /// never finished a sync and always needs one.
    pub fn zones_needing_resync(&self, known_good: SyncTag) -> Vec<usize> {
        self.tags
            .iter()
            .enumerate()
            .filter(|(_, tag)| match greater(**tag, known_good) {
                Some(is_newer) => is_newer,
                None => **tag != known_good,
            })
            .map(|(zone, _)| zone)
            .collect()
    }

    /// Marks `zone` as caught up (clears the dirty bit without touching its
    /// latched generation tag).
    pub fn clear(&mut self, zone: usize) {
        self.dirty.set(zone, false);
    }
}
