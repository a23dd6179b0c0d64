//! Volume-as-block-device (C9): an exported logical volume backed by an
//! assembly volume and a layout, exposing the same [`BlockDevice`] contract
//! every other backing does.

mod aggregator;
mod splitter;

pub use aggregator::SplitAggregator;
pub use splitter::split_range;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::SECTOR_SIZE;
use crate::layers::assembly::AssemblyVolume;
use crate::layers::bio::{AccessMode, BlockDevice, BoundedPool, Io, IoOp, SubmittedIo};
use crate::layers::layout::{DirtyZoneTracker, Layout};
use crate::os::Mutex;
use crate::prelude::*;

/// A logical volume exported as a block device. Splits I/O at striping-unit
/// boundaries, maps each sub-range through the group's layout, and
/// dispatches to the disks backing the assembly volume's slots.
pub struct Volume {
    layout: Arc<dyn Layout>,
    assembly: Arc<AssemblyVolume>,
    disks: Vec<Arc<dyn BlockDevice>>,
    chunk_size_sectors: u32,
    data_start_sector: u64,
    size_sectors: AtomicU64,
    access_mode: AccessMode,
    closed: AtomicBool,
    /// Bounded pool of split-I/O completion aggregators (§4.9;
    /// `ClusterConfig::aggregator_pool_capacity`); a full pool blocks
    /// `enqueue` instead of growing unbounded.
    aggregator_pool: Arc<BoundedPool<()>>,
    /// Zone size for rainX dirty-zone tracking (§4.8); unused by layouts
    /// that don't need it.
    dirty_zone_size_sectors: u32,
    /// One dirty-zone tracker per assembly position, created the first time
    /// a write lands on that position. Only populated when
    /// `layout.needs_dirty_zone()`.
    dirty_zones: Mutex<HashMap<usize, DirtyZoneTracker>>,
}

impl Volume {
    pub fn new(
        layout: Arc<dyn Layout>,
        assembly: Arc<AssemblyVolume>,
        disks: Vec<Arc<dyn BlockDevice>>,
        chunk_size_sectors: u32,
        data_start_sector: u64,
        size_sectors: u64,
        access_mode: AccessMode,
        aggregator_pool_capacity: usize,
        dirty_zone_size_sectors: u32,
    ) -> Result<Self> {
        let capacity = Self::capacity_sectors(&layout, &assembly, chunk_size_sectors);
        if size_sectors > capacity {
            return_errno_with_msg!(
                Errno::Invalid,
                "volume size exceeds its assembly volume's capacity"
            );
        }
        Ok(Self {
            layout,
            assembly,
            disks,
            chunk_size_sectors,
            data_start_sector,
            size_sectors: AtomicU64::new(size_sectors),
            access_mode,
            closed: AtomicBool::new(false),
            aggregator_pool: Arc::new(BoundedPool::new(vec![(); aggregator_pool_capacity.max(1)], 0)),
            dirty_zone_size_sectors: dirty_zone_size_sectors.max(1),
            dirty_zones: Mutex::new(HashMap::new()),
        })
    }

    fn capacity_sectors(layout: &Arc<dyn Layout>, assembly: &AssemblyVolume, chunk_size_sectors: u32) -> u64 {
        let data_chunks = (layout.width() - layout.redundancy()) as u64;
        data_chunks * chunk_size_sectors as u64 * assembly.position_count() as u64
    }

    fn logical_capacity_per_slot(&self) -> u64 {
        let data_chunks = (self.layout.width() - self.layout.redundancy()) as u64;
        data_chunks * self.chunk_size_sectors as u64
    }

    /// Resizes the logical size. Only valid while the volume is quiescent
    /// (no I/O outstanding); callers serialize this against `enqueue`
    /// themselves (the group is stopped, per §4.9).
    pub fn set_size_sectors(&self, n: u64) -> Result<()> {
        let capacity = Self::capacity_sectors(&self.layout, &self.assembly, self.chunk_size_sectors);
        if n > capacity {
            return_errno_with_msg!(Errno::Invalid, "requested size exceeds assembly capacity");
        }
        self.size_sectors.store(n, Ordering::Release);
        Ok(())
    }

    fn physical_target(&self, position: usize, chunk_index: usize, sector_in_chunk: u64) -> Result<(Arc<dyn BlockDevice>, u64)> {
        let slots = self
            .assembly
            .slots_at(position)
            .ok_or_else(|| Error::with_msg(Errno::Invalid, "volume offset maps past the assembly volume"))?;
        let slot = slots
            .get(chunk_index)
            .ok_or_else(|| Error::with_msg(Errno::Internal, "layout chunk_index out of range for slot width"))?;
        let disk = self
            .disks
            .get(slot.disk_index)
            .ok_or_else(|| Error::with_msg(Errno::Internal, "slot references an unknown disk index"))?
            .clone();
        let physical_sector = self.data_start_sector
            + slot.chunk_index as u64 * self.chunk_size_sectors as u64
            + sector_in_chunk;
        Ok((disk, physical_sector))
    }

    /// Marks the dirty zone(s) covering `[offset_in_slot, offset_in_slot +
    /// len_sectors)` of `position`, ahead of the write that touches them
    /// (§4.8). No-op for layouts that don't need dirty-zone tracking.
    fn mark_dirty_zone(&self, position: usize, offset_in_slot: u64, len_sectors: u64) {
        if !self.layout.needs_dirty_zone() {
            return;
        }
        let total_sectors = self.logical_capacity_per_slot();
        let mut zones = self.dirty_zones.lock();
        zones
            .entry(position)
            .or_insert_with(|| DirtyZoneTracker::new(total_sectors, self.dirty_zone_size_sectors))
            .mark_dirty_range(offset_in_slot, len_sectors);
    }

    /// Latches every tracked dirty zone to its current sync generation, so
    /// recovery after a stop resumes from the persisted tags instead of
    /// resyncing everything (§4.8).
    pub fn latch_dirty_zones(&self) {
        for tracker in self.dirty_zones.lock().values_mut() {
            tracker.latch();
        }
    }

    /// Percentage of tracked zones already in sync, or `None` if this
    /// layout doesn't track dirty zones or nothing has been written yet.
    /// Present only while at least one zone is dirty, mirroring a rebuild
    /// actually in progress.
    pub fn rebuild_progress_percent(&self) -> Option<u8> {
        if !self.layout.needs_dirty_zone() {
            return None;
        }
        let zones = self.dirty_zones.lock();
        let (dirty, total) = zones
            .values()
            .fold((0usize, 0usize), |(dirty, total), tracker| {
                (dirty + tracker.dirty_zone_count(), total + tracker.zone_count())
            });
        if total == 0 || dirty == 0 {
            return None;
        }
        Some((100 - (dirty * 100 / total).min(100)) as u8)
    }
}

impl BlockDevice for Volume {
    fn name(&self) -> &str {
        "volume"
    }

    fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    fn sector_count(&self) -> u64 {
        self.size_sectors.load(Ordering::Acquire)
    }

    fn set_sector_count(&self, n: u64) -> Result<()> {
        self.set_size_sectors(n)
    }

    fn enqueue(&self, io: SubmittedIo) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return_errno_with_msg!(Errno::Invalid, "volume is closed");
        }
        if io.op() == IoOp::Write && !self.access_mode.allows_write() {
            return_errno_with_msg!(Errno::Invalid, "write to a read-only volume");
        }

        let sector_size = SECTOR_SIZE as u64;
        let start_sector = io.start_sector();
        let len_bytes = io.len_bytes();
        if len_bytes % SECTOR_SIZE != 0 {
            return_errno_with_msg!(Errno::Invalid, "I/O length is not sector-aligned");
        }
        let len_sectors = len_bytes as u64 / sector_size;

        let frozen_size = self.size_sectors.load(Ordering::Acquire);
        if start_sector + len_sectors > frozen_size {
            return_errno_with_msg!(Errno::Invalid, "I/O range exceeds the volume's current size");
        }

        let sub_ranges = splitter::split_range(start_sector, len_sectors, self.layout.su_size_sectors());
        if sub_ranges.is_empty() {
            io.complete(Ok(()));
            return Ok(());
        }

        let slot_capacity = self.logical_capacity_per_slot();
        let write_data = io.write_data().map(<[u8]>::to_vec);

        // Every target produced for every sub-range; counted up front so the
        // aggregator knows exactly how many completions to expect.
        let mut plans = Vec::new();
        for (sub_start, sub_len) in &sub_ranges {
            let position = (sub_start / slot_capacity) as usize;
            let offset_in_slot = sub_start % slot_capacity;
            if io.op() == IoOp::Write {
                self.mark_dirty_zone(position, offset_in_slot, *sub_len);
            }
            let targets = self.layout.map(offset_in_slot, io.op())?;
            for target in targets {
                let (disk, physical_sector) =
                    self.physical_target(position, target.chunk_index, target.sector_in_chunk)?;
                plans.push((disk, physical_sector, *sub_start - start_sector, *sub_len));
            }
        }

        let aggregator = SplitAggregator::new(io, plans.len(), self.aggregator_pool.clone())?;
        for (disk, physical_sector, byte_offset_in_parent, sub_len_sectors) in plans {
            let sub_len_bytes = sub_len_sectors as usize * SECTOR_SIZE;
            let byte_offset = byte_offset_in_parent as usize * SECTOR_SIZE;
            let aggregator = aggregator.clone();

            match &write_data {
                Some(data) => {
                    let sub_data = Arc::new(data[byte_offset..byte_offset + sub_len_bytes].to_vec());
                    let sub_io = Io::new_write(physical_sector, sub_data, false, false, 0)
                        .with_complete_fn(move |sub: &SubmittedIo| {
                            aggregator.complete_one(sub.result());
                        });
                    sub_io.submit(disk.as_ref())?;
                }
                None => {
                    let (sub_io, sub_buf) = Io::new_read(physical_sector, sub_len_bytes, false, false, 0);
                    let aggregator_for_fill = aggregator.clone();
                    let sub_io = sub_io.with_complete_fn(move |sub: &SubmittedIo| {
                        aggregator.complete_one(sub.result());
                    });
                    sub_io.submit(disk.as_ref())?;
                    // The reference backings complete synchronously inside
                    // `submit`, so the read data is already in `sub_buf`;
                    // fold it into the parent buffer before moving on.
                    let data = sub_buf.lock().clone();
                    aggregator_for_fill.fill_read_range(byte_offset, &data);
                }
            }
        }

        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
