//! The group (§3 "Group"): top-level container owning a set of disks and
//! the volumes assembled from them, gluing the assembly (C7), layout (C8),
//! and volume (C9) layers together behind one administrative handle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::disk::Disk;
use crate::layers::assembly::AssemblyVolume;
use crate::layers::bio::{AccessMode, BlockDevice};
use crate::layers::layout::{Layout, Rain1, RainX, SStriping};
use crate::layers::volume::Volume;
use crate::os::Mutex;
use crate::prelude::*;

/// Which layout a group's volumes are mapped through (§3/§4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutKind {
    SStriping,
    Rain1,
    RainX,
}

/// A group's administrative lifecycle state (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupState {
    Stopped,
    Started,
    Offline,
    Degraded,
    Rebuilding,
}

struct VolumeEntry {
    name: String,
    volume: Arc<Volume>,
    assembly: Arc<AssemblyVolume>,
}

/// A cluster of disks managed under one layout, plus the volumes built on
/// top of them.
pub struct Group {
    uuid: Uuid,
    name: String,
    layout_kind: LayoutKind,
    slot_width: usize,
    su_size_sectors: u32,
    chunk_size_sectors: u32,
    data_start_sector: u64,
    disks: Vec<Disk>,
    backings: Vec<Arc<dyn BlockDevice>>,
    volumes: Mutex<HashMap<Uuid, VolumeEntry>>,
    state: Mutex<GroupState>,
    administrable: bool,
}

impl Group {
    /// Creates a stopped group over `disks`/`backings` (index-aligned: slot
    /// placement references a disk by its position in both vectors).
    pub fn new(
        uuid: Uuid,
        name: String,
        layout_kind: LayoutKind,
        slot_width: usize,
        su_size_sectors: u32,
        chunk_size_sectors: u32,
        data_start_sector: u64,
        disks: Vec<Disk>,
        backings: Vec<Arc<dyn BlockDevice>>,
    ) -> Result<Self> {
        if disks.len() != backings.len() {
            return_errno_with_msg!(Errno::Invalid, "each disk needs exactly one backing device");
        }
        if slot_width < 1 {
            return_errno_with_msg!(Errno::Invalid, "a group needs at least one slot per position");
        }
        if layout_kind == LayoutKind::RainX && slot_width < 3 {
            return_errno_with_msg!(Errno::Invalid, "rainX needs a slot width of at least 3");
        }
        if !su_size_sectors.is_power_of_two() {
            return_errno_with_msg!(Errno::Invalid, "the striping-unit size must be a power of two");
        }
        Ok(Self {
            uuid,
            name,
            layout_kind,
            slot_width,
            su_size_sectors,
            chunk_size_sectors,
            data_start_sector,
            disks,
            backings,
            volumes: Mutex::new(HashMap::new()),
            state: Mutex::new(GroupState::Stopped),
            administrable: true,
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> GroupState {
        *self.state.lock()
    }

    pub fn disk_count(&self) -> usize {
        self.disks.len()
    }

    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    pub fn is_administrable(&self) -> bool {
        self.administrable
    }

    fn build_layout(&self) -> Arc<dyn Layout> {
        match self.layout_kind {
            LayoutKind::SStriping => Arc::new(SStriping::new(self.su_size_sectors)),
            LayoutKind::Rain1 => Arc::new(Rain1::new(self.su_size_sectors)),
            LayoutKind::RainX => Arc::new(RainX::new(self.su_size_sectors, self.slot_width)),
        }
    }

    fn logical_capacity_per_slot(&self, layout: &Arc<dyn Layout>) -> u64 {
        (layout.width() - layout.redundancy()) as u64 * self.chunk_size_sectors as u64
    }

    /// Starts the group, making its volumes available for I/O.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == GroupState::Offline {
            return_errno_with_msg!(Errno::Invalid, "an offline group cannot be started directly");
        }
        *state = GroupState::Started;
        Ok(())
    }

    /// Stops the group. Resize and delete operations require this state.
    /// Latches every volume's dirty zones first, so a rainX rebuild
    /// resumes from the persisted tags instead of resyncing from scratch
    /// (§4.8).
    pub fn stop(&self) -> Result<()> {
        for entry in self.volumes.lock().values() {
            entry.volume.latch_dirty_zones();
        }
        *self.state.lock() = GroupState::Stopped;
        Ok(())
    }

    /// Creates a volume with `size_sectors` logical sectors, allocating
    /// however many assembly positions it takes to cover that size.
    pub fn create_volume(&self, name: String, size_sectors: u64) -> Result<Uuid> {
        let layout = self.build_layout();
        let slot_capacity = self.logical_capacity_per_slot(&layout);
        let positions = size_sectors.div_ceil(slot_capacity) as usize;

        let assembly = Arc::new(AssemblyVolume::new(self.slot_width));
        assembly.grow(&self.disks, positions)?;

        let volume = Arc::new(Volume::new(
            layout,
            assembly.clone(),
            self.backings.clone(),
            self.chunk_size_sectors,
            self.data_start_sector,
            size_sectors,
            AccessMode::ReadWrite,
            crate::config::ClusterConfig::default().aggregator_pool_capacity,
            crate::config::ClusterConfig::default().dirty_zone_size_sectors,
        )?);

        let uuid = Uuid::new_v4();
        self.volumes.lock().insert(
            uuid,
            VolumeEntry {
                name,
                volume,
                assembly,
            },
        );
        Ok(uuid)
    }

    /// Deletes a volume, releasing its assembly positions back to the
    /// disks that held them.
    pub fn delete_volume(&self, uuid: Uuid) -> Result<()> {
        let entry = self
            .volumes
            .lock()
            .remove(&uuid)
            .ok_or_else(|| Error::with_msg(Errno::NotFound, "no such volume in this group"))?;
        entry.volume.close()?;
        let position_count = entry.assembly.position_count();
        entry.assembly.shrink(&self.disks, position_count)
    }

    /// Resizes a volume to `new_size_sectors`. Only valid while the group
    /// is stopped (§4.9: the volume size is frozen during I/O).
    pub fn resize_volume(&self, uuid: Uuid, new_size_sectors: u64) -> Result<()> {
        if self.state() != GroupState::Stopped {
            return_errno_with_msg!(Errno::Invalid, "resize requires a stopped group");
        }
        let volumes = self.volumes.lock();
        let entry = volumes
            .get(&uuid)
            .ok_or_else(|| Error::with_msg(Errno::NotFound, "no such volume in this group"))?;

        let layout = self.build_layout();
        let slot_capacity = self.logical_capacity_per_slot(&layout);
        let wanted_positions = new_size_sectors.div_ceil(slot_capacity) as usize;
        let current_positions = entry.assembly.position_count();

        if wanted_positions > current_positions {
            entry
                .assembly
                .grow(&self.disks, wanted_positions - current_positions)?;
        } else if wanted_positions < current_positions {
            entry
                .assembly
                .shrink(&self.disks, current_positions - wanted_positions)?;
        }
        entry.volume.set_size_sectors(new_size_sectors)
    }

    /// Looks up a volume by UUID.
    pub fn volume(&self, uuid: Uuid) -> Option<Arc<Volume>> {
        self.volumes.lock().get(&uuid).map(|e| e.volume.clone())
    }

    /// The name and UUID of every volume currently in this group.
    pub fn volume_names(&self) -> Vec<(Uuid, String)> {
        self.volumes
            .lock()
            .iter()
            .map(|(uuid, e)| (*uuid, e.name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::assembly::SpofGroupId;
    use crate::layers::bio::MemDisk;

    fn two_disk_group(layout_kind: LayoutKind, slot_width: usize) -> Group {
        let disks = vec![
            Disk::new(Uuid::from_u128(1), 0, 4096, SpofGroupId::new(1), 0, 16, 8),
            Disk::new(Uuid::from_u128(2), 0, 4096, SpofGroupId::new(2), 0, 16, 8),
        ];
        let backings: Vec<Arc<dyn BlockDevice>> = vec![
            Arc::new(MemDisk::new(4096, AccessMode::ReadWrite)),
            Arc::new(MemDisk::new(4096, AccessMode::ReadWrite)),
        ];
        Group::new(
            Uuid::from_u128(100),
            "g0".into(),
            layout_kind,
            slot_width,
            4,
            16,
            0,
            disks,
            backings,
        )
        .unwrap()
    }

    #[test]
    fn create_write_read_round_trips() {
        let group = two_disk_group(LayoutKind::Rain1, 2);
        let vol_uuid = group.create_volume("v0".into(), 32).unwrap();
        let volume = group.volume(vol_uuid).unwrap();
        let data = vec![0x5Au8; 512];
        volume.write(0, &data).unwrap();
        let mut out = vec![0u8; 512];
        volume.read(0, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn delete_volume_frees_its_chunks() {
        let group = two_disk_group(LayoutKind::SStriping, 1);
        let before: Vec<u32> = group
            .disks
            .iter()
            .map(|d| d.chunk_allocator().free_chunks_count())
            .collect();
        let vol_uuid = group.create_volume("v0".into(), 16).unwrap();
        group.delete_volume(vol_uuid).unwrap();
        let after: Vec<u32> = group
            .disks
            .iter()
            .map(|d| d.chunk_allocator().free_chunks_count())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn resize_requires_a_stopped_group() {
        let group = two_disk_group(LayoutKind::SStriping, 1);
        let vol_uuid = group.create_volume("v0".into(), 16).unwrap();
        group.start().unwrap();
        let err = group.resize_volume(vol_uuid, 32).unwrap_err();
        assert_eq!(err.errno(), Errno::Invalid);
    }
}
