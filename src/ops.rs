//! The typed request/status surface an external CLI/admind process drives
//! the core through (§6.1). Plain, `serde`-serializable structs and enums —
//! ambient plumbing, not a feature of their own: the crate never parses
//! these off a wire itself, it only owns the types so an outer transport
//! can carry them without the core depending on that transport.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::disk::DiskState;
use crate::group::{Group, GroupState, LayoutKind};
use crate::layers::bio::BlockDevice;

/// Parameters for creating a group (§6: "create-group").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub uuid: Uuid,
    pub name: String,
    pub layout: LayoutKind,
    pub slot_width: usize,
    pub su_size_sectors: u32,
    pub chunk_size_sectors: u32,
    pub disk_uuids: Vec<Uuid>,
}

/// Parameters for creating a volume within an existing group
/// (§6: "create-volume").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    pub group: Uuid,
    pub name: String,
    pub size_sectors: u64,
}

/// A raw PR message to inject into a running protocol instance, bypassing
/// the transport (§6: "inject-message (for tests)").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InjectMessageRequest {
    pub target_node: u8,
    pub frame: Vec<u8>,
}

/// The admind-facing typed request surface (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    CreateGroup(CreateGroupRequest),
    DeleteGroup { group: Uuid },
    StartGroup { group: Uuid },
    StopGroup { group: Uuid },
    CreateVolume(CreateVolumeRequest),
    DeleteVolume { group: Uuid, volume: Uuid },
    ResizeVolume { group: Uuid, volume: Uuid, new_size_sectors: u64 },
    ReadSuperblock { disk: Uuid },
    WriteSuperblock { disk: Uuid },
    InjectMessage(InjectMessageRequest),
}

/// Health of a single slot, as surfaced in a [`VolumeStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotHealth {
    /// Every chunk in the slot is backed by an up disk.
    Healthy,
    /// At least one chunk's disk is down or corrupted, but the layout's
    /// redundancy still covers it.
    Degraded,
    /// Redundancy is exhausted; the slot can no longer serve I/O.
    Offline,
}

/// Per-disk status, as surfaced in a [`GroupStatus`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskStatus {
    pub uuid: Uuid,
    pub node_id: u32,
    pub state: DiskState,
    pub free_chunks: u32,
    pub total_chunks: u32,
}

/// Per-volume status, as surfaced in a [`GroupStatus`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VolumeStatus {
    pub uuid: Uuid,
    pub name: String,
    pub size_sectors: u64,
    /// Percentage of this volume's rainX dirty zones already in sync.
    /// `None` for layouts with no dirty-zone tracking, or once every
    /// tracked zone is clean.
    pub rebuild_progress_percent: Option<u8>,
}

/// A full status snapshot of one group, serializable for the outer
/// administration layer (§6: "status snapshots").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupStatus {
    pub uuid: Uuid,
    pub name: String,
    pub state: GroupState,
    pub disks: Vec<DiskStatus>,
    pub volumes: Vec<VolumeStatus>,
}

/// Builds a [`GroupStatus`] snapshot of `group` as it stands right now.
pub fn snapshot_group(group: &Group) -> GroupStatus {
    let disks = group
        .disks()
        .iter()
        .map(|disk| DiskStatus {
            uuid: disk.uuid(),
            node_id: disk.node_id(),
            state: disk.state(),
            free_chunks: disk.chunk_allocator().free_chunks_count(),
            total_chunks: disk.chunk_allocator().total_chunks_count(),
        })
        .collect();

    let volumes = group
        .volume_names()
        .into_iter()
        .filter_map(|(uuid, name)| {
            let volume = group.volume(uuid)?;
            Some(VolumeStatus {
                uuid,
                name,
                size_sectors: volume.sector_count(),
                rebuild_progress_percent: volume.rebuild_progress_percent(),
            })
        })
        .collect();

    GroupStatus {
        uuid: group.uuid(),
        name: group.name().to_string(),
        state: group.state(),
        disks,
        volumes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::Disk;
    use crate::layers::assembly::SpofGroupId;
    use crate::layers::bio::{AccessMode, MemDisk};
    use std::sync::Arc;

    #[test]
    fn snapshot_reflects_disks_and_volumes() {
        let disks = vec![Disk::new(Uuid::from_u128(1), 0, 4096, SpofGroupId::new(1), 0, 16, 8)];
        let backings: Vec<Arc<dyn BlockDevice>> = vec![Arc::new(MemDisk::new(4096, AccessMode::ReadWrite))];
        let group = Group::new(
            Uuid::from_u128(200),
            "tank".into(),
            LayoutKind::SStriping,
            1,
            4,
            16,
            0,
            disks,
            backings,
        )
        .unwrap();
        let volume_uuid = group.create_volume("v0".into(), 16).unwrap();

        let status = snapshot_group(&group);
        assert_eq!(status.name, "tank");
        assert_eq!(status.disks.len(), 1);
        assert_eq!(status.disks[0].total_chunks, 8);
        assert_eq!(status.volumes.len(), 1);
        assert_eq!(status.volumes[0].uuid, volume_uuid);
        assert_eq!(status.volumes[0].size_sectors, 16);
    }

    #[test]
    fn requests_round_trip_through_json() {
        let req = Request::CreateVolume(CreateVolumeRequest {
            group: Uuid::from_u128(1),
            name: "v0".into(),
            size_sectors: 2048,
        });
        let text = serde_json_like_round_trip(&req);
        assert!(text.contains("CreateVolume"));
    }

    /// `serde_json` is not in this crate's dependency graph; `postcard`
    /// already is (C6 uses it for the superblock payload), so exercise the
    /// round trip through that instead of pulling in another format just
    /// for a test.
    fn serde_json_like_round_trip(req: &Request) -> String {
        let bytes = postcard::to_allocvec(req).unwrap();
        let back: Request = postcard::from_bytes(&bytes).unwrap();
        format!("{:?}", back)
    }
}
