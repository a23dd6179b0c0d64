//! End-to-end scenarios spanning more than one layer at once, one test per
//! named scenario (E1-E6).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use exanodes::error::{Errno, Error};
use exanodes::group::{Group, LayoutKind};
use exanodes::layers::assembly::{AssemblyVolume, SpofGroupId};
use exanodes::layers::bio::{AccessMode, BlockDevice, MemDisk, SubmittedIo, SECTOR_SIZE};
use exanodes::layers::layout::SStriping;
use exanodes::layers::pr::{
    ChannelTransport, Message, MessageType, PrCallbacks, PrClient, PrServer, ServerState,
};
use exanodes::layers::stream::BlockStream;
use exanodes::layers::superblock::{self, Superblock, SuperblockPayload};
use exanodes::layers::volume::{split_range, Volume};
use exanodes::version::Version;
use exanodes::{ClusterConfig, Disk};

struct CountingCallbacks {
    finished_count: AtomicUsize,
}

impl CountingCallbacks {
    fn new() -> Self {
        Self {
            finished_count: AtomicUsize::new(0),
        }
    }
}

impl PrCallbacks for CountingCallbacks {
    fn write_metadata(&self) -> Vec<u8> {
        vec![0xAB]
    }
    fn read_metadata(&self, _payload: &[u8]) {}
    fn finished(&self) {
        self.finished_count.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn e1_create_group_write_read_round_trips() {
    let d0 = Disk::new(Uuid::from_u128(1), 0, 4096, SpofGroupId::new(0), 0, 4096, 1);
    let d1 = Disk::new(Uuid::from_u128(2), 0, 4096, SpofGroupId::new(1), 0, 4096, 1);
    let backings: Vec<Arc<dyn BlockDevice>> = vec![
        Arc::new(MemDisk::new(4096, AccessMode::ReadWrite)),
        Arc::new(MemDisk::new(4096, AccessMode::ReadWrite)),
    ];
    let group = Group::new(
        Uuid::new_v4(),
        "e1".into(),
        LayoutKind::Rain1,
        2,
        1024,
        4096,
        0,
        vec![d0, d1],
        backings,
    )
    .unwrap();

    let vol = group.create_volume("v".into(), 2048).unwrap();
    let volume = group.volume(vol).unwrap();

    let data = vec![0x11u8; 1024];
    volume.write(0, &data).unwrap();
    let mut out = vec![0u8; 1024];
    volume.read(0, &mut out).unwrap();
    assert_eq!(out, data);
}

struct FailingDevice;

impl BlockDevice for FailingDevice {
    fn name(&self) -> &str {
        "failing"
    }
    fn access_mode(&self) -> AccessMode {
        AccessMode::ReadWrite
    }
    fn sector_count(&self) -> u64 {
        64
    }
    fn set_sector_count(&self, _n: u64) -> exanodes::error::Result<()> {
        Ok(())
    }
    fn enqueue(&self, io: SubmittedIo) -> exanodes::error::Result<()> {
        io.complete(Err(Error::new(Errno::IoError)));
        Ok(())
    }
    fn close(&self) -> exanodes::error::Result<()> {
        Ok(())
    }
}

#[test]
fn e2_split_write_surfaces_second_sub_io_error() {
    // The literal split point from the scenario (su=1024 sectors, a write of
    // 1 MiB starting 4 sectors before a boundary) holds independent of any
    // volume shape.
    let sub_ranges = split_range(1020, 2048, 1024);
    assert_eq!(sub_ranges, vec![(1020, 4), (1024, 2044)]);

    // Exercise the same shape (an SU-crossing write split across two
    // physically distinct positions) end to end, scaled down: su = chunk = 4
    // sectors, one chunk per disk, second disk always fails its I/O.
    let disks = vec![
        Disk::new(Uuid::from_u128(1), 0, 64, SpofGroupId::new(1), 0, 4, 1),
        Disk::new(Uuid::from_u128(2), 0, 64, SpofGroupId::new(2), 0, 4, 1),
    ];
    let assembly = Arc::new(AssemblyVolume::new(1));
    assembly.grow(&disks, 2).unwrap();

    let backings: Vec<Arc<dyn BlockDevice>> = vec![
        Arc::new(MemDisk::new(64, AccessMode::ReadWrite)),
        Arc::new(FailingDevice),
    ];
    let volume = Volume::new(Arc::new(SStriping::new(4)), assembly, backings, 4, 0, 8, AccessMode::ReadWrite, 8, 1024).unwrap();

    // Sector 3 for 4 sectors crosses the SU boundary at sector 4, landing
    // one sub-write on position 0 (disk 0, succeeds) and one on position 1
    // (disk 1, fails).
    let err = volume.write(3, &[0u8; 4 * SECTOR_SIZE]).unwrap_err();
    assert_eq!(err.errno(), Errno::IoError);
}

#[test]
fn e3_resize_fails_when_capacity_is_exhausted() {
    let disks = vec![
        Disk::new(Uuid::from_u128(1), 0, 4096, SpofGroupId::new(1), 0, 16, 2),
        Disk::new(Uuid::from_u128(2), 0, 4096, SpofGroupId::new(2), 0, 16, 2),
    ];
    let backings: Vec<Arc<dyn BlockDevice>> = vec![
        Arc::new(MemDisk::new(4096, AccessMode::ReadWrite)),
        Arc::new(MemDisk::new(4096, AccessMode::ReadWrite)),
    ];
    let group = Group::new(
        Uuid::new_v4(),
        "e3-fail".into(),
        LayoutKind::Rain1,
        2,
        16,
        16,
        0,
        disks,
        backings,
    )
    .unwrap();

    let vol = group.create_volume("v".into(), 16).unwrap();
    // Growing from 1 to 3 positions needs 2 more positions of 2 chunks each,
    // but the two disks only have 2 chunks apiece (1 already spent on the
    // first position) — the third position can't be placed. Both SPOF
    // groups still exist, so this is capacity exhaustion, not a topology
    // failure.
    let err = group.resize_volume(vol, 48).unwrap_err();
    assert_eq!(err.errno(), Errno::NotEnoughDevices);

    // The failed resize must not have changed the volume's size.
    let volume = group.volume(vol).unwrap();
    assert_eq!(volume.sector_count(), 16);
}

#[test]
fn e3_resize_succeeds_across_three_spof_groups_preserving_data() {
    let disks = vec![
        Disk::new(Uuid::from_u128(1), 0, 4096, SpofGroupId::new(1), 0, 16, 4),
        Disk::new(Uuid::from_u128(2), 0, 4096, SpofGroupId::new(2), 0, 16, 4),
        Disk::new(Uuid::from_u128(3), 0, 4096, SpofGroupId::new(3), 0, 16, 4),
    ];
    let backings: Vec<Arc<dyn BlockDevice>> = vec![
        Arc::new(MemDisk::new(4096, AccessMode::ReadWrite)),
        Arc::new(MemDisk::new(4096, AccessMode::ReadWrite)),
        Arc::new(MemDisk::new(4096, AccessMode::ReadWrite)),
    ];
    let group = Group::new(
        Uuid::new_v4(),
        "e3-ok".into(),
        LayoutKind::Rain1,
        2,
        16,
        16,
        0,
        disks,
        backings,
    )
    .unwrap();

    let vol = group.create_volume("v".into(), 16).unwrap();
    let volume = group.volume(vol).unwrap();
    let original = vec![0x5Au8; 512];
    volume.write(0, &original).unwrap();

    group.resize_volume(vol, 48).unwrap();
    assert_eq!(volume.sector_count(), 48);

    let mut readback = vec![0u8; 512];
    volume.read(0, &mut readback).unwrap();
    assert_eq!(readback, original);
}

fn lockserver_ok(node: u8) -> Message {
    Message {
        msg_type: MessageType::LockserverOk,
        from_server: false,
        from_node: node,
        to_server: true,
        to_node: 0,
        emitter_seq: 0,
        to_incarn: 0,
        from_incarn: 0,
        payload: Vec::new(),
    }
}

fn unlock_from(node: u8) -> Message {
    Message {
        msg_type: MessageType::Unlock,
        from_server: false,
        from_node: node,
        to_server: true,
        to_node: 0,
        emitter_seq: 0,
        to_incarn: 0,
        from_incarn: 0,
        payload: Vec::new(),
    }
}

fn pr_cmd_done(from_node: u8) -> Message {
    Message {
        msg_type: MessageType::PrCmdDone,
        from_server: false,
        from_node,
        to_server: false,
        to_node: 1,
        emitter_seq: 0,
        to_incarn: 0,
        from_incarn: 0,
        payload: Vec::new(),
    }
}

#[test]
fn e4_pr_broadcast_finishes_once_every_peer_replies() {
    let transport = ChannelTransport::new();
    let rx_server = transport.register(0);
    let rx_a = transport.register(1);
    let rx_b = transport.register(2);
    let rx_c = transport.register(3);

    let server = PrServer::new(0, transport.clone());
    server.install_membership(vec![1, 2, 3]);

    let a = PrClient::new(1, 0, vec![1, 2, 3], transport.clone(), CountingCallbacks::new());

    // The initial post-barrier grant always lands on the highest-incarnation
    // member (here node 3, all incarnations tied at 0); hand it straight
    // back so the server is ReadyUnlocked for A's own new-PR below.
    for node in [1u8, 2, 3] {
        server.handle(lockserver_ok(node)).unwrap();
    }
    assert_eq!(server.owner(), Some(3));
    server.handle(unlock_from(3)).unwrap();
    assert_eq!(server.state(), ServerState::ReadyUnlocked);

    a.new_pr().unwrap();
    let lock_msg = rx_server.try_recv().expect("A's LOCK reached the server");
    server.handle(lock_msg).unwrap();
    assert_eq!(server.owner(), Some(1));

    let locked = rx_a.try_recv().expect("A received LOCKED");
    a.on_granted(locked).unwrap();

    let to_b = rx_b.try_recv().expect("B received PR_CMD");
    let to_c = rx_c.try_recv().expect("C received PR_CMD");
    assert_eq!(to_b.msg_type, MessageType::PrCmd);
    assert_eq!(to_b.payload, vec![0xAB]);
    assert_eq!(to_c.payload, vec![0xAB]);

    a.on_pr_cmd_done(pr_cmd_done(2)).unwrap();
    a.on_pr_cmd_done(pr_cmd_done(3)).unwrap();

    let release = rx_server.try_recv().expect("A released the server-side lock");
    assert_eq!(release.msg_type, MessageType::Unlock);
}

#[test]
fn e5_membership_change_mid_barrier_regroups_and_still_grants() {
    let transport = ChannelTransport::new();
    let rx_server = transport.register(0);
    let rx_a = transport.register(1);
    let rx_b = transport.register(2);

    let server = PrServer::new(0, transport.clone());

    // A LOCK sent before the barrier completes is dropped, not queued.
    let early_lock = Message {
        msg_type: MessageType::Lock,
        from_server: false,
        from_node: 1,
        to_server: true,
        to_node: 0,
        emitter_seq: 0,
        to_incarn: 0,
        from_incarn: 0,
        payload: Vec::new(),
    };
    server.handle(early_lock).unwrap();
    assert_eq!(server.state(), ServerState::Standby);
    assert_eq!(server.owner(), None);
    assert!(rx_a.try_recv().is_err());

    server.install_membership(vec![1, 2, 3]);
    server.handle(lockserver_ok(1)).unwrap();
    server.handle(lockserver_ok(2)).unwrap();
    assert_eq!(server.state(), ServerState::WaitAllOk);

    // C leaves mid-barrier; the server resets and only awaits {1, 2} now.
    server.install_membership(vec![1, 2]);
    assert_eq!(server.state(), ServerState::WaitAllOk);

    let a = PrClient::new(1, 0, vec![1, 2], transport.clone(), CountingCallbacks::new());

    server.handle(lockserver_ok(1)).unwrap();
    server.handle(lockserver_ok(2)).unwrap();
    assert_eq!(server.state(), ServerState::ReadyLocked);
    let arbiter_msg = rx_b.try_recv().expect("the new barrier's arbiter is notified");
    assert_eq!(arbiter_msg.msg_type, MessageType::LockUpdateOtherNode);
    let owner = server.owner().unwrap();
    assert_eq!(owner, 2);

    server.handle(unlock_from(owner)).unwrap();
    assert_eq!(server.state(), ServerState::ReadyUnlocked);

    a.new_pr().unwrap();
    let lock_msg = rx_server.try_recv().unwrap();
    server.handle(lock_msg).unwrap();
    assert_eq!(server.owner(), Some(1));

    let locked = rx_a.try_recv().expect("A received LOCKED after the membership reset");
    assert_eq!(locked.msg_type, MessageType::Locked);
}

#[test]
fn e6_copy_a_zeroed_on_disk_recovers_via_b_and_rewrite_restores_both() {
    let config = ClusterConfig::default();
    let dev = MemDisk::new(config.data_start_sector() + 16, AccessMode::ReadWrite);
    let format_version = Version::new([1, 0]);

    let sb = Superblock {
        format_version: format_version.clone(),
        group_uuid: Uuid::from_u128(10),
        disk_uuid: Uuid::from_u128(20),
        node_id: 1,
        layout_tag: 0,
        payload: SuperblockPayload {
            generation: 1,
            group_name: "tank".to_string(),
            layout_params: vec![],
            disk_roster: vec![Uuid::from_u128(20)],
        },
    };
    superblock::write(&dev, &config, &sb).unwrap();

    let region_len = (config.superblock_size_sectors * SECTOR_SIZE as u64) as usize;
    {
        let mut stream = BlockStream::open(&dev, AccessMode::ReadWrite, 1).unwrap();
        stream
            .seek((config.superblock_offset_a * SECTOR_SIZE as u64) as i64, 0)
            .unwrap();
        stream.write(&vec![0u8; region_len]).unwrap();
        stream.flush().unwrap();
    }

    let loaded = superblock::read(&dev, &config, Some(&format_version), Some(sb.group_uuid)).unwrap();
    assert_eq!(loaded, sb);

    superblock::write(&dev, &config, &loaded).unwrap();

    let mut stream = BlockStream::open(&dev, AccessMode::Read, 1).unwrap();
    stream
        .seek((config.superblock_offset_a * SECTOR_SIZE as u64) as i64, 0)
        .unwrap();
    let mut buf = vec![0u8; region_len];
    stream.read(&mut buf).unwrap();
    let decoded = Superblock::decode(&buf, Some(&format_version)).unwrap();
    assert_eq!(decoded, sb);
}
