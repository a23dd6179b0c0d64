//! Crate-owned tunables (§3.1 "ClusterConfig"): defaults for chunk/SU
//! sizing, the bounded pools of C2/C3/C9, and the well-known superblock
//! offsets of C6. These are implementation knobs, not admin-facing policy —
//! an outer admind process may override them via `toml`, but the crate is
//! fully usable with [`ClusterConfig::default`].

use serde::{Deserialize, Serialize};

/// Fixed sector size in bytes, used throughout the crate (§4.3).
pub const SECTOR_SIZE: usize = 512;

/// Tunables owned by the core itself.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Default chunk size in sectors, used when a group does not specify one.
    pub default_chunk_size_sectors: u32,
    /// Default striping-unit size in sectors (must be a power of two).
    pub default_su_size_sectors: u32,
    /// Default slot width for newly created groups.
    pub default_slot_width: u32,
    /// Capacity of the in-flight I/O handle pool per system block device
    /// (§4.3: nominal bound 64-128).
    pub io_pool_capacity: usize,
    /// Capacity of the I/O-split completion aggregator pool (§4.9).
    pub aggregator_pool_capacity: usize,
    /// Size in sectors of one rainX dirty zone (§4.8).
    pub dirty_zone_size_sectors: u32,
    /// Sector offset of the first superblock copy.
    pub superblock_offset_a: u64,
    /// Sector offset of the second superblock copy.
    pub superblock_offset_b: u64,
    /// Size in sectors reserved for each superblock copy (payload included).
    pub superblock_size_sectors: u64,
}

impl ClusterConfig {
    /// Number of sectors occupied by both superblock copies, i.e. the sector
    /// offset at which the first data chunk begins (§6 persistent-state
    /// layout: `[ sb_copy_a | sb_copy_b | chunks... ]`).
    pub fn data_start_sector(&self) -> u64 {
        self.superblock_offset_b + self.superblock_size_sectors
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            default_chunk_size_sectors: 512,
            default_su_size_sectors: 1024,
            default_slot_width: 2,
            io_pool_capacity: 64,
            aggregator_pool_capacity: 64,
            dirty_zone_size_sectors: 1024,
            superblock_offset_a: 0,
            superblock_offset_b: 64,
            superblock_size_sectors: 64,
        }
    }
}
