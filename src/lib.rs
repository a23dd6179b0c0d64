//! Exanodes: a clustered block-storage virtualizer.
//!
//! Aggregates disks (§3 `Disk`) across SPOF groups into assembly volumes
//! (C7), maps their sectors through pluggable layouts (C8), and exports the
//! result as a single block device (C9) with I/O request splitting at
//! striping-unit boundaries. Metadata updates across the cluster are
//! serialized by the PR lock algorithm (C10); every on-disk record is a
//! versioned, checksummed superblock (C6).
//!
//! The crate does not itself parse CLI arguments, route admind commands, or
//! install a `log` subscriber — those are the outer administration layer's
//! job (§1). It exposes a typed request/status surface (`ops`) for that
//! layer to drive.

pub mod checksum;
pub mod config;
pub mod disk;
pub mod error;
pub mod group;
pub mod layers;
pub mod ops;
pub mod os;
pub mod util;
pub mod version;

pub(crate) mod prelude;

pub use config::ClusterConfig;
pub use disk::{Disk, DiskState};
pub use error::{Errno, Error, Result};
pub use group::{Group, GroupState};
