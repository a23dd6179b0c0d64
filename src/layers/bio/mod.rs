//! The layer of asynchronous, cancellation-aware block I/O (C1), plus the
//! bounded intrusive pool and multi-list select primitive (C2) that every
//! other layer's concurrency is built on.

mod device;
mod mem_disk;
mod pool;

pub use device::{AccessMode, BlockDevice, Completion, Io, IoOp, SubmittedIo};
pub use mem_disk::MemDisk;
pub use pool::{BoundedPool, ListId, PoolHandle, FREE};

/// Fixed sector size in bytes (§4.3).
pub const SECTOR_SIZE: usize = crate::config::SECTOR_SIZE;
