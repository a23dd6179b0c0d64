//! An in-memory [`BlockDevice`] backing, used by tests throughout the crate
//! in place of a real OS disk.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::SECTOR_SIZE;
use crate::os::Mutex;
use crate::prelude::*;

use super::device::{AccessMode, BlockDevice, SubmittedIo};
use super::pool::{BoundedPool, FREE};

/// A fixed-size, in-memory disk. Every I/O completes synchronously inside
/// `enqueue`, which is a valid (if degenerate) implementation of the
/// asynchronous contract: the completion callback still fires exactly once.
pub struct MemDisk {
    data: Mutex<Vec<u8>>,
    sector_count: AtomicU64,
    access_mode: AccessMode,
    closed: AtomicBool,
    /// Bounds concurrent in-flight I/O the same way a real system device
    /// would (§4.3), even though completion here is immediate.
    inflight: BoundedPool<()>,
}

impl MemDisk {
    pub fn new(sector_count: u64, access_mode: AccessMode) -> Self {
        Self {
            data: Mutex::new(vec![0u8; sector_count as usize * SECTOR_SIZE]),
            sector_count: AtomicU64::new(sector_count),
            access_mode,
            closed: AtomicBool::new(false),
            inflight: BoundedPool::new(vec![(); 128], 0),
        }
    }
}

impl BlockDevice for MemDisk {
    fn name(&self) -> &str {
        "memdisk"
    }

    fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    fn sector_count(&self) -> u64 {
        self.sector_count.load(Ordering::Acquire)
    }

    fn set_sector_count(&self, n: u64) -> Result<()> {
        let mut data = self.data.lock();
        data.resize(n as usize * SECTOR_SIZE, 0);
        self.sector_count.store(n, Ordering::Release);
        Ok(())
    }

    fn enqueue(&self, io: SubmittedIo) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return_errno_with_msg!(Errno::Invalid, "device is closed");
        }
        let handle = self.inflight.take(FREE, true)?.unwrap();

        let start = io.start_sector() as usize * SECTOR_SIZE;
        let result = match io.write_data() {
            Some(payload) => {
                let end = start + payload.len();
                let mut data = self.data.lock();
                if end > data.len() {
                    Err(Error::new(Errno::NoSpace))
                } else {
                    data[start..end].copy_from_slice(payload);
                    Ok(())
                }
            }
            None => {
                // Read: the caller-provided buffer's length tells us how
                // much to return; we recover it by filling whatever is
                // requested via `fill_read_data`, clamped to the device.
                let data = self.data.lock();
                let len = data.len().saturating_sub(start);
                io.fill_read_data(&data[start..start + len.min(data.len() - start)]);
                Ok(())
            }
        };

        io.complete(result);
        self.inflight.post(FREE, handle)
    }

    fn close(&self) -> Result<()> {
        // All I/O on `MemDisk` completes synchronously inside `enqueue`, so
        // there is never anything genuinely in flight by the time `close`
        // runs; the pool is still consulted so real backings that reuse
        // this bound see the same contract.
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
