//! Adapts one OS disk to the C1 block-device contract (§4.3).
//!
//! The privileged aio/ioctl backend named by the spec is an external
//! collaborator; the backing shipped here is an in-process,
//! `std::fs::File`-backed implementation (positioned reads/writes plus an
//! `fsync` on flush) that upholds the same pool-bounded-concurrency and
//! alignment contract.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::SECTOR_SIZE;
use crate::os::Mutex;
use crate::prelude::*;

use super::super::bio::{AccessMode, BlockDevice, IoOp, SubmittedIo};
use super::super::bio::{BoundedPool, FREE};

/// Refuses I/Os larger than this many bytes (§4.3: "≤ 16 contiguous pages
/// on the Linux backing"; a page is 4 KiB here).
pub const MAX_IO_BYTES: usize = 16 * 4096;

/// The result of polling for completed I/O (§4.3).
#[derive(Debug)]
pub enum PollResult {
    Ok,
    Err(Error),
    NoneReady,
    AllDone,
}

/// A block device backed by a single OS file.
pub struct SystemBlockDevice {
    name: String,
    file: File,
    sector_count: AtomicU64,
    access_mode: AccessMode,
    closed: AtomicBool,
    last_error: Mutex<Option<Errno>>,
    /// Bounds in-flight requests to the nominal 64-128 per disk (§4.3).
    inflight: BoundedPool<()>,
    done: Mutex<Vec<Result<()>>>,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl SystemBlockDevice {
    /// Opens (or creates) `path` as a system block device with `pool_capacity`
    /// in-flight I/O slots (§3.1 `ClusterConfig::io_pool_capacity`).
    pub fn open(
        path: impl AsRef<Path>,
        access_mode: AccessMode,
        sector_count: u64,
        pool_capacity: usize,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(access_mode.allows_write())
            .create(access_mode.allows_write())
            .open(path.as_ref())?;
        file.set_len(sector_count * SECTOR_SIZE as u64)?;

        Ok(Self {
            name: path.as_ref().to_string_lossy().into_owned(),
            file,
            sector_count: AtomicU64::new(sector_count),
            access_mode,
            closed: AtomicBool::new(false),
            last_error: Mutex::new(None),
            inflight: BoundedPool::new(vec![(); pool_capacity], 0),
            done: Mutex::new(Vec::new()),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        })
    }

    /// The sticky error last observed by a completed I/O, if any.
    pub fn last_error(&self) -> Option<Errno> {
        *self.last_error.lock()
    }

    /// Clears the sticky error, allowing new I/O to proceed after a fault.
    pub fn activate(&self) {
        *self.last_error.lock() = None;
    }

    /// Non-blocking poll for one completed I/O result.
    pub fn poll(&self) -> PollResult {
        let mut done = self.done.lock();
        if let Some(result) = done.pop() {
            return match result {
                Ok(()) => PollResult::Ok,
                Err(e) => PollResult::Err(e),
            };
        }
        drop(done);
        if self.completed.load(Ordering::Acquire) == self.submitted.load(Ordering::Acquire) {
            PollResult::AllDone
        } else {
            PollResult::NoneReady
        }
    }

    fn validate(&self, io: &SubmittedIo, len: usize) -> Result<()> {
        if let Some(errno) = self.last_error() {
            return_errno_with_msg!(errno, "device has a sticky error; call activate() first");
        }
        if len > MAX_IO_BYTES {
            return_errno_with_msg!(Errno::Invalid, "I/O exceeds the per-request size limit");
        }
        let end_sector = io.start_sector() + (len as u64).div_ceil(SECTOR_SIZE as u64);
        if end_sector > self.sector_count() {
            return_errno_with_msg!(Errno::Invalid, "I/O range exceeds device size");
        }
        Ok(())
    }

}

impl BlockDevice for SystemBlockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    fn sector_count(&self) -> u64 {
        self.sector_count.load(Ordering::Acquire)
    }

    fn set_sector_count(&self, n: u64) -> Result<()> {
        self.file.set_len(n * SECTOR_SIZE as u64)?;
        self.sector_count.store(n, Ordering::Release);
        Ok(())
    }

    fn enqueue(&self, io: SubmittedIo) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return_errno_with_msg!(Errno::Invalid, "device is closed");
        }
        if io.op() == IoOp::Write && !self.access_mode.allows_write() {
            return_errno_with_msg!(Errno::Invalid, "write to a read-only device");
        }

        let write_data = io.write_data().map(<[u8]>::to_vec);
        let len = write_data.as_ref().map(Vec::len).unwrap_or(SECTOR_SIZE);
        self.validate(&io, len)?;

        let handle = self.inflight.take(FREE, true)?.unwrap();
        self.submitted.fetch_add(1, Ordering::AcqRel);

        let start_byte = io.start_sector() * SECTOR_SIZE as u64;
        let result: Result<()> = (|| {
            match &write_data {
                Some(data) => {
                    self.file.write_at(data, start_byte)?;
                    if io.flush_cache() {
                        self.file.sync_all()?;
                    }
                }
                None => {
                    let mut buf = vec![0u8; SECTOR_SIZE];
                    let n = self.file.read_at(&mut buf, start_byte).unwrap_or(0);
                    buf.truncate(n);
                    io.fill_read_data(&buf);
                }
            }
            Ok(())
        })();

        let recorded = match &result {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.last_error.lock() = Some(e.errno());
                Err(Error::new(e.errno()))
            }
        };
        self.done.lock().push(recorded);
        self.completed.fetch_add(1, Ordering::AcqRel);

        io.complete(result);
        self.inflight.post(FREE, handle)
    }

    fn close(&self) -> Result<()> {
        if self.completed.load(Ordering::Acquire) != self.submitted.load(Ordering::Acquire) {
            return_errno_with_msg!(Errno::Busy, "I/O still outstanding");
        }
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as TestCounter;

    static COUNTER: TestCounter = TestCounter::new(0);

    fn temp_path(tag: &str) -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("exanodes-test-{}-{}-{}", std::process::id(), tag, n))
    }

    #[test]
    fn write_then_read_round_trips() {
        let path = temp_path("rw");
        let dev = SystemBlockDevice::open(&path, AccessMode::ReadWrite, 16, 64).unwrap();
        dev.write(0, &[0x5Au8; 512]).unwrap();
        let mut out = vec![0u8; 512];
        dev.read(0, &mut out).unwrap();
        assert_eq!(out, vec![0x5Au8; 512]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn oversized_io_is_rejected() {
        let path = temp_path("oversize");
        let dev = SystemBlockDevice::open(&path, AccessMode::ReadWrite, 4096, 64).unwrap();
        let big = vec![0u8; MAX_IO_BYTES + SECTOR_SIZE];
        let err = dev.write(0, &big).unwrap_err();
        assert_eq!(err.errno(), Errno::Invalid);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn sticky_error_blocks_until_activate() {
        let path = temp_path("sticky");
        let dev = SystemBlockDevice::open(&path, AccessMode::ReadWrite, 4, 64).unwrap();
        let _ = dev.write(100, &[0u8; 512]);
        assert!(dev.last_error().is_some());
        dev.activate();
        assert!(dev.last_error().is_none());
        let _ = std::fs::remove_file(&path);
    }
}
