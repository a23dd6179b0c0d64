//! The uniform block-device contract (§4.1): every backing (system disk,
//! assembled volume, cached stream) implements [`BlockDevice`], and
//! synchronous `read`/`write`/`flush` are built once on top of `submit_io`
//! plus the `Io`/`SubmittedIo` completion pair below — the same split the
//! teacher uses for `Bio`/`SubmittedBio`.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::os::{Condvar, Mutex};
use crate::prelude::*;

/// The access mode a block device (or a caller's view of one) was opened
/// with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    /// Whether this mode permits issuing write I/Os.
    pub fn allows_write(&self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }

    /// Whether this mode permits issuing read I/Os.
    pub fn allows_read(&self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadWrite)
    }
}

/// The operation requested by an [`Io`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
enum IoStatus {
    Init = 0,
    Submit = 1,
    Complete = 2,
    Failed = 3,
}

/// The payload carried by an [`Io`]: a shared, lockable buffer for reads
/// (the device fills it before completing), or an immutable shared buffer
/// for writes.
#[derive(Clone)]
pub enum IoBuf {
    Read(Arc<Mutex<Vec<u8>>>),
    Write(Arc<Vec<u8>>),
}

impl IoBuf {
    pub fn len(&self) -> usize {
        match self {
            IoBuf::Read(buf) => buf.lock().len(),
            IoBuf::Write(buf) => buf.len(),
        }
    }
}

type CompleteFn = Arc<dyn Fn(&SubmittedIo) + Send + Sync>;

/// A single, freshly-constructed I/O request (§4.1).
///
/// Unsubmitted, `Io` is owned by its caller; once [`Io::submit`] succeeds,
/// the device owns the in-flight accounting until completion fires exactly
/// once.
#[derive(Clone)]
pub struct Io(Arc<IoInner>);

struct IoInner {
    op: IoOp,
    start_sector: u64,
    buf: IoBuf,
    flush_cache: bool,
    bypass_lock: bool,
    user_data: u64,
    complete_fn: Option<CompleteFn>,
    status: AtomicU32,
    lock: Mutex<()>,
    cvar: Condvar,
    error: Mutex<Option<Error>>,
}

impl Io {
    /// Builds a read request for `len` bytes starting at `start_sector`.
    /// Returns the `Io` plus the shared buffer the device will fill.
    pub fn new_read(
        start_sector: u64,
        len: usize,
        flush_cache: bool,
        bypass_lock: bool,
        user_data: u64,
    ) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(vec![0u8; len]));
        let io = Self(Arc::new(IoInner {
            op: IoOp::Read,
            start_sector,
            buf: IoBuf::Read(buf.clone()),
            flush_cache,
            bypass_lock,
            user_data,
            complete_fn: None,
            status: AtomicU32::new(IoStatus::Init as u32),
            lock: Mutex::new(()),
            cvar: Condvar::new(),
            error: Mutex::new(None),
        }));
        (io, buf)
    }

    /// Builds a write request carrying `data`.
    pub fn new_write(
        start_sector: u64,
        data: Arc<Vec<u8>>,
        flush_cache: bool,
        bypass_lock: bool,
        user_data: u64,
    ) -> Self {
        Self(Arc::new(IoInner {
            op: IoOp::Write,
            start_sector,
            buf: IoBuf::Write(data),
            flush_cache,
            bypass_lock,
            user_data,
            complete_fn: None,
            status: AtomicU32::new(IoStatus::Init as u32),
            lock: Mutex::new(()),
            cvar: Condvar::new(),
            error: Mutex::new(None),
        }))
    }

    /// Attaches a completion callback, invoked exactly once when the device
    /// completes this I/O (in addition to waking any [`IoWaiter`]).
    pub fn with_complete_fn(mut self, f: impl Fn(&SubmittedIo) + Send + Sync + 'static) -> Self {
        Arc::get_mut(&mut self.0)
            .expect("Io must not be shared before submission")
            .complete_fn = Some(Arc::new(f));
        self
    }

    pub fn op(&self) -> IoOp {
        self.0.op
    }

    pub fn start_sector(&self) -> u64 {
        self.0.start_sector
    }

    pub fn len_bytes(&self) -> usize {
        self.0.buf.len()
    }

    pub fn flush_cache(&self) -> bool {
        self.0.flush_cache
    }

    pub fn bypass_lock(&self) -> bool {
        self.0.bypass_lock
    }

    pub fn user_data(&self) -> u64 {
        self.0.user_data
    }

    /// Submits this I/O to `device`, returning a waiter for its completion.
    ///
    /// # Panics
    ///
    /// Panics if this `Io` has already been submitted once.
    pub fn submit(&self, device: &dyn BlockDevice) -> Result<IoWaiter> {
        let prev = self.0.status.compare_exchange(
            IoStatus::Init as u32,
            IoStatus::Submit as u32,
            Ordering::Release,
            Ordering::Relaxed,
        );
        assert!(prev.is_ok(), "Io submitted more than once");

        if let Err(e) = device.enqueue(SubmittedIo(self.0.clone())) {
            self.0.status.store(IoStatus::Init as u32, Ordering::Release);
            return Err(e);
        }

        Ok(IoWaiter {
            ios: vec![self.0.clone()],
        })
    }
}

/// A waiter for one or more submitted [`Io`]s.
#[must_use]
pub struct IoWaiter {
    ios: Vec<Arc<IoInner>>,
}

impl IoWaiter {
    /// Blocks until every submitted I/O has completed, returning the first
    /// non-`Ok` result encountered (§4.9: aggregation propagates the first
    /// non-zero error).
    pub fn wait(&self) -> Result<()> {
        let mut first_err = None;
        for io in &self.ios {
            let mut guard = io.lock.lock();
            while io.status.load(Ordering::Acquire) == IoStatus::Submit as u32 {
                guard = io.cvar.wait(guard);
            }
            drop(guard);
            if io.status.load(Ordering::Acquire) == IoStatus::Failed as u32 && first_err.is_none() {
                first_err = io.error.lock().clone();
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A submitted [`Io`], accepted into a device's request queue. Only the
/// device may complete it.
pub struct SubmittedIo(Arc<IoInner>);

impl SubmittedIo {
    pub fn op(&self) -> IoOp {
        self.0.op
    }

    pub fn start_sector(&self) -> u64 {
        self.0.start_sector
    }

    pub fn flush_cache(&self) -> bool {
        self.0.flush_cache
    }

    pub fn bypass_lock(&self) -> bool {
        self.0.bypass_lock
    }

    pub fn user_data(&self) -> u64 {
        self.0.user_data
    }

    /// Total buffer length in bytes.
    pub fn len_bytes(&self) -> usize {
        self.0.buf.len()
    }

    /// The write payload, if this is a write I/O.
    pub fn write_data(&self) -> Option<&[u8]> {
        match &self.0.buf {
            IoBuf::Write(buf) => Some(buf.as_slice()),
            IoBuf::Read(_) => None,
        }
    }

    /// Fills the whole read target buffer, if this is a read I/O.
    pub fn fill_read_data(&self, data: &[u8]) {
        if let IoBuf::Read(buf) = &self.0.buf {
            let mut guard = buf.lock();
            guard.clear();
            guard.extend_from_slice(data);
        }
    }

    /// Fills `data` into the read target buffer at byte offset `offset`,
    /// for a read split into several sub-ranges that each land on a
    /// different part of the buffer (§4.9 request splitting).
    pub fn fill_read_range(&self, offset: usize, data: &[u8]) {
        if let IoBuf::Read(buf) = &self.0.buf {
            let mut guard = buf.lock();
            guard[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    /// The outcome of this I/O. Only meaningful once completion has fired
    /// (e.g. from within the callback passed to [`Io::with_complete_fn`]).
    pub fn result(&self) -> Result<()> {
        if self.0.status.load(Ordering::Acquire) == IoStatus::Failed as u32 {
            let errno = self
                .0
                .error
                .lock()
                .as_ref()
                .map(Error::errno)
                .unwrap_or(Errno::Internal);
            Err(Error::new(errno))
        } else {
            Ok(())
        }
    }

    /// Completes this I/O exactly once, waking any waiter and invoking the
    /// attached callback, if any.
    pub fn complete(&self, result: Result<()>) {
        let new_status = if result.is_ok() {
            IoStatus::Complete
        } else {
            IoStatus::Failed
        };
        if let Err(e) = &result {
            *self.0.error.lock() = Some(Error::with_msg(e.errno(), "submitted I/O failed"));
        }

        let _guard = self.0.lock.lock();
        let prev = self.0.status.compare_exchange(
            IoStatus::Submit as u32,
            new_status as u32,
            Ordering::Release,
            Ordering::Relaxed,
        );
        assert!(prev.is_ok(), "I/O completed more than once");
        drop(_guard);
        self.0.cvar.notify_all();

        if let Some(f) = &self.0.complete_fn {
            f(self);
        }
    }
}

impl fmt::Debug for SubmittedIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmittedIo")
            .field("op", &self.op())
            .field("start_sector", &self.start_sector())
            .finish()
    }
}

/// A completion outcome delivered to a caller-supplied callback. Kept as a
/// closed enum rather than a raw status code (§9: "void *private" callbacks
/// become a closed completion type).
#[derive(Debug)]
pub enum Completion {
    Ok,
    Err(Error),
}

/// The uniform, asynchronous, cancellation-aware block-device contract
/// (§4.1). Backings implement only `name`/`access_mode`/`sector_count`/
/// `set_sector_count`/`enqueue`/`close`; synchronous `read`/`write`/`flush`
/// are provided here once for every backing.
pub trait BlockDevice: Send + Sync {
    fn name(&self) -> &str;

    fn access_mode(&self) -> AccessMode;

    fn sector_count(&self) -> u64;

    fn set_sector_count(&self, n: u64) -> Result<()>;

    /// Accepts `io` into the device's request queue. Must not block; the
    /// device takes ownership of completion, which fires exactly once.
    fn enqueue(&self, io: SubmittedIo) -> Result<()>;

    /// Rejects further I/O; fails with `Busy` while any I/O is outstanding.
    fn close(&self) -> Result<()>;

    /// Synchronous read built on `enqueue` + a completion wait.
    fn read(&self, start_sector: u64, buf: &mut [u8]) -> Result<()> {
        if !self.access_mode().allows_read() {
            return_errno_with_msg!(Errno::PermissionDenied, "device is not readable");
        }
        let (io, data) = Io::new_read(start_sector, buf.len(), false, false, 0);
        let waiter = io.submit(self)?;
        waiter.wait()?;
        buf.copy_from_slice(&data.lock());
        Ok(())
    }

    /// Synchronous write built on `enqueue` + a completion wait. A write to
    /// a `Read`-only device fails synchronously with `Invalid` (§4.1).
    fn write(&self, start_sector: u64, buf: &[u8]) -> Result<()> {
        if !self.access_mode().allows_write() {
            return_errno_with_msg!(Errno::Invalid, "write to a read-only device");
        }
        let io = Io::new_write(start_sector, Arc::new(buf.to_vec()), false, false, 0);
        let waiter = io.submit(self)?;
        waiter.wait()
    }

    /// Flushes any volatile write cache by issuing a zero-length,
    /// `flush_cache`-tagged write.
    fn flush(&self) -> Result<()> {
        if !self.access_mode().allows_write() {
            return_errno_with_msg!(Errno::Invalid, "write to a read-only device");
        }
        let io = Io::new_write(0, Arc::new(Vec::new()), true, false, 0);
        let waiter = io.submit(self)?;
        waiter.wait()
    }
}
