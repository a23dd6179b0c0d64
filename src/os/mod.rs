//! OS-specific or OS-dependent primitives, funneled through a single module
//! so the rest of the crate never reaches for `std::thread`/`std::sync`
//! directly (§9 design notes: "OS-specific primitives... funneled through
//! one `os` module").
//!
//! This is the std rendition of the teacher's `os` seam: a kernel build
//! would back the same names with its own scheduler and lock types, but the
//! call sites above this module would not change.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar as StdCondvar, Mutex as StdMutex};
use std::thread;
use std::time::{Duration, Instant};

pub use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A unique identifier for the current OS thread.
pub type Tid = thread::ThreadId;

/// Returns the id of the current thread.
pub fn current_thread_id() -> Tid {
    thread::current().id()
}

/// A mutex whose guard remembers the mutex it was borrowed from, so that
/// [`Condvar::wait`] can release and reacquire it without the caller
/// threading the `Mutex` reference through by hand.
pub struct Mutex<T> {
    inner: StdMutex<T>,
}

impl<T> Mutex<T> {
    /// Creates a new mutex guarding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: StdMutex::new(value),
        }
    }

    /// Acquires the lock, blocking the current thread until it is available.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned by another thread panicking while
    /// holding the lock.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        MutexGuard {
            guard: std::mem::ManuallyDrop::new(self.inner.lock().expect("mutex poisoned")),
            mutex: self,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex").field("inner", &self.inner).finish()
    }
}

/// A held lock on a [`Mutex`]. Derefs to `T`.
pub struct MutexGuard<'a, T> {
    guard: std::mem::ManuallyDrop<std::sync::MutexGuard<'a, T>>,
    mutex: &'a Mutex<T>,
}

impl<'a, T> MutexGuard<'a, T> {
    /// Releases the guard early and returns the `Mutex` it was borrowed
    /// from, so the caller can block on a condition and reacquire later.
    fn release(mut self) -> &'a Mutex<T> {
        // SAFETY: `self` is forgotten immediately after, so the inner guard
        // is dropped exactly once (here) and never again via `Drop::drop`.
        unsafe { std::mem::ManuallyDrop::drop(&mut self.guard) };
        let mutex = self.mutex;
        std::mem::forget(self);
        mutex
    }
}

impl<'a, T> Deref for MutexGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<'a, T> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<'a, T> Drop for MutexGuard<'a, T> {
    fn drop(&mut self) {
        // SAFETY: dropped at most once: either here, or (if `release` ran)
        // inside `release`, which forgets `self` so this impl never runs.
        unsafe { std::mem::ManuallyDrop::drop(&mut self.guard) };
    }
}

/// A condition variable paired with its own counting discipline, so that a
/// `notify` that arrives before the matching `wait` is not lost (mirrors the
/// teacher's `Condvar`, which wraps a waitqueue plus a notify counter for the
/// same reason).
pub struct Condvar {
    cvar: StdCondvar,
    counter: StdMutex<Counts>,
}

#[derive(Default)]
struct Counts {
    waiters: u64,
    notifications: u64,
}

impl Condvar {
    /// Creates a new condition variable.
    pub fn new() -> Self {
        Self {
            cvar: StdCondvar::new(),
            counter: StdMutex::new(Counts::default()),
        }
    }

    /// Atomically releases `guard`, blocks until notified, then reacquires
    /// the mutex and returns a fresh guard.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        {
            let mut counts = self.counter.lock().unwrap();
            counts.waiters += 1;
        }
        let mutex = guard.release();

        let mut counts = self.counter.lock().unwrap();
        while counts.notifications == 0 {
            counts = self.cvar.wait(counts).unwrap();
        }
        counts.notifications -= 1;
        drop(counts);

        mutex.lock()
    }

    /// Like [`Condvar::wait`], but gives up after `timeout` and reports
    /// whether it timed out.
    pub fn wait_timeout<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
    ) -> (MutexGuard<'a, T>, bool) {
        {
            let mut counts = self.counter.lock().unwrap();
            counts.waiters += 1;
        }
        let mutex = guard.release();

        let mut counts = self.counter.lock().unwrap();
        let deadline = Instant::now() + timeout;
        let mut timed_out = false;
        while counts.notifications == 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                counts.waiters = counts.waiters.saturating_sub(1);
                timed_out = true;
                break;
            }
            let (next_counts, result) = self.cvar.wait_timeout(counts, remaining).unwrap();
            counts = next_counts;
            if result.timed_out() && counts.notifications == 0 {
                counts.waiters = counts.waiters.saturating_sub(1);
                timed_out = true;
                break;
            }
        }
        if !timed_out {
            counts.notifications -= 1;
        }
        drop(counts);

        (mutex.lock(), timed_out)
    }

    /// Wakes at most one waiter.
    pub fn notify_one(&self) {
        let mut counts = self.counter.lock().unwrap();
        if counts.waiters == 0 {
            return;
        }
        counts.waiters -= 1;
        counts.notifications += 1;
        self.cvar.notify_one();
    }

    /// Wakes every waiter.
    pub fn notify_all(&self) {
        let mut counts = self.counter.lock().unwrap();
        if counts.waiters == 0 {
            return;
        }
        counts.notifications += counts.waiters;
        counts.waiters = 0;
        self.cvar.notify_all();
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}

/// Spawns a new OS thread and returns a handle that can be joined or polled.
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let is_finished = Arc::new(AtomicBool::new(false));
    let is_finished_clone = is_finished.clone();
    let inner = thread::spawn(move || {
        let result = f();
        is_finished_clone.store(true, Ordering::Release);
        result
    });
    JoinHandle {
        inner: Some(inner),
        is_finished,
    }
}

/// An owned handle to a spawned OS thread.
pub struct JoinHandle<T> {
    inner: Option<thread::JoinHandle<T>>,
    is_finished: Arc<AtomicBool>,
}

impl<T> JoinHandle<T> {
    /// Returns `true` once the thread's closure has returned.
    pub fn is_finished(&self) -> bool {
        self.is_finished.load(Ordering::Acquire)
    }

    /// Blocks until the thread terminates, returning its result.
    ///
    /// # Panics
    ///
    /// Panics if the thread itself panicked.
    pub fn join(mut self) -> T {
        self.inner
            .take()
            .unwrap()
            .join()
            .expect("worker thread panicked")
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle").finish_non_exhaustive()
    }
}
