//! Bounded intrusive pool + multi-list select (C2): the one blocking
//! primitive in the crate, used by C3's in-flight handle pool and C9's
//! completion-aggregator pool. §9 maps the source's cyclic list pointers to
//! `arena<Node> + indices` — here the "arena" is a fixed `Vec<T>` and the
//! "pointers" are `VecDeque<usize>` queues of indices into it, never raw
//! references.

use std::collections::VecDeque;
use std::time::Duration;

use crate::os::{Condvar, Mutex};
use crate::prelude::*;

/// Identifies one of a pool's lists. List `0` is reserved for free
/// (unused) elements; every element starts there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListId(pub usize);

/// The pool's free list.
pub const FREE: ListId = ListId(0);

/// A handle to an element currently held by the caller (i.e. not on any
/// list). Must be returned via [`BoundedPool::post`] or it leaks its slot.
#[derive(Debug)]
pub struct PoolHandle(usize);

struct PoolState {
    lists: Vec<VecDeque<usize>>,
    closed: Vec<bool>,
}

/// A fixed-capacity pool of `T`, pre-allocated at construction, whose
/// elements circulate between a free list and any number of caller-defined
/// lists (§4.2).
pub struct BoundedPool<T> {
    storage: Mutex<Vec<T>>,
    state: Mutex<PoolState>,
    cvar: Condvar,
}

impl<T> BoundedPool<T> {
    /// Creates a pool owning `elements`, plus `num_user_lists` additional
    /// lists besides the reserved free list. Every element starts free.
    pub fn new(elements: Vec<T>, num_user_lists: usize) -> Self {
        let capacity = elements.len();
        let mut lists = vec![VecDeque::new(); num_user_lists + 1];
        lists[FREE.0] = (0..capacity).collect();
        Self {
            storage: Mutex::new(elements),
            state: Mutex::new(PoolState {
                lists,
                closed: vec![false; num_user_lists + 1],
            }),
            cvar: Condvar::new(),
        }
    }

    /// Total number of elements owned by the pool.
    pub fn capacity(&self) -> usize {
        self.storage.lock().len()
    }

    /// Removes the head of `list`. If the list is empty and `wait` is
    /// `true`, blocks until `post` makes it non-empty or the list is
    /// closed; otherwise returns `Ok(None)` immediately.
    pub fn take(&self, list: ListId, wait: bool) -> Result<Option<PoolHandle>> {
        let mut state = self.state.lock();
        loop {
            if let Some(idx) = state.lists[list.0].pop_front() {
                return Ok(Some(PoolHandle(idx)));
            }
            if state.closed[list.0] {
                return_errno_with_msg!(Errno::Canceled, "list closed");
            }
            if !wait {
                return Ok(None);
            }
            state = self.cvar.wait(state);
        }
    }

    /// Appends `handle`'s element to the tail of `list`, waking at most one
    /// selector.
    ///
    /// # Panics
    ///
    /// Panics if `handle`'s element is already enqueued somewhere (a
    /// `PoolHandle` represents exclusive, off-list ownership, so this can
    /// only happen if a handle is cloned or reused after being posted,
    /// which the type does not allow).
    pub fn post(&self, list: ListId, handle: PoolHandle) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed[list.0] {
            return_errno_with_msg!(Errno::Canceled, "list closed");
        }
        state.lists[list.0].push_back(handle.0);
        drop(state);
        self.cvar.notify_one();
        Ok(())
    }

    /// Blocks up to `timeout` for any of `lists` to become non-empty,
    /// returning the subset that is. A `None` timeout blocks indefinitely.
    pub fn select(&self, lists: &[ListId], timeout: Option<Duration>) -> Vec<ListId> {
        let mut state = self.state.lock();
        loop {
            let ready: Vec<ListId> = lists
                .iter()
                .copied()
                .filter(|l| !state.lists[l.0].is_empty())
                .collect();
            if !ready.is_empty() {
                return ready;
            }
            match timeout {
                Some(d) => {
                    let (next_state, timed_out) = self.cvar.wait_timeout(state, d);
                    state = next_state;
                    if timed_out {
                        return Vec::new();
                    }
                }
                None => state = self.cvar.wait(state),
            }
        }
    }

    /// Moves every element currently on `list` back to the free list and
    /// marks `list` closed: any `take(list, wait=true)` blocked on it
    /// unblocks with `Canceled`.
    pub fn close(&self, list: ListId) {
        let mut state = self.state.lock();
        let drained: Vec<usize> = state.lists[list.0].drain(..).collect();
        state.lists[FREE.0].extend(drained);
        state.closed[list.0] = true;
        drop(state);
        self.cvar.notify_all();
    }

    /// Runs `f` with shared access to the element behind `handle`.
    pub fn with<R>(&self, handle: &PoolHandle, f: impl FnOnce(&T) -> R) -> R {
        let storage = self.storage.lock();
        f(&storage[handle.0])
    }

    /// Runs `f` with exclusive access to the element behind `handle`.
    pub fn with_mut<R>(&self, handle: &PoolHandle, f: impl FnOnce(&mut T) -> R) -> R {
        let mut storage = self.storage.lock();
        f(&mut storage[handle.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_free_then_post_to_user_list_round_trips() {
        let pool: BoundedPool<u32> = BoundedPool::new(vec![0, 1, 2], 1);
        let ready = ListId(1);

        let handle = pool.take(FREE, false).unwrap().unwrap();
        pool.with_mut(&handle, |v| *v = 42);
        pool.post(ready, handle).unwrap();

        let handle = pool.take(ready, false).unwrap().unwrap();
        assert_eq!(pool.with(&handle, |v| *v), 42);
        pool.post(FREE, handle).unwrap();
    }

    #[test]
    fn take_on_empty_nonblocking_returns_none() {
        let pool: BoundedPool<u32> = BoundedPool::new(vec![], 1);
        assert!(pool.take(FREE, false).unwrap().is_none());
    }

    #[test]
    fn select_returns_nonempty_lists() {
        let pool: BoundedPool<u32> = BoundedPool::new(vec![0, 1], 2);
        let a = pool.take(FREE, false).unwrap().unwrap();
        pool.post(ListId(1), a).unwrap();

        let ready = pool.select(&[ListId(1), ListId(2)], Some(Duration::from_millis(50)));
        assert_eq!(ready, vec![ListId(1)]);
    }

    #[test]
    fn select_times_out_when_nothing_ready() {
        let pool: BoundedPool<u32> = BoundedPool::new(vec![], 1);
        let ready = pool.select(&[ListId(1)], Some(Duration::from_millis(20)));
        assert!(ready.is_empty());
    }

    #[test]
    fn closing_a_list_cancels_blocked_take() {
        use std::thread;

        let pool: Arc<BoundedPool<u32>> = Arc::new(BoundedPool::new(vec![], 1));
        let ready = ListId(1);
        let pool2 = pool.clone();
        let handle = thread::spawn(move || pool2.take(ready, true));
        thread::sleep(Duration::from_millis(20));
        pool.close(ready);
        let result = handle.join().unwrap();
        assert_eq!(result.unwrap_err().errno(), Errno::Canceled);
    }
}
