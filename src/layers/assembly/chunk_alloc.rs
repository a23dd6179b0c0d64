//! Per-disk chunk allocator (§4.7): a stack of free chunk indices.

use crate::os::Mutex;
use crate::prelude::*;

/// A disk's free-chunk stack. `allocate` pops, `release` pushes; popping an
/// empty stack fails `NoSpace` rather than blocking (unlike C2, nothing here
/// is waited on: callers that want retry-on-space build it themselves, e.g.
/// C7's slot allocator trying another SPOF group).
pub struct ChunkAllocator {
    chunk_size_sectors: u32,
    total_chunks: u32,
    free: Mutex<Vec<u32>>,
}

impl ChunkAllocator {
    /// Creates an allocator owning `total_chunks` chunks of
    /// `chunk_size_sectors` sectors each, all initially free.
    pub fn new(chunk_size_sectors: u32, total_chunks: u32) -> Self {
        // Highest index first, so indices pop off the stack in ascending
        // order — deterministic for tests, matching §4.7's tie-break intent.
        let free = (0..total_chunks).rev().collect();
        Self {
            chunk_size_sectors,
            total_chunks,
            free: Mutex::new(free),
        }
    }

    pub fn chunk_size_sectors(&self) -> u32 {
        self.chunk_size_sectors
    }

    pub fn total_chunks_count(&self) -> u32 {
        self.total_chunks
    }

    pub fn free_chunks_count(&self) -> u32 {
        self.free.lock().len() as u32
    }

    /// Pops one free chunk index, failing `NoSpace` on underflow.
    pub fn allocate(&self) -> Result<u32> {
        self.free
            .lock()
            .pop()
            .ok_or_else(|| Error::with_msg(Errno::NoSpace, "chunk stack underflow"))
    }

    /// Pushes `idx` back onto the free stack.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range for this allocator.
    pub fn release(&self, idx: u32) {
        assert!(idx < self.total_chunks, "chunk index out of range");
        self.free.lock().push(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_free_le_total() {
        let alloc = ChunkAllocator::new(512, 4);
        assert!(alloc.free_chunks_count() <= alloc.total_chunks_count());
        let a = alloc.allocate().unwrap();
        assert!(alloc.free_chunks_count() <= alloc.total_chunks_count());
        alloc.release(a);
        assert_eq!(alloc.free_chunks_count(), alloc.total_chunks_count());
    }

    #[test]
    fn underflow_fails_no_space() {
        let alloc = ChunkAllocator::new(512, 1);
        alloc.allocate().unwrap();
        let err = alloc.allocate().unwrap_err();
        assert_eq!(err.errno(), Errno::NoSpace);
    }
}
