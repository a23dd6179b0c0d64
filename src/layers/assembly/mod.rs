//! Assembly (C7): per-disk chunk allocators, SPOF-group-aware slot
//! allocation, and per-volume slot arrays with resize.

mod assembly_volume;
mod chunk_alloc;
mod slot;
mod spof;

pub use assembly_volume::AssemblyVolume;
pub use chunk_alloc::ChunkAllocator;
pub use slot::{allocate_slot, release_slot, Slot, SlotCandidate};
pub use spof::SpofGroupId;
