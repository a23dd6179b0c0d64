//! Byte-granular stream over a block device (C4), used by C6 to read and
//! write superblock frames without hand-rolling sector arithmetic at every
//! call site.

mod block_stream;

pub use block_stream::BlockStream;
