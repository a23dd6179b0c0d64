//! Small, self-contained utilities shared by several layers.

mod bitmap;

pub use bitmap::BitMap;
