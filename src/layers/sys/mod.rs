//! The system block device (C3): adapts one OS disk to the C1 contract.

mod system_device;

pub use system_device::{PollResult, SystemBlockDevice};
