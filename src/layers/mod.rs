//! The layered stack each higher component builds on, in dependency order:
//! block I/O (C1/C2) at the bottom, the system device (C3) and byte stream
//! (C4) adapting it, then superblock persistence (C6), chunk/slot assembly
//! (C7), pluggable layouts (C8), the exported volume (C9), and finally the
//! distributed PR lock protocol (C10).

pub mod assembly;
pub mod bio;
pub mod layout;
pub mod pr;
pub mod stream;
pub mod superblock;
pub mod sys;
pub mod volume;
