//! File operations used when installing and removing the agent.

mod access;
mod write;

pub use access::{is_writable, WritableCheck};
pub use write::{ensure_dir, remove_if_present, write_atomic};
