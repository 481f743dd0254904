//! Filesystem permission probes.

use std::path::Path;

use nix::unistd::{access, AccessFlags};

/// Signature of a writability check, swappable in tests.
pub type WritableCheck = fn(&Path) -> bool;

/// Whether the current user may write to `path` (which must exist).
pub fn is_writable(path: &Path) -> bool {
    access(path, AccessFlags::W_OK).is_ok()
}
