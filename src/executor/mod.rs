//! Command executor module.
//!
//! Handles subprocess spawning with execution timeouts.

mod subprocess;

pub use subprocess::{sanitize_output, SubprocessBuilder, SubprocessResult};
