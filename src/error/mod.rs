//! Error types for autoupdate.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
