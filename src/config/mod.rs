//! Configuration module for autoupdate.
//!
//! Handles loading configuration from TOML files and resolving the managed
//! agent's well-known paths.

mod identity;
mod settings;

pub use identity::*;
pub use settings::*;
