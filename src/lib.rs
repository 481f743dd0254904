//! Autoupdate Library
//!
//! Installs a per-user launchd agent that periodically runs the package
//! manager's `update` (optionally followed by upgrade and cleanup), and
//! reports what an installed agent is configured to do.

pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod files;
pub mod launchd;
pub mod templates;
