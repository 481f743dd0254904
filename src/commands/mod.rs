//! Operator commands.
//!
//! - `start`: [`Installer`] writes the launcher script, the options record and
//!   the property list, then loads the agent.
//! - `status`: [`StatusReporter`] reads them back.
//! - `stop` / `delete`: [`Uninstaller`].

mod options;
mod start;
mod status;
mod uninstall;

pub use options::{
    compose_command_line, infer_from_command_line, read_record, reconstruct, OptionsRecord,
    Provenance, ReconstructedOptions, UpdateOptions, CLEANUP_STEP, GREEDY_CASK_STEP, UPGRADE_STEP,
};
pub use start::{resolve_log_paths, Installer, LogPaths, StartReport, START_INTERVAL_SECS};
pub use status::{
    install_date, is_stale, render, staleness_advisory, IntervalReading, ServiceState,
    StatusReporter, StatusSnapshot, STALE_AFTER_DAYS,
};
pub use uninstall::{RemovalReport, Uninstaller};
