//! launchd integration.
//!
//! Probing, loading and unloading agents through the service manager, and
//! reading installed property lists back.

mod launchctl;
mod plist;
mod traits;

pub use launchctl::Launchctl;
pub use plist::{AgentDefinition, PlistValue, RUN_AT_LOAD_KEY, START_INTERVAL_KEY};
pub use traits::{ControlOutcome, ProbeOutcome, ServiceManager};
