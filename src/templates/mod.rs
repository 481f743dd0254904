//! Template rendering for the launcher script and the property list.

mod engine;

pub use engine::{TemplateEngine, AGENT_PLIST, UPDATER_SCRIPT};
