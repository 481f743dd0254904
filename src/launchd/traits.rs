//! Service manager interface.

use std::fmt;
use std::path::Path;

use tracing::warn;

/// Result of asking the service manager which agents are loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The label appears in the listing.
    Loaded,
    /// The listing ran and the label is absent.
    NotLoaded,
    /// The listing could not be obtained.
    Unavailable { reason: String },
}

/// Result of a load or unload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Succeeded,
    Failed {
        exit_code: Option<i32>,
        detail: String,
    },
}

impl ControlOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for ControlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed {
                exit_code: Some(code),
                detail,
            } if !detail.is_empty() => write!(f, "failed with exit code {}: {}", code, detail),
            Self::Failed {
                exit_code: Some(code),
                ..
            } => write!(f, "failed with exit code {}", code),
            Self::Failed { detail, .. } => write!(f, "failed: {}", detail),
        }
    }
}

/// The host facility that loads, unloads and lists per-user agents.
///
/// # Example
///
/// ```ignore
/// let launchctl = Launchctl::new(&settings.launchctl);
/// if launchctl.is_running(&identity.name) {
///     println!("already loaded");
/// }
/// ```
pub trait ServiceManager {
    /// List loaded agents and look for `label`.
    fn probe(&self, label: &str) -> ProbeOutcome;

    /// Register the agent described by the property list at `definition`.
    fn load(&self, definition: &Path) -> ControlOutcome;

    /// Deregister the agent described by the property list at `definition`.
    fn unload(&self, definition: &Path) -> ControlOutcome;

    /// Whether `label` is loaded.
    ///
    /// A listing that cannot be obtained counts as not loaded; the reason is
    /// logged.
    fn is_running(&self, label: &str) -> bool {
        match self.probe(label) {
            ProbeOutcome::Loaded => true,
            ProbeOutcome::NotLoaded => false,
            ProbeOutcome::Unavailable { reason } => {
                warn!(label = %label, reason = %reason, "Service listing unavailable, assuming not running");
                false
            }
        }
    }
}
