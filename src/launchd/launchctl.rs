//! `launchctl`-backed service manager.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::LaunchctlConfig;
use crate::executor::SubprocessBuilder;

use super::traits::{ControlOutcome, ProbeOutcome, ServiceManager};

/// Talks to launchd through the `launchctl` command.
#[derive(Debug, Clone)]
pub struct Launchctl {
    program: PathBuf,
    timeout: Duration,
}

impl Launchctl {
    pub fn new(config: &LaunchctlConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    fn control(&self, verb: &str, definition: &Path) -> ControlOutcome {
        let definition = definition.to_string_lossy();
        let result = SubprocessBuilder::new(&self.program)
            .args([verb, &*definition])
            .timeout(self.timeout)
            .run();

        match result {
            Ok(r) if r.success => {
                info!(verb = verb, definition = %definition, "launchctl request succeeded");
                ControlOutcome::Succeeded
            }
            Ok(r) => {
                let detail = r.detail();
                warn!(
                    verb = verb,
                    definition = %definition,
                    exit_code = ?r.exit_code,
                    detail = %detail,
                    "launchctl request failed"
                );
                ControlOutcome::Failed {
                    exit_code: r.exit_code,
                    detail,
                }
            }
            Err(e) => {
                warn!(verb = verb, definition = %definition, error = %e, "launchctl could not be run");
                ControlOutcome::Failed {
                    exit_code: None,
                    detail: e.to_string(),
                }
            }
        }
    }
}

impl ServiceManager for Launchctl {
    fn probe(&self, label: &str) -> ProbeOutcome {
        let result = SubprocessBuilder::new(&self.program)
            .arg("list")
            .timeout(self.timeout)
            .run();

        let outcome = match result {
            Ok(r) if r.success => {
                if r.stdout.contains(label) {
                    ProbeOutcome::Loaded
                } else {
                    ProbeOutcome::NotLoaded
                }
            }
            Ok(r) => ProbeOutcome::Unavailable {
                reason: format!(
                    "{} list exited with {:?}: {}",
                    self.program.display(),
                    r.exit_code,
                    r.detail()
                ),
            },
            Err(e) => ProbeOutcome::Unavailable {
                reason: e.to_string(),
            },
        };

        debug!(label = %label, outcome = ?outcome, "Probed service listing");
        outcome
    }

    fn load(&self, definition: &Path) -> ControlOutcome {
        self.control("load", definition)
    }

    fn unload(&self, definition: &Path) -> ControlOutcome {
        self.control("unload", definition)
    }
}
