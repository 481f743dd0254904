//! Update options: composing them into the launcher command line and
//! recovering them from an installed agent.

use std::borrow::Cow;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ServiceIdentity;

/// Command run after `update` when upgrading formulae.
pub const UPGRADE_STEP: &str = "upgrade -v";

/// Command run after the formula upgrade when greedy cask upgrades are on.
pub const GREEDY_CASK_STEP: &str = "upgrade --cask -v --greedy";

/// Command run last when cleanup is on.
pub const CLEANUP_STEP: &str = "cleanup";

/// Options the agent can be started with.
///
/// `cleanup` and `greedy` only take effect together with `upgrade`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    #[serde(default)]
    pub upgrade: bool,
    #[serde(default)]
    pub cleanup: bool,
    #[serde(default)]
    pub greedy: bool,
}

impl UpdateOptions {
    /// Drop options that have no effect without `upgrade`.
    pub fn normalized(self) -> Self {
        if self.upgrade {
            self
        } else {
            Self::default()
        }
    }

    /// Steps chained after `update`, in execution order.
    pub fn steps(&self) -> Vec<&'static str> {
        let options = self.normalized();
        let mut steps = Vec::new();
        if options.upgrade {
            steps.push(UPGRADE_STEP);
            if options.greedy {
                steps.push(GREEDY_CASK_STEP);
            }
            if options.cleanup {
                steps.push(CLEANUP_STEP);
            }
        }
        steps
    }

    /// Command-line flags that reproduce these options.
    pub fn flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.upgrade {
            flags.push("--upgrade");
        }
        if self.cleanup {
            flags.push("--cleanup");
        }
        if self.greedy {
            flags.push("--greedy");
        }
        flags
    }
}

/// Build the launcher's command line.
pub fn compose_command_line(launcher: &Path, options: UpdateOptions) -> String {
    let launcher = shell_quote(&launcher.to_string_lossy()).into_owned();
    let mut line = format!("/bin/date && {} update", launcher);
    for step in options.steps() {
        line.push_str(&format!(" && {} {}", launcher, step));
    }
    line
}

/// Quote `word` for bash unless it only holds characters that never need it.
fn shell_quote(word: &str) -> Cow<'_, str> {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._+-@%:,=".contains(c));
    if plain {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

/// Guess the options from a launcher command line by looking for each step's
/// text. Gated options only count when the upgrade step is present.
pub fn infer_from_command_line(line: &str) -> UpdateOptions {
    let has = |step: &str| line.contains(&format!(" {}", step));
    let upgrade = has(UPGRADE_STEP);
    UpdateOptions {
        upgrade,
        cleanup: upgrade && has(CLEANUP_STEP),
        greedy: upgrade && has(GREEDY_CASK_STEP),
    }
}

/// Structured record written next to the launcher script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionsRecord {
    /// Version of autoupdate that wrote the record.
    pub version: String,
    pub options: UpdateOptions,
    pub start_interval: u64,
    pub run_at_load: bool,
}

impl OptionsRecord {
    pub fn new(options: UpdateOptions, start_interval: u64, run_at_load: bool) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            options,
            start_interval,
            run_at_load,
        }
    }
}

/// Where reconstructed options came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Read from the options record written at install time.
    Recorded,
    /// Guessed from the launcher script text; best effort.
    Inferred,
}

/// Options recovered from an installed agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructedOptions {
    pub options: UpdateOptions,
    pub provenance: Provenance,
}

/// Recover the options the agent was started with.
///
/// Prefers the options record; falls back to the last line of whichever
/// launcher script is installed. `None` when neither can be read.
pub fn reconstruct(identity: &ServiceIdentity) -> Option<ReconstructedOptions> {
    if let Some(record) = read_record(&identity.options_record_path()) {
        return Some(ReconstructedOptions {
            options: record.options.normalized(),
            provenance: Provenance::Recorded,
        });
    }

    let script = identity.installed_script()?;
    let content = match std::fs::read_to_string(&script) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %script.display(), error = %e, "Failed to read launcher script");
            return None;
        }
    };
    let last_line = content.lines().rev().find(|l| !l.trim().is_empty())?;

    Some(ReconstructedOptions {
        options: infer_from_command_line(last_line),
        provenance: Provenance::Inferred,
    })
}

/// Read the options record, treating a missing or unreadable one as absent.
pub fn read_record(path: &Path) -> Option<OptionsRecord> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring unreadable options record");
            None
        }
    }
}
