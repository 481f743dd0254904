//! Reporting the installed agent's state and configuration.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate};
use tracing::debug;

use crate::config::ServiceIdentity;
use crate::launchd::{AgentDefinition, ServiceManager};

use super::options::{reconstruct, Provenance, ReconstructedOptions};

/// Install age, in days, from which reinstalling is suggested.
pub const STALE_AFTER_DAYS: i64 = 90;

const STALE_ADVISORY: &str = "Autoupdate has been running for more than 90 days. Please consider\n\
periodically deleting and re-starting this command to ensure the\n\
latest features are enabled for you.";

const UNKNOWN_DATE: &str = "Unable to determine date of command invocation. Please report this.";

const ISSUES_URL: &str = "https://github.com/Homebrew/homebrew-autoupdate/issues";

/// Overall state of the agent. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    InstalledButStopped,
    NotConfigured,
    Unknown,
}

impl ServiceState {
    /// Pick the state; earlier checks win.
    pub fn select(running: bool, script_exists: bool, definition_exists: bool) -> Self {
        if running {
            Self::Running
        } else if script_exists {
            Self::InstalledButStopped
        } else if !definition_exists {
            Self::NotConfigured
        } else {
            Self::Unknown
        }
    }
}

/// What the property list says about the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalReading {
    Seconds(i64),
    /// The document has no `StartInterval`.
    NotFound,
    /// The document could not be read or parsed.
    Unreadable(String),
}

/// Point-in-time view of the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: ServiceState,
    pub interval: IntervalReading,
    pub run_at_load: bool,
    pub options: Option<ReconstructedOptions>,
    pub installed_on: Option<NaiveDate>,
    pub stale: bool,
}

/// Whether an agent installed on `installed` should be reinstalled by `today`.
pub fn is_stale(installed: NaiveDate, today: NaiveDate) -> bool {
    (today - installed).num_days() >= STALE_AFTER_DAYS
}

/// Reinstall advisory for an agent installed on `installed`, if due.
pub fn staleness_advisory(installed: NaiveDate, today: NaiveDate) -> Option<&'static str> {
    is_stale(installed, today).then_some(STALE_ADVISORY)
}

/// Creation date of `path`, or its modification date when the filesystem
/// does not record creation times.
pub fn install_date(path: &Path) -> Option<NaiveDate> {
    let metadata = std::fs::metadata(path).ok()?;
    let time = metadata.created().or_else(|_| metadata.modified()).ok()?;
    Some(DateTime::<Local>::from(time).date_naive())
}

/// Builds [`StatusSnapshot`]s and renders them.
pub struct StatusReporter<'a> {
    identity: &'a ServiceIdentity,
    manager: &'a dyn ServiceManager,
}

impl<'a> StatusReporter<'a> {
    pub fn new(identity: &'a ServiceIdentity, manager: &'a dyn ServiceManager) -> Self {
        Self { identity, manager }
    }

    /// Snapshot as of the local date.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot_on(Local::now().date_naive())
    }

    /// Snapshot with staleness judged as of `today`.
    pub fn snapshot_on(&self, today: NaiveDate) -> StatusSnapshot {
        let identity = self.identity;
        let running = self.manager.is_running(&identity.name);
        let script = identity.installed_script();
        let definition_exists = identity.definition_path.is_file();

        let state = ServiceState::select(running, script.is_some(), definition_exists);

        let (interval, run_at_load) = match AgentDefinition::read(&identity.definition_path) {
            Ok(def) => (
                def.start_interval()
                    .map(IntervalReading::Seconds)
                    .unwrap_or(IntervalReading::NotFound),
                def.run_at_load().unwrap_or(false),
            ),
            Err(e) => {
                debug!(error = %e, "Service definition unreadable");
                (IntervalReading::Unreadable(e.to_string()), false)
            }
        };

        let installed_on = script.as_deref().and_then(install_date);
        let stale = installed_on.map(|d| is_stale(d, today)).unwrap_or(false);

        debug!(
            state = ?state,
            interval = ?interval,
            installed_on = ?installed_on,
            stale = stale,
            "Status snapshot taken"
        );

        StatusSnapshot {
            state,
            interval,
            run_at_load,
            options: reconstruct(identity),
            installed_on,
            stale,
        }
    }

    /// Snapshot and render in one step.
    pub fn report(&self) -> String {
        render(&self.snapshot())
    }
}

/// Render a snapshot as operator-facing text.
pub fn render(snapshot: &StatusSnapshot) -> String {
    let mut out = String::new();

    match snapshot.state {
        ServiceState::Running => {
            out.push_str("Autoupdate is installed and running.\n\nOptions:\n");
            push_options(&mut out, snapshot);
            out.push('\n');
            push_install_date(&mut out, snapshot);
        }
        ServiceState::InstalledButStopped => {
            out.push_str("Autoupdate is installed but stopped.\n\n");
            push_install_date(&mut out, snapshot);
            out.push_str("\nLast configured options (inactive while stopped):\n");
            push_options(&mut out, snapshot);
        }
        ServiceState::NotConfigured => {
            out.push_str("Autoupdate is not configured. Use `autoupdate start` to begin.\n");
        }
        ServiceState::Unknown => {
            let _ = writeln!(
                out,
                "Autoupdate cannot determine its status.\n\
                 Please feel free to file an issue with further information here:\n{}",
                ISSUES_URL
            );
        }
    }

    out
}

fn push_options(out: &mut String, snapshot: &StatusSnapshot) {
    let _ = match &snapshot.interval {
        IntervalReading::Seconds(secs) => writeln!(out, "Interval: {}", secs),
        IntervalReading::NotFound => {
            writeln!(out, "Interval: Not found, maybe using `StartCalendarInterval`")
        }
        IntervalReading::Unreadable(_) => {
            writeln!(out, "Interval: Unable to read the service definition")
        }
    };

    match &snapshot.options {
        Some(reconstructed) => {
            for flag in reconstructed.options.flags() {
                out.push_str(flag);
                out.push('\n');
            }
            if reconstructed.provenance == Provenance::Inferred {
                out.push_str("(options inferred from the launcher script; may be incomplete)\n");
            }
        }
        None => out.push_str("Unable to read the launcher script.\n"),
    }

    if snapshot.run_at_load {
        out.push_str("--immediate\n");
    }
}

fn push_install_date(out: &mut String, snapshot: &StatusSnapshot) {
    match snapshot.installed_on {
        Some(date) => {
            let _ = writeln!(out, "Autoupdate was initialised on {}.", date.format("%x"));
        }
        None => {
            out.push_str(UNKNOWN_DATE);
            out.push('\n');
        }
    }
    if snapshot.stale {
        out.push_str(STALE_ADVISORY);
        out.push('\n');
    }
}
