//! Installing and activating the agent.

use std::path::{Path, PathBuf};

use quick_xml::escape::escape;
use tracing::{debug, info, warn};

use crate::config::ServiceIdentity;
use crate::error::{AutoupdateError, AutoupdateResult};
use crate::files::{ensure_dir, is_writable, write_atomic, WritableCheck};
use crate::launchd::{ControlOutcome, ServiceManager};
use crate::templates::{TemplateEngine, AGENT_PLIST, UPDATER_SCRIPT};

use super::options::{compose_command_line, OptionsRecord, UpdateOptions};

/// Seconds between runs.
pub const START_INTERVAL_SECS: u64 = 86_400;

const SCRIPT_MODE: u32 = 0o555;
const DATA_MODE: u32 = 0o644;

/// Where the agent's output is redirected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl LogPaths {
    fn in_dir(dir: &Path, name: &str) -> Self {
        Self {
            stdout: dir.join(format!("{}.out", name)),
            stderr: dir.join(format!("{}.err", name)),
        }
    }
}

/// Choose the log directory: the configured one if it exists and is
/// writable, else its parent if writable, else none.
///
/// The configured directory can end up owned by another user when someone
/// loads the agent by hand, so an unwritable one is not an error.
pub fn resolve_log_paths(identity: &ServiceIdentity, writable: WritableCheck) -> Option<LogPaths> {
    let log_dir = identity.log_dir.as_path();
    if log_dir.is_dir() && writable(log_dir) {
        return Some(LogPaths::in_dir(log_dir, &identity.name));
    }

    match log_dir.parent() {
        Some(parent) if parent.is_dir() && writable(parent) => {
            debug!(
                log_dir = %log_dir.display(),
                fallback = %parent.display(),
                "Log directory unusable, falling back to its parent"
            );
            Some(LogPaths::in_dir(parent, &identity.name))
        }
        _ => None,
    }
}

/// Outcome of a successful `start`.
#[derive(Debug, Clone)]
pub struct StartReport {
    pub script_path: PathBuf,
    pub definition_path: PathBuf,
    pub log_paths: Option<LogPaths>,
    /// Options as written, after normalization.
    pub options: UpdateOptions,
    /// Operator-facing warnings about recoverable problems.
    pub warnings: Vec<String>,
    /// Result of loading the agent. Files stay written when this failed.
    pub activation: ControlOutcome,
}

impl StartReport {
    /// Message for the operator.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for warning in &self.warnings {
            out.push_str(warning);
            out.push('\n');
        }

        match &self.activation {
            ControlOutcome::Succeeded => {
                out.push_str(
                    "Autoupdate will now automatically update every 24 hours, or on system boot.\n",
                );
            }
            failed => {
                out.push_str(&format!(
                    "The agent was written to {} but `launchctl load` {}.\n\
                     Fix the problem above and run `autoupdate start` again.\n",
                    self.definition_path.display(),
                    failed
                ));
            }
        }
        out
    }
}

/// Writes the launcher script and property list and loads the agent.
pub struct Installer<'a> {
    identity: &'a ServiceIdentity,
    manager: &'a dyn ServiceManager,
    templates: &'a TemplateEngine,
    writable: WritableCheck,
}

impl<'a> Installer<'a> {
    pub fn new(
        identity: &'a ServiceIdentity,
        manager: &'a dyn ServiceManager,
        templates: &'a TemplateEngine,
    ) -> Self {
        Self {
            identity,
            manager,
            templates,
            writable: is_writable,
        }
    }

    /// Replace the log directory writability check.
    pub fn with_writable_check(mut self, check: WritableCheck) -> Self {
        self.writable = check;
        self
    }

    /// Install the agent with `options` and load it.
    ///
    /// Fails with [`AutoupdateError::AlreadyRunning`] when the agent is
    /// loaded. Not transactional: files written before a failure stay, and
    /// running `start` again overwrites them.
    pub fn start(&self, options: UpdateOptions) -> AutoupdateResult<StartReport> {
        let identity = self.identity;

        if self.manager.is_running(&identity.name) {
            return Err(AutoupdateError::AlreadyRunning {
                name: identity.name.clone(),
            });
        }

        let mut warnings = Vec::new();
        let effective = options.normalized();
        if effective != options {
            warnings.push("--cleanup and --greedy have no effect without --upgrade.".to_string());
        }

        ensure_dir(identity.install_dir())?;
        if let Err(e) = ensure_dir(&identity.log_dir) {
            debug!(error = %e, "Could not create log directory");
        }

        let log_paths = resolve_log_paths(identity, self.writable);
        if log_paths.is_none() {
            warn!(log_dir = %identity.log_dir.display(), "No writable log directory");
            warnings.push(format!(
                "{} does not seem to be writable.\nYou may wish to `chown` it back to your user.",
                identity.log_dir.display()
            ));
        }

        let script = self.render_script(effective)?;
        write_atomic(&identity.script_path, &script, SCRIPT_MODE)?;

        let record = OptionsRecord::new(effective, START_INTERVAL_SECS, true);
        let mut record_json = serde_json::to_string_pretty(&record)?;
        record_json.push('\n');
        write_atomic(&identity.options_record_path(), &record_json, DATA_MODE)?;

        let definition = self.render_definition(log_paths.as_ref())?;
        write_atomic(&identity.definition_path, &definition, DATA_MODE)?;

        let activation = self.manager.load(&identity.definition_path);

        info!(
            name = %identity.name,
            upgrade = effective.upgrade,
            cleanup = effective.cleanup,
            greedy = effective.greedy,
            activation = %activation,
            "Autoupdate installed"
        );

        Ok(StartReport {
            script_path: identity.script_path.clone(),
            definition_path: identity.definition_path.clone(),
            log_paths,
            options: effective,
            warnings,
            activation,
        })
    }

    /// Render the launcher script for `options`.
    pub fn render_script(&self, options: UpdateOptions) -> AutoupdateResult<String> {
        let command_line = compose_command_line(&self.identity.launcher_path, options);
        self.templates.render(
            UPDATER_SCRIPT,
            &serde_json::json!({ "command_line": command_line }),
        )
    }

    /// Render the property list, with output redirected to `log_paths` when given.
    pub fn render_definition(&self, log_paths: Option<&LogPaths>) -> AutoupdateResult<String> {
        let identity = self.identity;
        let context = serde_json::json!({
            "label": escape(identity.name.as_str()),
            "program": xml_text(&identity.script_path),
            "run_at_load": true,
            "stderr_path": log_paths.map(|p| xml_text(&p.stderr)),
            "stdout_path": log_paths.map(|p| xml_text(&p.stdout)),
            "start_interval": START_INTERVAL_SECS,
        });
        self.templates.render(AGENT_PLIST, &context)
    }
}

fn xml_text(path: &Path) -> String {
    escape(&*path.to_string_lossy()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launchd::{AgentDefinition, PlistValue, ProbeOutcome};
    use std::cell::RefCell;

    struct FakeManager {
        outcome: ProbeOutcome,
        loads: RefCell<Vec<PathBuf>>,
    }

    impl FakeManager {
        fn new(outcome: ProbeOutcome) -> Self {
            Self {
                outcome,
                loads: RefCell::new(Vec::new()),
            }
        }
    }

    impl ServiceManager for FakeManager {
        fn probe(&self, _label: &str) -> ProbeOutcome {
            self.outcome.clone()
        }

        fn load(&self, definition: &Path) -> ControlOutcome {
            self.loads.borrow_mut().push(definition.to_path_buf());
            ControlOutcome::Succeeded
        }

        fn unload(&self, _definition: &Path) -> ControlOutcome {
            ControlOutcome::Succeeded
        }
    }

    fn identity(root: &Path) -> ServiceIdentity {
        ServiceIdentity::new(
            "org.example.au",
            PathBuf::from("/usr/local/bin/brew"),
            root.join("support/au"),
            root.join("logs/au"),
            root.join("agents/org.example.au.plist"),
        )
    }

    fn always(_: &Path) -> bool {
        true
    }

    fn never(_: &Path) -> bool {
        false
    }

    #[test]
    fn test_refuses_when_running() {
        let dir = tempfile::tempdir().unwrap();
        let id = identity(dir.path());
        let manager = FakeManager::new(ProbeOutcome::Loaded);
        let templates = TemplateEngine::new().unwrap();

        let result = Installer::new(&id, &manager, &templates).start(UpdateOptions::default());

        assert!(matches!(result, Err(AutoupdateError::AlreadyRunning { .. })));
        assert!(!id.script_path.exists());
        assert!(manager.loads.borrow().is_empty());
    }

    #[test]
    fn test_start_writes_artifacts_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let id = identity(dir.path());
        let manager = FakeManager::new(ProbeOutcome::NotLoaded);
        let templates = TemplateEngine::new().unwrap();
        let options = UpdateOptions {
            upgrade: true,
            cleanup: true,
            greedy: false,
        };

        let report = Installer::new(&id, &manager, &templates)
            .with_writable_check(always)
            .start(options)
            .unwrap();

        let script = std::fs::read_to_string(&id.script_path).unwrap();
        assert_eq!(
            script,
            "#!/bin/bash\n/bin/date && /usr/local/bin/brew update \
             && /usr/local/bin/brew upgrade -v && /usr/local/bin/brew cleanup\n"
        );

        let def = AgentDefinition::read(&id.definition_path).unwrap();
        assert_eq!(def.label(), Some("org.example.au"));
        assert_eq!(def.start_interval(), Some(86_400));
        assert_eq!(def.run_at_load(), Some(true));
        let script_str = id.script_path.to_string_lossy().into_owned();
        assert_eq!(def.get("Program"), Some(&PlistValue::String(script_str.clone())));
        assert_eq!(
            def.get("ProgramArguments"),
            Some(&PlistValue::Array(vec![PlistValue::String(script_str)]))
        );
        let out = id.log_dir.join("org.example.au.out");
        assert_eq!(
            def.get("StandardOutPath"),
            Some(&PlistValue::String(out.to_string_lossy().into_owned()))
        );

        assert!(report.warnings.is_empty());
        assert!(report.activation.is_success());
        assert_eq!(*manager.loads.borrow(), vec![id.definition_path.clone()]);
    }

    #[test]
    fn test_cleanup_without_upgrade_warns_and_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let id = identity(dir.path());
        let manager = FakeManager::new(ProbeOutcome::NotLoaded);
        let templates = TemplateEngine::new().unwrap();

        let report = Installer::new(&id, &manager, &templates)
            .with_writable_check(always)
            .start(UpdateOptions {
                cleanup: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(report.options, UpdateOptions::default());
        assert_eq!(report.warnings.len(), 1);
        let script = std::fs::read_to_string(&id.script_path).unwrap();
        assert!(!script.contains("cleanup"));
    }

    #[test]
    fn test_unwritable_logs_warns_but_completes() {
        let dir = tempfile::tempdir().unwrap();
        let id = identity(dir.path());
        let manager = FakeManager::new(ProbeOutcome::NotLoaded);
        let templates = TemplateEngine::new().unwrap();

        let report = Installer::new(&id, &manager, &templates)
            .with_writable_check(never)
            .start(UpdateOptions::default())
            .unwrap();

        assert!(report.log_paths.is_none());
        assert!(report.warnings[0].contains("does not seem to be writable"));
        assert!(id.script_path.exists());
        let definition = std::fs::read_to_string(&id.definition_path).unwrap();
        assert!(!definition.contains("StandardOutPath"));
        assert!(!definition.contains("StandardErrorPath"));
    }

    #[test]
    fn test_resolve_prefers_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let id = identity(dir.path());
        std::fs::create_dir_all(&id.log_dir).unwrap();

        let paths = resolve_log_paths(&id, always).unwrap();
        assert_eq!(paths.stdout, id.log_dir.join("org.example.au.out"));
        assert_eq!(paths.stderr, id.log_dir.join("org.example.au.err"));
    }

    #[test]
    fn test_resolve_falls_back_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let id = identity(dir.path());
        std::fs::create_dir_all(&id.log_dir).unwrap();

        fn only_parent(path: &Path) -> bool {
            !path.ends_with("au")
        }

        let paths = resolve_log_paths(&id, only_parent).unwrap();
        let parent = id.log_dir.parent().unwrap();
        assert_eq!(paths.stdout, parent.join("org.example.au.out"));
    }

    #[test]
    fn test_resolve_none_when_nothing_writable() {
        let dir = tempfile::tempdir().unwrap();
        let id = identity(dir.path());
        std::fs::create_dir_all(&id.log_dir).unwrap();
        assert_eq!(resolve_log_paths(&id, never), None);
    }

    #[test]
    fn test_definition_escapes_paths() {
        let id = identity(Path::new("/tmp/R&D"));
        let manager = FakeManager::new(ProbeOutcome::NotLoaded);
        let templates = TemplateEngine::new().unwrap();
        let logs = LogPaths::in_dir(Path::new("/tmp/R&D/logs"), &id.name);

        let xml = Installer::new(&id, &manager, &templates)
            .render_definition(Some(&logs))
            .unwrap();

        assert!(xml.contains("<string>/tmp/R&amp;D/support/au/updater</string>"));
        let def = AgentDefinition::parse(&xml, Path::new("test.plist")).unwrap();
        assert_eq!(
            def.get("StandardErrorPath"),
            Some(&PlistValue::String("/tmp/R&D/logs/org.example.au.err".to_string()))
        );
    }

    #[test]
    fn test_summary_mentions_failed_load() {
        let report = StartReport {
            script_path: PathBuf::from("/tmp/updater"),
            definition_path: PathBuf::from("/tmp/agent.plist"),
            log_paths: None,
            options: UpdateOptions::default(),
            warnings: vec!["careful".to_string()],
            activation: ControlOutcome::Failed {
                exit_code: Some(5),
                detail: String::new(),
            },
        };
        let summary = report.summary();
        assert!(summary.starts_with("careful\n"));
        assert!(summary.contains("failed with exit code 5"));
        assert!(summary.contains("autoupdate start"));
    }
}
