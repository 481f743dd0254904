//! Stopping and deleting the agent.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::ServiceIdentity;
use crate::error::AutoupdateResult;
use crate::files::remove_if_present;
use crate::launchd::{ControlOutcome, ServiceManager};

/// Outcome of `stop` or `delete`.
#[derive(Debug, Clone, Default)]
pub struct RemovalReport {
    /// Result of unloading; `None` when there was no definition to unload.
    pub unload: Option<ControlOutcome>,
    /// Files that were removed.
    pub removed: Vec<PathBuf>,
}

impl RemovalReport {
    pub fn summary(&self, action: &str) -> String {
        match &self.unload {
            None if self.removed.is_empty() => {
                "Autoupdate is not configured; nothing to do.\n".to_string()
            }
            Some(failed @ ControlOutcome::Failed { .. }) => format!(
                "Autoupdate has been {}, but `launchctl unload` {}.\n",
                action, failed
            ),
            _ => format!("Autoupdate has been {}.\n", action),
        }
    }
}

/// Unloads the agent and optionally removes its files.
pub struct Uninstaller<'a> {
    identity: &'a ServiceIdentity,
    manager: &'a dyn ServiceManager,
}

impl<'a> Uninstaller<'a> {
    pub fn new(identity: &'a ServiceIdentity, manager: &'a dyn ServiceManager) -> Self {
        Self { identity, manager }
    }

    /// Unload the agent, keeping its files so it reports as stopped.
    pub fn stop(&self) -> RemovalReport {
        let definition = &self.identity.definition_path;
        if !definition.is_file() {
            debug!(path = %definition.display(), "No service definition to unload");
            return RemovalReport::default();
        }

        let outcome = self.manager.unload(definition);
        info!(name = %self.identity.name, outcome = %outcome, "Autoupdate stopped");
        RemovalReport {
            unload: Some(outcome),
            removed: Vec::new(),
        }
    }

    /// Unload the agent and remove the definition, the launcher script (under
    /// either name) and the options record. Log files are kept.
    pub fn delete(&self) -> AutoupdateResult<RemovalReport> {
        let mut report = self.stop();
        let identity = self.identity;

        for path in [
            identity.definition_path.clone(),
            identity.script_path.clone(),
            identity.legacy_script_path(),
            identity.options_record_path(),
        ] {
            if remove_if_present(&path)? {
                report.removed.push(path);
            }
        }

        // Only succeeds when nothing else lives there
        if std::fs::remove_dir(identity.install_dir()).is_ok() {
            debug!(path = %identity.install_dir().display(), "Install directory removed");
        }

        info!(name = %identity.name, removed = report.removed.len(), "Autoupdate deleted");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launchd::ProbeOutcome;
    use std::cell::RefCell;
    use std::path::Path;

    struct RecordingManager {
        unloads: RefCell<Vec<PathBuf>>,
    }

    impl ServiceManager for RecordingManager {
        fn probe(&self, _label: &str) -> ProbeOutcome {
            ProbeOutcome::NotLoaded
        }

        fn load(&self, _definition: &Path) -> ControlOutcome {
            ControlOutcome::Succeeded
        }

        fn unload(&self, definition: &Path) -> ControlOutcome {
            self.unloads.borrow_mut().push(definition.to_path_buf());
            ControlOutcome::Succeeded
        }
    }

    fn setup() -> (tempfile::TempDir, ServiceIdentity) {
        let dir = tempfile::tempdir().unwrap();
        let id = ServiceIdentity::new(
            "org.example.au",
            PathBuf::from("/usr/local/bin/brew"),
            dir.path().join("support/au"),
            dir.path().join("logs"),
            dir.path().join("agent.plist"),
        );
        (dir, id)
    }

    fn manager() -> RecordingManager {
        RecordingManager {
            unloads: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn test_stop_without_definition_is_noop() {
        let (_dir, id) = setup();
        let manager = manager();
        let report = Uninstaller::new(&id, &manager).stop();
        assert!(report.unload.is_none());
        assert!(manager.unloads.borrow().is_empty());
        assert!(report.summary("stopped").contains("nothing to do"));
    }

    #[test]
    fn test_stop_keeps_files() {
        let (_dir, id) = setup();
        std::fs::create_dir_all(id.install_dir()).unwrap();
        std::fs::write(&id.definition_path, "<plist/>").unwrap();
        std::fs::write(&id.script_path, "#!/bin/bash\n").unwrap();

        let manager = manager();
        let report = Uninstaller::new(&id, &manager).stop();

        assert_eq!(report.unload, Some(ControlOutcome::Succeeded));
        assert!(id.definition_path.exists());
        assert!(id.script_path.exists());
        assert_eq!(report.summary("stopped"), "Autoupdate has been stopped.\n");
    }

    #[test]
    fn test_delete_removes_artifacts() {
        let (_dir, id) = setup();
        std::fs::create_dir_all(id.install_dir()).unwrap();
        std::fs::write(&id.definition_path, "<plist/>").unwrap();
        std::fs::write(&id.script_path, "#!/bin/bash\n").unwrap();
        std::fs::write(id.legacy_script_path(), "#!/bin/bash\n").unwrap();
        std::fs::write(id.options_record_path(), "{}").unwrap();

        let manager = manager();
        let report = Uninstaller::new(&id, &manager).delete().unwrap();

        assert_eq!(*manager.unloads.borrow(), vec![id.definition_path.clone()]);
        assert_eq!(report.removed.len(), 4);
        assert!(!id.definition_path.exists());
        assert!(!id.install_dir().exists());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, id) = setup();
        let manager = manager();
        let report = Uninstaller::new(&id, &manager).delete().unwrap();
        assert!(report.removed.is_empty());
        assert!(report.unload.is_none());
    }
}
