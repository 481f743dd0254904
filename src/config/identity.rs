//! Well-known paths and label of the managed agent.

use std::path::{Path, PathBuf};

/// File name of the launcher script.
pub const SCRIPT_NAME: &str = "updater";

/// File name older releases used for the launcher script.
pub const LEGACY_SCRIPT_NAME: &str = "brew_autoupdate";

/// File name of the structured options record kept next to the script.
pub const OPTIONS_RECORD_NAME: &str = "updater.json";

/// Identity of the managed agent.
///
/// Built once from [`Settings`](super::Settings) and passed by reference to
/// every component; nothing reads these paths from global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    /// launchd label.
    pub name: String,
    /// Package manager executable the script invokes.
    pub launcher_path: PathBuf,
    /// Launcher script path.
    pub script_path: PathBuf,
    /// Log directory.
    pub log_dir: PathBuf,
    /// Property list path.
    pub definition_path: PathBuf,
}

impl ServiceIdentity {
    pub fn new(
        name: &str,
        launcher_path: PathBuf,
        install_dir: PathBuf,
        log_dir: PathBuf,
        definition_path: PathBuf,
    ) -> Self {
        Self {
            name: name.to_string(),
            launcher_path,
            script_path: install_dir.join(SCRIPT_NAME),
            log_dir,
            definition_path,
        }
    }

    /// Directory holding the launcher script.
    pub fn install_dir(&self) -> &Path {
        self.script_path.parent().unwrap_or_else(|| Path::new("/"))
    }

    pub fn legacy_script_path(&self) -> PathBuf {
        self.install_dir().join(LEGACY_SCRIPT_NAME)
    }

    pub fn options_record_path(&self) -> PathBuf {
        self.install_dir().join(OPTIONS_RECORD_NAME)
    }

    /// The launcher script currently on disk, preferring the current name.
    pub fn installed_script(&self) -> Option<PathBuf> {
        [self.script_path.clone(), self.legacy_script_path()]
            .into_iter()
            .find(|path| path.is_file())
    }
}
