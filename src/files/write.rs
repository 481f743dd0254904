//! Atomic file writes with explicit permissions.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AutoupdateError, CommandErrorKind};

/// Write `content` to `path` and give it `mode`.
///
/// Content goes to an exclusive temporary file in the same directory first
/// and is renamed over the target, so a read-only target (the launcher
/// script is 0555) is replaced rather than opened for writing. Missing
/// parent directories are created.
pub fn write_atomic(path: &Path, content: &str, mode: u32) -> Result<(), AutoupdateError> {
    debug!(
        path = %path.display(),
        content_len = content.len(),
        mode = format!("{:o}", mode),
        "Writing file"
    );

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4().simple()
    );
    let temp_path = path.with_file_name(temp_name);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(|e| failed(format!("Failed to create temp file for {}: {}", path.display(), e)))?;

    let result = file
        .write_all(content.as_bytes())
        .and_then(|_| file.sync_all())
        .and_then(|_| fs::set_permissions(&temp_path, fs::Permissions::from_mode(mode)))
        .and_then(|_| fs::rename(&temp_path, path));

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(failed(format!("Failed to write {}: {}", path.display(), e)));
    }

    info!(path = %path.display(), bytes = content.len(), "File written");
    Ok(())
}

/// Create `path` and its parents if missing.
pub fn ensure_dir(path: &Path) -> Result<(), AutoupdateError> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)
        .map_err(|e| failed(format!("Failed to create directory {}: {}", path.display(), e)))?;
    debug!(path = %path.display(), "Directory created");
    Ok(())
}

/// Remove a file, treating an already-missing file as success.
///
/// Returns whether a file was actually removed.
pub fn remove_if_present(path: &Path) -> Result<bool, AutoupdateError> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "File removed");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(failed(format!("Failed to remove {}: {}", path.display(), e))),
    }
}

fn failed(message: String) -> AutoupdateError {
    AutoupdateError::Command {
        kind: CommandErrorKind::ExecutionFailed { message },
    }
}
