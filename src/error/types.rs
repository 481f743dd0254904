//! Error types for autoupdate.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for autoupdate operations.
#[derive(Error, Debug)]
pub enum AutoupdateError {
    /// The agent is already loaded; `start` refuses to overwrite it.
    #[error(
        "The command already appears to have been started ({name}).\n\
         Please run `autoupdate delete` and try again."
    )]
    AlreadyRunning { name: String },

    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// External command errors.
    #[error("Command error: {kind}")]
    Command { kind: CommandErrorKind },

    /// Template-related errors.
    #[error("Template error: {message}")]
    Template { message: String },

    /// Property list errors.
    #[error("Service definition error: {kind}")]
    Definition { kind: DefinitionErrorKind },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Command error kinds.
#[derive(Error, Debug)]
pub enum CommandErrorKind {
    #[error("Command execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("Command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

/// Property list error kinds.
#[derive(Error, Debug)]
pub enum DefinitionErrorKind {
    #[error("Malformed property list {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("No top-level <dict> in {path}")]
    MissingDict { path: PathBuf },
}

/// Result type alias for autoupdate operations.
pub type AutoupdateResult<T> = Result<T, AutoupdateError>;
