//! Configuration settings for autoupdate.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::AutoupdateError;

use super::identity::ServiceIdentity;

/// Main configuration structure.
///
/// Every section is optional; an empty file (or no file at all) yields the
/// stock Homebrew layout under the user's home directory.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub launchctl: LaunchctlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Service layout configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// launchd label of the agent.
    #[serde(default = "default_name")]
    pub name: String,
    /// Package manager executable invoked by the launcher script.
    #[serde(default = "default_launcher")]
    pub launcher: PathBuf,
    /// Directory holding the launcher script.
    pub install_dir: Option<PathBuf>,
    /// Directory receiving the agent's stdout/stderr.
    pub log_dir: Option<PathBuf>,
    /// Path of the property list.
    pub definition_path: Option<PathBuf>,
}

/// launchctl invocation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchctlConfig {
    /// Path to the launchctl binary.
    #[serde(default = "default_launchctl_program")]
    pub program: PathBuf,
    /// Timeout for each launchctl invocation in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_name() -> String {
    "com.github.domt4.homebrew-autoupdate".to_string()
}

fn default_launcher() -> PathBuf {
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        PathBuf::from("/opt/homebrew/bin/brew")
    } else {
        PathBuf::from("/usr/local/bin/brew")
    }
}

fn default_launchctl_program() -> PathBuf {
    PathBuf::from("/bin/launchctl")
}

fn default_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            launcher: default_launcher(),
            install_dir: None,
            log_dir: None,
            definition_path: None,
        }
    }
}

impl Default for LaunchctlConfig {
    fn default() -> Self {
        Self {
            program: default_launchctl_program(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AutoupdateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AutoupdateError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::parse(&content).map_err(|e| match e {
            AutoupdateError::Config { message } => AutoupdateError::Config {
                message: format!("{} ({})", message, path.display()),
            },
            other => other,
        })
    }

    /// Load from an explicit path, or from the default location when it
    /// exists, or fall back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, AutoupdateError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Default configuration file location (`<config dir>/autoupdate/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("autoupdate").join("config.toml"))
    }

    /// Parse settings from TOML text.
    pub fn parse(content: &str) -> Result<Self, AutoupdateError> {
        let settings: Settings = toml::from_str(content).map_err(|e| AutoupdateError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Build the service identity, resolving unset paths against the
    /// current user's home directory.
    pub fn identity(&self) -> Result<ServiceIdentity, AutoupdateError> {
        let home = dirs::home_dir().ok_or_else(|| AutoupdateError::Config {
            message: "Unable to determine the home directory".to_string(),
        })?;
        Ok(self.identity_for_home(&home))
    }

    /// Build the service identity relative to `home`.
    pub fn identity_for_home(&self, home: &Path) -> ServiceIdentity {
        let service = &self.service;
        let name = service.name.as_str();

        let install_dir = service
            .install_dir
            .clone()
            .unwrap_or_else(|| home.join("Library/Application Support").join(name));
        let log_dir = service
            .log_dir
            .clone()
            .unwrap_or_else(|| home.join("Library/Logs").join(name));
        let definition_path = service.definition_path.clone().unwrap_or_else(|| {
            home.join("Library/LaunchAgents")
                .join(format!("{}.plist", name))
        });

        ServiceIdentity::new(
            name,
            service.launcher.clone(),
            install_dir,
            log_dir,
            definition_path,
        )
    }

    /// Validate the settings.
    fn validate(&self) -> Result<(), AutoupdateError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(AutoupdateError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(AutoupdateError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        // The label ends up in file names and in launchctl's listing
        let name = &self.service.name;
        if name.is_empty()
            || name
                .chars()
                .any(|c| c.is_whitespace() || c == '/' || c == '<' || c == '&')
        {
            return Err(AutoupdateError::Config {
                message: format!("Invalid service name '{}'", name),
            });
        }

        if self.launchctl.timeout_seconds == 0 {
            return Err(AutoupdateError::Config {
                message: "launchctl.timeout_seconds must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
