//! Configuration file resolution
//!
//! Every qcall service reads a TOML bootstrap file. The file is located with
//! the following priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`<config_dir>/qcall/<file>`)
//! 4. System-wide `/etc/qcall/<file>` (unix only)
//!
//! When none of these yields a file the service runs on built-in defaults.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name used under the platform config directory
pub const APP_DIR: &str = "qcall";

/// Where a resolved configuration file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment,
    UserConfigDir,
    SystemConfigDir,
}

/// Locates a service's TOML configuration file
#[derive(Debug, Clone)]
pub struct ConfigFileResolver {
    env_var: String,
    file_name: String,
}

impl ConfigFileResolver {
    /// Create a resolver for `file_name`, overridable through `env_var`
    pub fn new(env_var: &str, file_name: &str) -> Self {
        Self {
            env_var: env_var.to_string(),
            file_name: file_name.to_string(),
        }
    }

    /// Resolve the configuration file path.
    ///
    /// Explicit paths (CLI or environment) are returned even if the file is
    /// missing, so the caller reports the error instead of silently falling
    /// back to defaults. Implicit locations are only returned when present.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<(PathBuf, ConfigSource)> {
        if let Some(path) = cli_arg {
            return Some((path.to_path_buf(), ConfigSource::CommandLine));
        }

        if let Ok(path) = std::env::var(&self.env_var) {
            if !path.trim().is_empty() {
                return Some((PathBuf::from(path), ConfigSource::Environment));
            }
        }

        if let Some(path) = self.user_config_path() {
            if path.exists() {
                return Some((path, ConfigSource::UserConfigDir));
            }
            debug!("No user config at {}", path.display());
        }

        let system = self.system_config_path();
        if let Some(path) = system {
            if path.exists() {
                return Some((path, ConfigSource::SystemConfigDir));
            }
        }

        None
    }

    /// Per-user configuration file location
    pub fn user_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(&self.file_name))
    }

    fn system_config_path(&self) -> Option<PathBuf> {
        if cfg!(unix) {
            Some(PathBuf::from("/etc").join(APP_DIR).join(&self.file_name))
        } else {
            None
        }
    }
}

/// Read a TOML file into a typed configuration value
pub fn read_toml_file<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    let value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(value)
}
