//! Launcher settings
//!
//! Settings for the launcher itself (not for the launched application).
//! Discovery order: explicit path, `$LAUNCHPAD_SETTINGS`, `./launcher.toml`,
//! `<config dir>/launchpad/launcher.toml`, built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming a settings file
pub const SETTINGS_ENV: &str = "LAUNCHPAD_SETTINGS";

/// Settings file name looked up in the working and config directories
pub const SETTINGS_FILE: &str = "launcher.toml";

/// Where the application is installed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallSettings {
    /// Root that manifest and resource paths are relative to
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Whole-request deadline
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Accept any server certificate
    #[serde(default)]
    pub insecure_tls: bool,

    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            insecure_tls: false,
            user_agent: None,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive used when RUST_LOG is unset
    #[serde(default = "default_level")]
    pub level: String,

    /// Also append log lines to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LauncherSettings {
    #[serde(default)]
    pub install: InstallSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl LauncherSettings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    /// Resolve and load settings, falling back to defaults when no file exists.
    ///
    /// An explicitly named file that cannot be read is an error; discovered
    /// files are only used when present.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(SETTINGS_ENV) {
            return Self::load(Path::new(&path));
        }
        for candidate in Self::candidate_paths() {
            if candidate.is_file() {
                return Self::load(&candidate);
            }
        }
        Ok(Self::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(SETTINGS_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("launchpad").join(SETTINGS_FILE));
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = LauncherSettings::default();
        assert_eq!(settings.install.root, PathBuf::from("."));
        assert_eq!(settings.network.timeout_secs, 30);
        assert!(!settings.network.insecure_tls);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("launcher.toml");
        fs::write(
            &path,
            "[install]\nroot = \"/opt/app\"\n\n[network]\ninsecure_tls = true\n",
        )
        .unwrap();

        let settings = LauncherSettings::load(&path).unwrap();
        assert_eq!(settings.install.root, PathBuf::from("/opt/app"));
        assert!(settings.network.insecure_tls);
        assert_eq!(settings.network.connect_timeout_secs, 10);
        assert_eq!(settings.logging, LoggingSettings::default());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(LauncherSettings::discover(Some(&missing)).is_err());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("launcher.toml");
        fs::write(&path, "[network\ntimeout_secs = ").unwrap();
        assert!(LauncherSettings::load(&path).is_err());
    }
}
