//! Host platform detection
//!
//! The current platform is detected once at startup and then handed to the
//! checker, synchronizer and orchestrator explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Mac,
    Linux,
    Win,
    /// Unknown host, or a resource that applies everywhere
    Common,
}

impl Platform {
    /// Detect the platform this process runs on
    pub fn detect() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Classify an OS identification string.
    ///
    /// `darwin` contains `win`, so the mac checks must run first.
    pub fn from_os_name(os: &str) -> Self {
        let os = os.to_lowercase();
        if os.contains("mac") || os.contains("darwin") {
            Platform::Mac
        } else if os.contains("nux") {
            Platform::Linux
        } else if os.contains("win") {
            Platform::Win
        } else {
            Platform::Common
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Mac => "MAC",
            Platform::Linux => "LINUX",
            Platform::Win => "WIN",
            Platform::Common => "COMMON",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized platform `{0}`")]
pub struct ParsePlatformError(String);

impl FromStr for Platform {
    type Err = ParsePlatformError;

    /// Lenient parse: any text mentioning a platform name selects it
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        if lower.contains("win") && !lower.contains("darwin") {
            Ok(Platform::Win)
        } else if lower.contains("mac") || lower.contains("darwin") {
            Ok(Platform::Mac)
        } else if lower.contains("linux") {
            Ok(Platform::Linux)
        } else if lower.contains("common") {
            Ok(Platform::Common)
        } else {
            Err(ParsePlatformError(s.to_string()))
        }
    }
}
