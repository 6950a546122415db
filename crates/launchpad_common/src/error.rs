//! Launcher errors and exit status
//!
//! Every failure the bootstrap can hit is a `LauncherError`. Its `ErrorKind`
//! decides whether the orchestrator may recover (only a failed update check is
//! recoverable) and which exit status the process ends with.

use std::io;
use std::path::PathBuf;

use crate::transport::TransportError;

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for runtime failures (entry resolution, invocation, native loading)
pub const EXIT_RUNTIME_ERROR: i32 = 70;

/// Exit code for synchronization and local I/O failures
pub const EXIT_SYNC_ERROR: i32 = 74;

/// Exit code for configuration failures (manifest, grants, module graph)
pub const EXIT_CONFIG_ERROR: i32 = 78;

pub type Result<T> = std::result::Result<T, LauncherError>;

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid manifest, malformed grant, unresolvable module graph
    Configuration,
    /// Remote unreachable or returned garbage
    Network,
    /// Local state could not be inspected or written
    Synchronization,
    /// Native loading, grant application, entry resolution or invocation
    Runtime,
}

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Configuration => EXIT_CONFIG_ERROR,
            ErrorKind::Network | ErrorKind::Synchronization => EXIT_SYNC_ERROR,
            ErrorKind::Runtime => EXIT_RUNTIME_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("failed to parse manifest {origin}: {source}")]
    ManifestParse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to inspect local resource {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("install root is locked: {0}")]
    Locked(String),

    #[error("malformed grant statement `{statement}`: {reason}")]
    MalformedGrant { statement: String, reason: String },

    #[error("grant `{statement}` rejected: {reason}")]
    GrantRejected { statement: String, reason: String },

    #[error("invalid module descriptor {}: {reason}", path.display())]
    InvalidDescriptor { path: PathBuf, reason: String },

    #[error("module resolution failed: {0}")]
    Resolution(String),

    #[error("module not found! [layer={layer}, module={module}]")]
    ModuleNotFound { layer: String, module: String },

    #[error("failed to load native library {name}: {source}")]
    NativeLoad {
        name: String,
        #[source]
        source: libloading::Error,
    },

    #[error("entry point {entry} could not be resolved: {reason}")]
    EntryResolution { entry: String, reason: String },

    #[error("entry point {entry} failed: {source}")]
    Invoke {
        entry: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("UI thread is gone; cannot {0}")]
    UiUnavailable(&'static str),
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::InvalidManifest(_)
            | LauncherError::ManifestParse { .. }
            | LauncherError::InvalidUrl { .. }
            | LauncherError::MalformedGrant { .. }
            | LauncherError::InvalidDescriptor { .. }
            | LauncherError::Resolution(_)
            | LauncherError::ModuleNotFound { .. } => ErrorKind::Configuration,
            LauncherError::Fetch { .. } => ErrorKind::Network,
            LauncherError::Stat { .. } | LauncherError::Write { .. } | LauncherError::Locked(_) => {
                ErrorKind::Synchronization
            }
            LauncherError::GrantRejected { .. }
            | LauncherError::NativeLoad { .. }
            | LauncherError::EntryResolution { .. }
            | LauncherError::Invoke { .. }
            | LauncherError::UiUnavailable(_) => ErrorKind::Runtime,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LauncherError::Write {
            path: path.into(),
            source,
        }
    }
}
