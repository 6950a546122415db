//! Install-root locking for the synchronizer
//!
//! Keeps two launchers from writing the same install at once:
//! - Lock file with PID, host and timestamp
//! - Stale, dead-owner and corrupted locks are recovered
//! - Released on drop

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use super::LOCK_FILE;

/// Maximum age of a lock before it's considered stale (5 minutes)
const MAX_LOCK_AGE_SECS: u64 = 300;

/// Lock file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID holding the lock
    pub pid: u32,
    /// Timestamp when lock was acquired (unix epoch seconds)
    pub acquired_at: u64,
    /// Hostname for debugging
    pub hostname: String,
    /// What the holder was doing
    pub step: String,
}

impl LockInfo {
    fn new(step: &str) -> Self {
        let hostname = fs::read_to_string("/etc/hostname")
            .map(|s| s.trim().to_string())
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            pid: process::id(),
            acquired_at: now_secs(),
            hostname,
            step: step.to_string(),
        }
    }

    fn age_secs(&self) -> u64 {
        now_secs().saturating_sub(self.acquired_at)
    }

    fn is_stale(&self) -> bool {
        self.age_secs() > MAX_LOCK_AGE_SECS
    }

    /// Without procfs a live owner cannot be ruled out; age decides
    fn process_exists(&self) -> bool {
        if cfg!(target_os = "linux") {
            Path::new(&format!("/proc/{}", self.pid)).exists()
        } else {
            true
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Errors from lock operations
#[derive(Debug)]
pub enum SyncLockError {
    /// Lock is held by another process
    AlreadyLocked { holder: LockInfo },
    /// IO error
    IoError(io::Error),
}

impl std::fmt::Display for SyncLockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyLocked { holder } => {
                write!(
                    f,
                    "held by PID {} on {} since {} seconds ago (step: {})",
                    holder.pid,
                    holder.hostname,
                    holder.age_secs(),
                    holder.step
                )
            }
            Self::IoError(e) => write!(f, "lock IO error: {}", e),
        }
    }
}

impl std::error::Error for SyncLockError {}

impl From<io::Error> for SyncLockError {
    fn from(e: io::Error) -> Self {
        Self::IoError(e)
    }
}

/// Sync lock handle - releases lock on drop
#[derive(Debug)]
pub struct SyncLock {
    lock_path: PathBuf,
}

impl SyncLock {
    /// Acquire the lock for the install at `root`
    pub fn acquire(root: &Path, step: &str) -> Result<Self, SyncLockError> {
        let lock_path = root.join(LOCK_FILE);
        fs::create_dir_all(root)?;

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path)?;
            match serde_json::from_str::<LockInfo>(&content) {
                Ok(holder) if holder.pid == process::id() => {
                    debug!("Reclaiming lock left by this process");
                    fs::remove_file(&lock_path)?;
                }
                Ok(holder) if holder.is_stale() => {
                    warn!(
                        "🔓  Recovering stale sync lock (pid={} age={}s)",
                        holder.pid,
                        holder.age_secs()
                    );
                    fs::remove_file(&lock_path)?;
                }
                Ok(holder) if !holder.process_exists() => {
                    warn!("🔓  Recovering sync lock of dead process {}", holder.pid);
                    fs::remove_file(&lock_path)?;
                }
                Ok(holder) => return Err(SyncLockError::AlreadyLocked { holder }),
                Err(e) => {
                    warn!("🔓  Recovering corrupted sync lock: {}", e);
                    fs::remove_file(&lock_path)?;
                }
            }
        }

        let info = LockInfo::new(step);
        let content = serde_json::to_string_pretty(&info)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // create_new: losing a race against another launcher surfaces as AlreadyExists
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        debug!("Sync lock acquired at {}", lock_path.display());
        Ok(Self { lock_path })
    }

    /// Check if we still hold the lock
    pub fn is_valid(&self) -> bool {
        fs::read_to_string(&self.lock_path)
            .ok()
            .and_then(|content| serde_json::from_str::<LockInfo>(&content).ok())
            .map(|info| info.pid == process::id())
            .unwrap_or(false)
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if self.is_valid() {
            match fs::remove_file(&self.lock_path) {
                Ok(()) => debug!("Sync lock released"),
                Err(e) => warn!("Failed to release sync lock: {}", e),
            }
        }
    }
}
