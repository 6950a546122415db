//! Updater - manifest comparison and incremental synchronization
//!
//! Guarantees:
//! 1. A run downloads only resources that are missing or size-mismatched
//! 2. Progress is byte-accurate and ends at exactly 1.0
//! 3. The local manifest is written before any resource, never half-written
//! 4. Interrupted runs resume at resource granularity on the next start
//! 5. One synchronizer per install root at a time
//!
//! There is no checksum or signature verification: a same-size corrupted file
//! counts as current.

pub mod checker;
pub mod lock;
pub mod sync;

pub use checker::UpdateChecker;
pub use lock::{SyncLock, SyncLockError};
pub use sync::{SyncReport, Synchronizer, CHUNK_SIZE};

/// Lock file name inside the install root
pub const LOCK_FILE: &str = ".launchpad.lock";
