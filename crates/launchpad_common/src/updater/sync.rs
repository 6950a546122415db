//! Incremental resource synchronization
//!
//! Downloads exactly the stale resources, sequentially and in manifest order,
//! reporting byte-level progress. The manifest is persisted first, so an
//! interrupted run leaves a local manifest naming the intended state and the
//! size check picks up whatever is still missing on the next run.

use reqwest::Url;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::checker::UpdateChecker;
use super::lock::SyncLock;
use crate::error::{LauncherError, Result};
use crate::manifest::Manifest;
use crate::platform::Platform;
use crate::resource::Resource;
use crate::transport::{Transport, TransportError};

/// Copy buffer size
pub const CHUNK_SIZE: usize = 8192;

/// Outcome of one synchronization pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Paths downloaded, in order
    pub downloaded: Vec<String>,
    /// Declared size of the stale set (the progress denominator)
    pub total_bytes: u64,
    /// Bytes actually received
    pub received_bytes: u64,
}

/// Turns byte counts into a non-decreasing fraction that ends at exactly 1.0
#[derive(Debug)]
struct ProgressMeter {
    total: u64,
    settled: u64,
}

impl ProgressMeter {
    fn new(total: u64) -> Self {
        Self { total, settled: 0 }
    }

    /// `in_flight` bytes of a resource declared as `declared` bytes
    fn fraction(&self, in_flight: u64, declared: u64) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        let current = self.settled + in_flight.min(declared);
        (current as f64 / self.total as f64).min(1.0)
    }

    fn settle(&mut self, declared: u64) -> f64 {
        self.settled += declared;
        self.fraction(0, 0)
    }
}

pub struct Synchronizer<'t> {
    transport: &'t dyn Transport,
    checker: UpdateChecker,
}

impl<'t> Synchronizer<'t> {
    pub fn new(transport: &'t dyn Transport, root: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            transport,
            checker: UpdateChecker::new(root, platform),
        }
    }

    fn root(&self) -> &Path {
        self.checker.root()
    }

    /// Persist `manifest` locally, then download its stale resources.
    ///
    /// Holds the install-root lock for the whole pass.
    pub fn install(
        &self,
        manifest: &Manifest,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<SyncReport> {
        let _lock = SyncLock::acquire(self.root(), "sync")
            .map_err(|e| LauncherError::Locked(e.to_string()))?;

        self.write_manifest(manifest)?;

        let resources = manifest.resources_for(self.checker.platform());
        if resources.is_empty() {
            return Ok(SyncReport::default());
        }
        let base = manifest.base_url()?;
        self.sync(&resources, &base, on_progress)
    }

    /// Write the serialized manifest through a temporary file and rename
    pub fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf> {
        let path = manifest.local_manifest_path(self.root());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LauncherError::write(parent, e))?;
        }

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let json = manifest.to_json_pretty()?;
        fs::write(&temp_path, json).map_err(|e| LauncherError::write(&temp_path, e))?;
        fs::rename(&temp_path, &path).map_err(|e| LauncherError::write(&path, e))?;

        debug!("Local manifest written to {}", path.display());
        Ok(path)
    }

    /// Download the stale subset of `resources` from `base`.
    ///
    /// Current resources are skipped without touching the transport.
    pub fn sync(
        &self,
        resources: &[&Resource],
        base: &Url,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<SyncReport> {
        let mut stale = Vec::new();
        for resource in resources {
            if resource.is_stale(self.root())? {
                stale.push(*resource);
            }
        }

        let mut report = SyncReport {
            total_bytes: stale.iter().map(|r| r.size).sum(),
            ..SyncReport::default()
        };

        if stale.is_empty() {
            debug!("Nothing to download");
            return Ok(report);
        }

        info!(
            "📥  Downloading {} resource(s), {} bytes",
            stale.len(),
            report.total_bytes
        );

        on_progress(0.0);
        let mut meter = ProgressMeter::new(report.total_bytes);
        for resource in stale {
            let received = self.download(resource, base, &mut meter, on_progress)?;
            report.received_bytes += received;
            report.downloaded.push(resource.path.clone());
        }

        Ok(report)
    }

    fn download(
        &self,
        resource: &Resource,
        base: &Url,
        meter: &mut ProgressMeter,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<u64> {
        let url = resource.remote_url(base)?;
        let local = resource.local_path(self.root());

        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).map_err(|e| LauncherError::write(parent, e))?;
        }

        let fetch_error = |source: TransportError| LauncherError::Fetch {
            url: url.to_string(),
            source,
        };

        let mut stream = self.transport.open(&url).map_err(fetch_error)?;
        let mut file = File::create(&local).map_err(|e| LauncherError::write(&local, e))?;

        let mut buffer = [0u8; CHUNK_SIZE];
        let mut received: u64 = 0;
        loop {
            let n = match stream.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(fetch_error(TransportError::Io(e))),
            };
            file.write_all(&buffer[..n])
                .map_err(|e| LauncherError::write(&local, e))?;
            received += n as u64;
            on_progress(meter.fraction(received, resource.size));
        }
        file.sync_all()
            .map_err(|e| LauncherError::write(&local, e))?;

        if received != resource.size {
            warn!(
                "⚠️  {} is {} bytes, manifest declares {}; it will be retried next run",
                resource.path, received, resource.size
            );
        }

        on_progress(meter.settle(resource.size));
        info!("✅  Updated {}", resource.path);
        Ok(received)
    }
}
