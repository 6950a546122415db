//! Update detection
//!
//! An update exists when the remote manifest differs from the local one, or
//! when they agree but the install has drifted from what they describe.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::manifest::Manifest;
use crate::platform::Platform;
use crate::resource::Resource;

/// Compares manifests against each other and against the install root
#[derive(Debug, Clone)]
pub struct UpdateChecker {
    root: PathBuf,
    platform: Platform,
}

impl UpdateChecker {
    pub fn new(root: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            root: root.into(),
            platform,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// True if `remote` should be installed over `local`.
    ///
    /// Errors only when local state cannot be inspected.
    pub fn has_update(&self, local: &Manifest, remote: &Manifest) -> Result<bool> {
        if local != remote {
            debug!(
                "Manifest changed: {} -> {}",
                local.version, remote.version
            );
            return Ok(true);
        }

        for resource in remote.resources_for(self.platform) {
            if resource.is_stale(&self.root)? {
                debug!("Resource drifted: {}", resource.path);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Platform-applicable resources that need downloading, in manifest order
    pub fn stale_resources<'m>(&self, manifest: &'m Manifest) -> Result<Vec<&'m Resource>> {
        let mut stale = Vec::new();
        for resource in manifest.resources_for(self.platform) {
            if resource.is_stale(&self.root)? {
                stale.push(resource);
            }
        }
        Ok(stale)
    }
}
