//! Entry points and the launch context handed to them

use libloading::Library;
use std::fmt;
use std::os::raw::c_int;
use std::sync::Arc;

use super::loader::Boundary;
use crate::error::{LauncherError, Result};
use crate::manifest::Manifest;
use crate::ui::UiHandle;

/// Entry function registered by the embedding binary
pub type HostEntry = Arc<dyn Fn(&LaunchContext) -> anyhow::Result<()> + Send + Sync>;

/// Native entry symbol: returns 0 on success
pub type EntryFn = unsafe extern "C" fn() -> c_int;

/// What the launched application gets to see
#[derive(Clone)]
pub struct LaunchContext {
    pub manifest: Arc<Manifest>,
    /// This run installed a newer manifest
    pub new_version: bool,
    /// Arguments after `--`
    pub args: Vec<String>,
    pub boundary: Arc<Boundary>,
    pub ui: UiHandle,
}

impl fmt::Debug for LaunchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchContext")
            .field("version", &self.manifest.version)
            .field("new_version", &self.new_version)
            .field("args", &self.args)
            .finish()
    }
}

pub enum EntryTarget {
    Host(HostEntry),
    Symbol {
        symbol: String,
        func: EntryFn,
        // keeps `func` mapped
        _library: Arc<Library>,
    },
}

pub struct EntryPoint {
    class: String,
    module: String,
    target: EntryTarget,
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.target {
            EntryTarget::Host(_) => "host".to_string(),
            EntryTarget::Symbol { symbol, .. } => format!("symbol {}", symbol),
        };
        f.debug_struct("EntryPoint")
            .field("class", &self.class)
            .field("module", &self.module)
            .field("target", &target)
            .finish()
    }
}

impl EntryPoint {
    pub(crate) fn new(
        class: impl Into<String>,
        module: impl Into<String>,
        target: EntryTarget,
    ) -> Self {
        Self {
            class: class.into(),
            module: module.into(),
            target,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn is_host(&self) -> bool {
        matches!(self.target, EntryTarget::Host(_))
    }

    /// Run the entry point. Blocks until it returns.
    pub fn invoke(&self, context: &LaunchContext) -> Result<()> {
        let entry = format!("{}/{}", self.module, self.class);
        match &self.target {
            EntryTarget::Host(func) => {
                func(context).map_err(|source| LauncherError::Invoke { entry, source })
            }
            EntryTarget::Symbol { symbol, func, .. } => {
                // SAFETY: `func` was looked up with the `EntryFn` signature and
                // its library is kept loaded by `_library`.
                let status = unsafe { func() };
                if status == 0 {
                    Ok(())
                } else {
                    Err(LauncherError::Invoke {
                        entry,
                        source: anyhow::anyhow!("{} returned status {}", symbol, status),
                    })
                }
            }
        }
    }
}
