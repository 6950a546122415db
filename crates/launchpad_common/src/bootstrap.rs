//! Bootstrap orchestration
//!
//! `INIT → CHECK_UPDATE → (SYNC) → BUILD_BOUNDARY → RESOLVE_ENTRY → INVOKE`
//!
//! Runs on the `launcher` worker thread. Only a failed update check is
//! recovered (the local manifest is used); every other failure stops the
//! launch and is reported through the view.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{LauncherError, Result};
use crate::manifest::{Manifest, Overrides};
use crate::modules::{Boundary, Layer, LaunchContext, LoadRequest, ModuleLoader};
use crate::platform::Platform;
use crate::transport::Transport;
use crate::ui::UiHandle;
use crate::updater::{Synchronizer, UpdateChecker};
use crate::view::LauncherView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    CheckUpdate,
    Sync,
    BuildBoundary,
    ResolveEntry,
    Invoke,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "INIT",
            Stage::CheckUpdate => "CHECK_UPDATE",
            Stage::Sync => "SYNC",
            Stage::BuildBoundary => "BUILD_BOUNDARY",
            Stage::ResolveEntry => "RESOLVE_ENTRY",
            Stage::Invoke => "INVOKE",
            Stage::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Everything the bootstrap needs besides the manifest
#[derive(Clone)]
pub struct BootstrapEnv {
    pub root: PathBuf,
    pub platform: Platform,
    pub transport: Arc<dyn Transport>,
    pub host: Arc<Layer>,
    pub view: Arc<dyn LauncherView>,
    pub ui: UiHandle,
    /// Forwarded to the application
    pub args: Vec<String>,
}

pub struct Bootstrap {
    env: BootstrapEnv,
    loader: ModuleLoader,
    manifest: Arc<Manifest>,
    new_version: bool,
    stage: Stage,
}

impl Bootstrap {
    /// Embedded manifest, then overrides, then the local manifest if one was
    /// synchronized before. Nothing touches the network or disk writes here.
    pub fn init(embedded: &str, overrides: &Overrides, root: &Path) -> Result<Manifest> {
        let mut manifest = Manifest::embedded(embedded)?.with_overrides(overrides);

        let local = manifest.local_manifest_path(root);
        if local.is_file() {
            debug!("Using local manifest {}", local.display());
            manifest = Manifest::load(&local)?;
        }

        manifest.validate()?;
        Ok(manifest)
    }

    pub fn new(env: BootstrapEnv, manifest: Manifest) -> Self {
        let loader = ModuleLoader::new(Arc::clone(&env.host));
        Self {
            env,
            loader,
            manifest: Arc::new(manifest),
            new_version: false,
            stage: Stage::Init,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.manifest
    }

    pub fn new_version(&self) -> bool {
        self.new_version
    }

    /// Run every remaining stage. On failure `stage()` tells where it stopped.
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_stages();
        if let Err(e) = &result {
            error!("❌ Launch failed during {}: {}", self.stage, e);
        }
        result
    }

    fn run_stages(&mut self) -> Result<()> {
        self.enter(Stage::CheckUpdate);
        if let Some(remote) = self.check_update()? {
            self.enter(Stage::Sync);
            self.sync(remote)?;
        }

        self.enter(Stage::BuildBoundary);
        let boundary = Arc::new(self.build_boundary()?);

        self.enter(Stage::ResolveEntry);
        let entry = boundary.resolve_entry(&self.manifest.launch_class)?;

        self.enter(Stage::Invoke);
        let context = LaunchContext {
            manifest: Arc::clone(&self.manifest),
            new_version: self.new_version,
            args: self.env.args.clone(),
            boundary,
            ui: self.env.ui.clone(),
        };
        self.env
            .view
            .set_phase(&format!("Launching {}", self.manifest.app_name));
        info!("🚀 Launching {} from {}", entry.class(), entry.module());
        self.env.ui.run_and_wait(move || entry.invoke(&context))??;

        self.enter(Stage::Done);
        Ok(())
    }

    fn enter(&mut self, stage: Stage) {
        debug!("{} -> {}", self.stage, stage);
        self.stage = stage;
    }

    /// The remote manifest if it should be installed. Only local stat
    /// failures are errors.
    fn check_update(&self) -> Result<Option<Manifest>> {
        self.env.view.set_phase("Checking for updates");

        let remote = match self.fetch_remote() {
            Ok(remote) => remote,
            Err(e) => {
                warn!("⚠️  Update check failed, continuing with local manifest: {}", e);
                return Ok(None);
            }
        };
        if let Err(e) = remote.validate() {
            warn!("⚠️  Ignoring remote manifest {}: {}", remote.version, e);
            return Ok(None);
        }

        let checker = UpdateChecker::new(&self.env.root, self.env.platform);
        if checker.has_update(&self.manifest, &remote)? {
            info!(
                "📥 Update available: {} -> {}",
                self.manifest.version, remote.version
            );
            Ok(Some(remote))
        } else {
            info!("✅ Up to date ({})", self.manifest.version);
            Ok(None)
        }
    }

    fn fetch_remote(&self) -> Result<Manifest> {
        let url = self.manifest.remote_manifest_url()?;
        info!("🔍 Checking {}", url);
        Manifest::fetch(self.env.transport.as_ref(), &url)
    }

    fn sync(&mut self, remote: Manifest) -> Result<()> {
        let view = Arc::clone(&self.env.view);
        view.init_update_view();
        view.set_phase(&format!("Updating to {}", remote.version));

        self.manifest = Arc::new(remote);
        if !self.manifest.change_log.is_empty() {
            view.set_what_new(&self.manifest.change_log);
        }

        let synchronizer =
            Synchronizer::new(self.env.transport.as_ref(), &self.env.root, self.env.platform);
        let report = synchronizer
            .install(&self.manifest, &mut |fraction: f64| view.set_progress(fraction))?;
        self.new_version = true;

        info!(
            "✅ Installed {} ({} files, {} bytes)",
            self.manifest.version,
            report.downloaded.len(),
            report.received_bytes
        );
        Ok(())
    }

    fn build_boundary(&self) -> Result<Boundary> {
        self.env.view.set_phase("Loading modules");
        let request = LoadRequest::from_manifest(&self.manifest, &self.env.root, self.env.platform);
        self.loader.build(&request)
    }
}

/// Show `err` and end the UI loop with its exit status once acknowledged
pub fn report_failure(view: &dyn LauncherView, ui: &UiHandle, err: &LauncherError) {
    let code = err.exit_code();
    let ui = ui.clone();
    view.set_error(err, Box::new(move || ui.quit(code)));
}

/// Full launch on the calling thread; failures go to the view.
///
/// Returns whether the application was invoked and returned cleanly.
pub fn launch(embedded: &str, overrides: &Overrides, env: BootstrapEnv) -> bool {
    let view = Arc::clone(&env.view);
    let ui = env.ui.clone();

    let result = match Bootstrap::init(embedded, overrides, &env.root) {
        Ok(manifest) => Bootstrap::new(env, manifest).run(),
        Err(e) => {
            error!("❌ Launch failed during {}: {}", Stage::Init, e);
            Err(e)
        }
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            report_failure(view.as_ref(), &ui, &e);
            false
        }
    }
}
