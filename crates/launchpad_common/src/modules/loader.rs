//! Boundary construction
//!
//! Build order:
//! 1. Parse grants (a typo fails before anything is loaded)
//! 2. Load native libraries, globally visible, resident for the boundary
//! 3. Resolve the module graph against the host layer
//! 4. Define the boundary layer
//! 5. Apply grants through the owning layer's controller

use libloading::Library;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::controller::Controller;
use super::descriptor::{package_of, ModuleFinder};
use super::entry::{EntryFn, EntryPoint, EntryTarget};
use super::grant::{Grant, GrantOp};
use super::layer::{AccessKind, Layer, LayerId, Module};
use crate::error::{LauncherError, Result};
use crate::manifest::Manifest;
use crate::platform::Platform;
use crate::resource::ResourceKind;

/// Name given to every boundary layer
pub const BOUNDARY_LAYER: &str = "boundary";

/// Inputs of one `ModuleLoader::build`
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    pub artifacts: Vec<PathBuf>,
    /// Empty for non-modular loading
    pub root_module: String,
    pub native_local: Vec<PathBuf>,
    pub native_system: Vec<String>,
    pub grants: Vec<String>,
}

impl LoadRequest {
    /// Sort a manifest's resources for `platform` into loader inputs
    pub fn from_manifest(manifest: &Manifest, root: &Path, platform: Platform) -> Self {
        let mut request = Self {
            root_module: manifest.launch_module.clone(),
            grants: manifest.module_options.clone(),
            ..Self::default()
        };
        for resource in manifest.resources_for(platform) {
            match resource.kind() {
                ResourceKind::Module => request.artifacts.push(resource.local_path(root)),
                ResourceKind::NativeLocal => request.native_local.push(resource.local_path(root)),
                ResourceKind::NativeSystem => request.native_system.push(resource.logical_name()),
            }
        }
        request
    }
}

#[derive(Debug)]
pub struct ModuleLoader {
    host: Arc<Layer>,
    controllers: Mutex<HashMap<LayerId, Arc<Controller>>>,
}

impl ModuleLoader {
    pub fn new(host: Arc<Layer>) -> Self {
        Self {
            host,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &Arc<Layer> {
        &self.host
    }

    /// Controller of a layer in the host chain, created on first use
    pub fn host_controller(&self, id: LayerId) -> Option<Arc<Controller>> {
        let layer = self.host.find_layer(id)?;
        let mut controllers = self.controllers.lock().unwrap_or_else(|e| e.into_inner());
        Some(Arc::clone(
            controllers
                .entry(id)
                .or_insert_with(|| Arc::new(Controller::new(layer))),
        ))
    }

    pub fn build(&self, request: &LoadRequest) -> Result<Boundary> {
        let grants = Grant::parse_all(&request.grants)?;

        let mut natives = Vec::new();
        for path in &request.native_local {
            natives.push(load_native(path.as_os_str(), &path.display().to_string())?);
        }
        for name in &request.native_system {
            let file_name = libloading::library_filename(name);
            natives.push(load_native(&file_name, name)?);
        }
        if !natives.is_empty() {
            debug!("Loaded {} native libraries", natives.len());
        }

        let finder = ModuleFinder::of(&request.artifacts)?;
        let roots: Vec<String> = if request.root_module.is_empty() {
            finder.names().map(str::to_string).collect()
        } else {
            vec![request.root_module.clone()]
        };
        let layer = Layer::define(BOUNDARY_LAYER, &finder, &roots, &self.host)?;
        let controller = Arc::new(Controller::new(Arc::clone(&layer)));

        for grant in &grants {
            self.apply(&layer, &controller, grant)?;
        }

        info!(
            "📦 Module layer ready ({} modules, {} grants)",
            layer.modules().count(),
            grants.len()
        );
        Ok(Boundary {
            layer,
            controller,
            root_module: (!request.root_module.is_empty()).then(|| request.root_module.clone()),
            libraries: Mutex::new(HashMap::new()),
            natives,
        })
    }

    fn apply(&self, layer: &Arc<Layer>, boundary: &Arc<Controller>, grant: &Grant) -> Result<()> {
        let rejected = |reason: String| LauncherError::GrantRejected {
            statement: grant.to_string(),
            reason,
        };
        let lookup = |name: &str| {
            layer.find_module(name).ok_or_else(|| LauncherError::ModuleNotFound {
                layer: layer.name().to_string(),
                module: name.to_string(),
            })
        };

        let source = lookup(&grant.source)?;
        let controller = if source.layer() == layer.id() {
            Arc::clone(boundary)
        } else {
            self.host_controller(source.layer()).ok_or_else(|| {
                rejected(format!("layer of {} is not controlled by this loader", source.name()))
            })?
        };

        for target in &grant.targets {
            let target = lookup(target)?;
            let applied = match (grant.op, grant.package.as_deref()) {
                (GrantOp::AddReads, _) => controller.add_reads(source, target),
                (GrantOp::AddExports, Some(package)) => {
                    controller.add_exports(source, package, target)
                }
                (GrantOp::AddOpens, Some(package)) => {
                    controller.add_opens(source, package, target)
                }
                (_, None) => return Err(rejected("missing package".to_string())),
            };
            applied.map_err(|e| rejected(e.to_string()))?;
        }
        Ok(())
    }
}

fn load_native(file: &std::ffi::OsStr, name: &str) -> Result<Library> {
    debug!("Loading native library {}", name);
    let native_error = |source| LauncherError::NativeLoad {
        name: name.to_string(),
        source,
    };

    #[cfg(unix)]
    {
        use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};
        // SAFETY: loading runs library initializers; the manifest is trusted
        // to name real libraries.
        let library = unsafe { UnixLibrary::open(Some(file), RTLD_NOW | RTLD_GLOBAL) }
            .map_err(native_error)?;
        Ok(library.into())
    }

    #[cfg(not(unix))]
    {
        // SAFETY: as above
        unsafe { Library::new(file) }.map_err(native_error)
    }
}

/// An isolated module namespace built from one manifest
#[derive(Debug)]
pub struct Boundary {
    layer: Arc<Layer>,
    controller: Arc<Controller>,
    root_module: Option<String>,
    libraries: Mutex<HashMap<PathBuf, Arc<Library>>>,
    natives: Vec<Library>,
}

impl Boundary {
    pub fn layer(&self) -> &Arc<Layer> {
        &self.layer
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    pub fn is_modular(&self) -> bool {
        self.root_module.is_some()
    }

    pub fn root_module(&self) -> Option<&Arc<Module>> {
        self.root_module
            .as_deref()
            .and_then(|name| self.layer.find_module(name))
    }

    pub fn find_module(&self, name: &str) -> Option<&Arc<Module>> {
        self.layer.find_module(name)
    }

    pub fn native_count(&self) -> usize {
        self.natives.len()
    }

    /// Can module `from` reach `package` of module `owner`
    pub fn can_access(&self, from: &str, owner: &str, package: &str, kind: AccessKind) -> bool {
        match (self.find_module(from), self.find_module(owner)) {
            (Some(from), Some(owner)) => from.can_access(owner, package, kind),
            _ => false,
        }
    }

    /// Locate `class` and check the root module may reach it reflectively
    pub fn resolve_entry(&self, class: &str) -> Result<EntryPoint> {
        let unresolved = |reason: String| LauncherError::EntryResolution {
            entry: class.to_string(),
            reason,
        };
        let package = package_of(class)
            .ok_or_else(|| unresolved("entry must be qualified by a package".to_string()))?;

        let owner = self
            .candidates()
            .find(|m| m.descriptor().entries.contains_key(class))
            .ok_or_else(|| unresolved("no module declares it".to_string()))?;

        if let Some(root) = self.root_module() {
            if !root.can_access(owner, package, AccessKind::Reflective) {
                return Err(unresolved(format!(
                    "module {} does not open {} to {}",
                    owner.name(),
                    package,
                    root.name()
                )));
            }
        }

        let target = self.target_for(owner, class)?;
        debug!("Entry {} resolved in module {}", class, owner.name());
        Ok(EntryPoint::new(class, owner.name(), target))
    }

    /// Root module first, then the boundary layer, then the host chain
    fn candidates(&self) -> impl Iterator<Item = &Arc<Module>> {
        let mut chain: Vec<&Arc<Module>> = self.root_module().into_iter().collect();
        let mut layer = Some(&self.layer);
        while let Some(current) = layer {
            chain.extend(current.modules());
            layer = current.parent();
        }
        chain.into_iter()
    }

    fn target_for(&self, owner: &Module, class: &str) -> Result<EntryTarget> {
        if let Some(host) = self
            .layer
            .find_layer(owner.layer())
            .and_then(|l| l.host_entry(class).cloned())
        {
            return Ok(EntryTarget::Host(host));
        }

        let symbol = owner.descriptor().entries.get(class).cloned().unwrap_or_default();
        let path = owner.library().ok_or_else(|| LauncherError::EntryResolution {
            entry: class.to_string(),
            reason: format!("module {} has no native library", owner.name()),
        })?;
        let library = self.library(path)?;

        // SAFETY: entry symbols are declared as `EntryFn` by their module
        let func: EntryFn = unsafe {
            *library
                .get::<EntryFn>(symbol.as_bytes())
                .map_err(|e| LauncherError::EntryResolution {
                    entry: class.to_string(),
                    reason: format!("symbol {}: {}", symbol, e),
                })?
        };
        Ok(EntryTarget::Symbol {
            symbol,
            func,
            _library: library,
        })
    }

    /// Module libraries, opened once per boundary
    fn library(&self, path: &Path) -> Result<Arc<Library>> {
        let mut libraries = self.libraries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(library) = libraries.get(path) {
            return Ok(Arc::clone(library));
        }
        let library = Arc::new(load_native(path.as_os_str(), &path.display().to_string())?);
        libraries.insert(path.to_path_buf(), Arc::clone(&library));
        Ok(library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::descriptor::ModuleDescriptor;
    use crate::modules::entry::LaunchContext;
    use crate::resource::Resource;
    use std::fs;
    use tempfile::TempDir;

    fn write_module(dir: &Path, file: &str, json: &str) -> PathBuf {
        let path = dir.join(file);
        fs::write(&path, json).unwrap();
        path
    }

    fn host() -> Arc<Layer> {
        Layer::host("launchpad")
            .module(ModuleDescriptor::new("launchpad.api").exports("launchpad.api"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_from_manifest() {
        let manifest = Manifest {
            launch_module: "app".into(),
            module_options: vec!["--add-reads=app=util".into()],
            resources: vec![
                Resource::new("lib/app.module.json", 10),
                Resource::new("natives/libgl.so", 10).with_kind(ResourceKind::NativeLocal),
                Resource::new("libGL.so.1", 0).with_kind(ResourceKind::NativeSystem),
                Resource::new("win/gl.dll", 10).with_platform(Platform::Win),
            ],
            ..Manifest::default()
        };
        let root = Path::new("/opt/app");
        let request = LoadRequest::from_manifest(&manifest, root, Platform::Linux);

        assert_eq!(request.root_module, "app");
        assert_eq!(request.artifacts, vec![root.join("lib/app.module.json")]);
        assert_eq!(request.native_local, vec![root.join("natives/libgl.so")]);
        assert_eq!(request.native_system, vec!["GL".to_string()]);
        assert_eq!(request.grants.len(), 1);
    }

    #[test]
    fn test_grant_exports_visibility() {
        let temp = TempDir::new().unwrap();
        let artifacts = vec![
            write_module(temp.path(), "core.module.json", r#"{"name":"app.core","packages":["com.x"]}"#),
            write_module(temp.path(), "plugin.module.json", r#"{"name":"app.plugin","requires":["app.core"]}"#),
            write_module(temp.path(), "other.module.json", r#"{"name":"app.other","requires":["app.core"]}"#),
        ];
        let loader = ModuleLoader::new(host());
        let boundary = loader
            .build(&LoadRequest {
                artifacts,
                grants: vec!["--add-exports=app.core/com.x=app.plugin".into()],
                ..LoadRequest::default()
            })
            .unwrap();

        assert!(!boundary.is_modular());
        assert!(boundary.can_access("app.plugin", "app.core", "com.x", AccessKind::Direct));
        assert!(!boundary.can_access("app.plugin", "app.core", "com.x", AccessKind::Reflective));
        assert!(!boundary.can_access("app.other", "app.core", "com.x", AccessKind::Direct));
    }

    #[test]
    fn test_malformed_grant_fails_before_loading() {
        let loader = ModuleLoader::new(host());
        let err = loader
            .build(&LoadRequest {
                // would fail with a native load error if loading came first
                native_local: vec![PathBuf::from("/nonexistent/libx.so")],
                grants: vec!["--add-exports=app.core=app.plugin".into()],
                ..LoadRequest::default()
            })
            .unwrap_err();
        assert!(matches!(err, LauncherError::MalformedGrant { .. }));
    }

    #[test]
    fn test_missing_native_library() {
        let loader = ModuleLoader::new(host());
        let err = loader
            .build(&LoadRequest {
                native_local: vec![PathBuf::from("/nonexistent/libx.so")],
                ..LoadRequest::default()
            })
            .unwrap_err();
        assert!(matches!(err, LauncherError::NativeLoad { .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_RUNTIME_ERROR);
    }

    #[test]
    fn test_grant_on_unknown_module() {
        let loader = ModuleLoader::new(host());
        let err = loader
            .build(&LoadRequest {
                grants: vec!["--add-reads=ghost=launchpad.api".into()],
                ..LoadRequest::default()
            })
            .unwrap_err();
        assert!(matches!(err, LauncherError::ModuleNotFound { .. }));
    }

    #[test]
    fn test_grant_on_host_module_uses_cached_controller() {
        let temp = TempDir::new().unwrap();
        let artifacts = vec![write_module(temp.path(), "app.module.json", r#"{"name":"app"}"#)];
        let host = host();
        let loader = ModuleLoader::new(Arc::clone(&host));
        let boundary = loader
            .build(&LoadRequest {
                artifacts,
                root_module: "app".into(),
                grants: vec!["--add-opens=launchpad.api/launchpad.api=app".into()],
                ..LoadRequest::default()
            })
            .unwrap();

        assert!(boundary.is_modular());
        // app does not read launchpad.api, so the open alone grants nothing
        assert!(!boundary.can_access("app", "launchpad.api", "launchpad.api", AccessKind::Reflective));
        let api = boundary.find_module("launchpad.api").unwrap();
        let app = boundary.root_module().unwrap();
        assert!(api.is_open("launchpad.api", app));

        let first = loader.host_controller(host.id()).unwrap();
        let second = loader.host_controller(host.id()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(loader.host_controller(boundary.layer().id()).is_none());
    }

    #[test]
    fn test_entry_needs_reflective_access() {
        let temp = TempDir::new().unwrap();
        let artifacts = vec![
            write_module(temp.path(), "app.module.json", r#"{"name":"app","requires":["app.core"]}"#),
            write_module(
                temp.path(),
                "core.module.json",
                r#"{"name":"app.core","entries":{"com.x.Main":"app_main"}}"#,
            ),
        ];
        let loader = ModuleLoader::new(host());
        let request = LoadRequest {
            artifacts,
            root_module: "app".into(),
            ..LoadRequest::default()
        };

        let boundary = loader.build(&request).unwrap();
        let err = boundary.resolve_entry("com.x.Main").unwrap_err();
        assert!(err.to_string().contains("does not open com.x"), "{}", err);

        let opened = loader
            .build(&LoadRequest {
                grants: vec!["--add-opens=app.core/com.x=app".into()],
                ..request
            })
            .unwrap();
        // accessible now, but there is no library to bind the symbol from
        let err = opened.resolve_entry("com.x.Main").unwrap_err();
        assert!(err.to_string().contains("no native library"), "{}", err);
    }

    #[test]
    fn test_host_entry_resolution() {
        let host = Layer::host("launchpad")
            .entry("launchpad.app", "com.host.Main", |_ctx| Ok(()))
            .build()
            .unwrap();
        let loader = ModuleLoader::new(host);
        let boundary = loader.build(&LoadRequest::default()).unwrap();

        let entry = boundary.resolve_entry("com.host.Main").unwrap();
        assert!(entry.is_host());
        assert_eq!(entry.module(), "launchpad.app");

        assert!(boundary.resolve_entry("com.host.Missing").is_err());
        assert!(boundary.resolve_entry("Unqualified").is_err());
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_native_entry_symbol_invoked() {
        const LIBC: &str = "/lib/x86_64-linux-gnu/libc.so.6";
        if !Path::new(LIBC).exists() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let descriptor = format!(
            r#"{{"name":"app.native","library":"{}","entries":{{"com.x.Main":"sched_yield"}}}}"#,
            LIBC
        );
        let artifacts = vec![write_module(temp.path(), "native.module.json", &descriptor)];
        let loader = ModuleLoader::new(host());
        let boundary = loader
            .build(&LoadRequest {
                artifacts,
                native_local: vec![PathBuf::from(LIBC)],
                ..LoadRequest::default()
            })
            .unwrap();
        assert_eq!(boundary.native_count(), 1);

        let entry = boundary.resolve_entry("com.x.Main").unwrap();
        assert!(!entry.is_host());
        assert_eq!(entry.module(), "app.native");

        let (ui, _event_loop) = crate::ui::event_loop();
        let context = LaunchContext {
            manifest: Arc::new(Manifest::default()),
            new_version: false,
            args: Vec::new(),
            boundary: Arc::new(boundary),
            ui,
        };
        entry.invoke(&context).unwrap();
    }
}
