//! Module layers
//!
//! A layer is an immutable set of named modules with a parent. Reads edges
//! implied by `requires` are fixed when the layer is defined; grants add more
//! edges later through the layer's controller.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::descriptor::{ModuleDescriptor, ModuleFinder, ModuleReference};
use super::entry::HostEntry;
use crate::error::{LauncherError, Result};

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(u64);

impl LayerId {
    fn next() -> Self {
        LayerId(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Module identity: names are unique per layer only
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleKey {
    pub layer: LayerId,
    pub name: String,
}

/// Direct access needs an export, reflective access needs an open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Direct,
    Reflective,
}

#[derive(Debug, Default)]
struct Edges {
    reads: BTreeSet<ModuleKey>,
    exports: BTreeSet<(String, ModuleKey)>,
    opens: BTreeSet<(String, ModuleKey)>,
}

#[derive(Debug)]
pub struct Module {
    key: ModuleKey,
    descriptor: ModuleDescriptor,
    library: Option<PathBuf>,
    edges: RwLock<Edges>,
}

impl Module {
    fn new(layer: LayerId, reference: ModuleReference) -> Self {
        Self {
            key: ModuleKey {
                layer,
                name: reference.descriptor.name.clone(),
            },
            descriptor: reference.descriptor,
            library: reference.library,
            edges: RwLock::new(Edges::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    pub fn layer(&self) -> LayerId {
        self.key.layer
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn library(&self) -> Option<&PathBuf> {
        self.library.as_ref()
    }

    pub fn is_automatic(&self) -> bool {
        self.descriptor.automatic
    }

    pub fn reads(&self, other: &Module) -> bool {
        self.key == other.key
            || self.is_automatic()
            || self.edges.read().unwrap_or_else(|e| e.into_inner()).reads.contains(&other.key)
    }

    /// Is `package` of this module visible to `target` for direct access
    pub fn is_exported(&self, package: &str, target: &Module) -> bool {
        if self.key == target.key || self.descriptor.exports_package(package, target.name()) {
            return true;
        }
        self.edges
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .exports
            .contains(&(package.to_string(), target.key.clone()))
    }

    /// Is `package` of this module visible to `target` for reflection
    pub fn is_open(&self, package: &str, target: &Module) -> bool {
        if self.key == target.key || self.descriptor.opens_package(package, target.name()) {
            return true;
        }
        self.edges
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .opens
            .contains(&(package.to_string(), target.key.clone()))
    }

    /// Can this module reach `package` of `owner`
    pub fn can_access(&self, owner: &Module, package: &str, kind: AccessKind) -> bool {
        self.reads(owner)
            && match kind {
                AccessKind::Direct => owner.is_exported(package, self),
                AccessKind::Reflective => owner.is_open(package, self),
            }
    }

    pub(crate) fn add_read(&self, target: &Module) {
        self.edges
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .reads
            .insert(target.key.clone());
    }

    pub(crate) fn add_export(&self, package: &str, target: &Module) {
        self.edges
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .exports
            .insert((package.to_string(), target.key.clone()));
    }

    pub(crate) fn add_open(&self, package: &str, target: &Module) {
        self.edges
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .opens
            .insert((package.to_string(), target.key.clone()));
    }
}

pub struct Layer {
    id: LayerId,
    name: String,
    modules: BTreeMap<String, Arc<Module>>,
    parent: Option<Arc<Layer>>,
    host_entries: HashMap<String, HostEntry>,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .finish()
    }
}

impl Layer {
    /// Root of every layer chain
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            id: LayerId::next(),
            name: "empty".to_string(),
            modules: BTreeMap::new(),
            parent: None,
            host_entries: HashMap::new(),
        })
    }

    /// Start describing the embedding binary's own modules
    pub fn host(name: impl Into<String>) -> HostLayerBuilder {
        HostLayerBuilder {
            name: name.into(),
            parent: None,
            modules: BTreeMap::new(),
            entries: HashMap::new(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Layer>> {
        self.parent.as_ref()
    }

    /// Modules defined in this layer only
    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.values()
    }

    /// Module defined in this layer only
    pub fn module(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.get(name)
    }

    /// Module in this layer or the nearest parent that has it
    pub fn find_module(&self, name: &str) -> Option<&Arc<Module>> {
        self.module(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.find_module(name)))
    }

    /// Does this chain include the layer `id`
    pub fn contains_layer(&self, id: LayerId) -> bool {
        self.id == id || self.parent.as_ref().is_some_and(|p| p.contains_layer(id))
    }

    /// The layer `id` in this chain
    pub fn find_layer(self: &Arc<Self>, id: LayerId) -> Option<Arc<Layer>> {
        if self.id == id {
            Some(Arc::clone(self))
        } else {
            self.parent.as_ref()?.find_layer(id)
        }
    }

    pub fn host_entry(&self, class: &str) -> Option<&HostEntry> {
        self.host_entries.get(class)
    }

    /// Resolve a minimal module graph from `roots` and define it as a child
    /// of `parent`. Requirements come from the finder first, then the parent
    /// chain.
    pub fn define(
        name: impl Into<String>,
        finder: &ModuleFinder,
        roots: &[String],
        parent: &Arc<Layer>,
    ) -> Result<Arc<Layer>> {
        Self::define_layer(name.into(), finder, roots, parent).map(Arc::new)
    }

    fn define_layer(
        name: String,
        finder: &ModuleFinder,
        roots: &[String],
        parent: &Arc<Layer>,
    ) -> Result<Layer> {
        let selected = resolve(&name, finder, roots, parent)?;
        let id = LayerId::next();
        let requires: Vec<(String, BTreeSet<String>)> = selected
            .values()
            .map(|r| (r.name().to_string(), r.descriptor.requires.clone()))
            .collect();

        let modules: BTreeMap<String, Arc<Module>> = selected
            .into_iter()
            .map(|(module_name, reference)| (module_name, Arc::new(Module::new(id, reference))))
            .collect();

        for (module_name, required) in requires {
            let Some(module) = modules.get(&module_name) else {
                continue;
            };
            for dependency in required {
                let target = modules
                    .get(&dependency)
                    .or_else(|| parent.find_module(&dependency));
                if let Some(target) = target {
                    module.add_read(target);
                }
            }
        }

        debug!(
            "Defined layer {} with modules [{}]",
            name,
            modules.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(Layer {
            id,
            name,
            modules,
            parent: Some(Arc::clone(parent)),
            host_entries: HashMap::new(),
        })
    }
}

/// Breadth-first selection of the modules reachable from `roots`, then a
/// cycle check over the selection.
fn resolve(
    layer_name: &str,
    finder: &ModuleFinder,
    roots: &[String],
    parent: &Layer,
) -> Result<BTreeMap<String, ModuleReference>> {
    let mut selected: BTreeMap<String, ModuleReference> = BTreeMap::new();
    let mut queue: Vec<String> = Vec::new();

    for root in roots {
        if finder.find(root).is_some() {
            queue.push(root.clone());
        } else if parent.find_module(root).is_none() {
            return Err(LauncherError::ModuleNotFound {
                layer: layer_name.to_string(),
                module: root.clone(),
            });
        }
    }

    while let Some(next) = queue.pop() {
        if selected.contains_key(&next) {
            continue;
        }
        let Some(reference) = finder.find(&next) else {
            continue;
        };
        for dependency in &reference.descriptor.requires {
            if finder.find(dependency).is_some() {
                queue.push(dependency.clone());
            } else if parent.find_module(dependency).is_none() {
                return Err(LauncherError::ModuleNotFound {
                    layer: layer_name.to_string(),
                    module: format!("{} (required by {})", dependency, next),
                });
            }
        }
        selected.insert(next, reference.clone());
    }

    if let Some(cycle) = find_cycle(&selected) {
        return Err(LauncherError::Resolution(format!(
            "cycle detected: {}",
            cycle.join(" -> ")
        )));
    }
    Ok(selected)
}

fn find_cycle(selected: &BTreeMap<String, ModuleReference>) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        name: &str,
        selected: &BTreeMap<String, ModuleReference>,
        marks: &mut HashMap<String, Mark>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        match marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| n == name).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(name.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(name.to_string(), Mark::Visiting);
        path.push(name.to_string());
        if let Some(reference) = selected.get(name) {
            for dependency in &reference.descriptor.requires {
                if selected.contains_key(dependency) {
                    if let Some(cycle) = visit(dependency, selected, marks, path) {
                        return Some(cycle);
                    }
                }
            }
        }
        path.pop();
        marks.insert(name.to_string(), Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    for name in selected.keys() {
        if let Some(cycle) = visit(name, selected, &mut marks, &mut Vec::new()) {
            return Some(cycle);
        }
    }
    None
}

/// Builder for the binary's host layer
pub struct HostLayerBuilder {
    name: String,
    parent: Option<Arc<Layer>>,
    modules: BTreeMap<String, ModuleDescriptor>,
    entries: HashMap<String, HostEntry>,
}

impl HostLayerBuilder {
    pub fn parent(mut self, parent: Arc<Layer>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn module(mut self, descriptor: ModuleDescriptor) -> Self {
        self.modules.insert(descriptor.name.clone(), descriptor);
        self
    }

    /// Register `entry` as `class` of `module`. The module is created with
    /// default rules if it was not described.
    pub fn entry<F>(mut self, module: &str, class: &str, entry: F) -> Self
    where
        F: Fn(&super::entry::LaunchContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let descriptor = self
            .modules
            .remove(module)
            .unwrap_or_else(|| ModuleDescriptor::new(module))
            .entry(class, class);
        self.modules.insert(module.to_string(), descriptor);
        self.entries.insert(class.to_string(), Arc::new(entry));
        self
    }

    pub fn build(self) -> Result<Arc<Layer>> {
        let parent = self.parent.unwrap_or_else(Layer::empty);
        let references: Vec<ModuleReference> = self
            .modules
            .into_values()
            .map(|descriptor| ModuleReference {
                location: PathBuf::from(format!("host:{}", descriptor.name)),
                descriptor,
                library: None,
            })
            .collect();
        let finder = ModuleFinder::from_references(references)?;
        let roots: Vec<String> = finder.names().map(str::to_string).collect();

        let mut layer = Layer::define_layer(self.name, &finder, &roots, &parent)?;
        layer.host_entries = self.entries;
        Ok(Arc::new(layer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finder(descriptors: Vec<ModuleDescriptor>) -> ModuleFinder {
        ModuleFinder::from_references(descriptors.into_iter().map(|descriptor| ModuleReference {
            location: PathBuf::from(format!("{}.module.json", descriptor.name)),
            descriptor,
            library: None,
        }))
        .unwrap()
    }

    fn roots(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_minimal_graph() {
        let f = finder(vec![
            ModuleDescriptor::new("app").requires("app.core"),
            ModuleDescriptor::new("app.core"),
            ModuleDescriptor::new("app.unused"),
        ]);
        let layer = Layer::define("boot", &f, &roots(&["app"]), &Layer::empty()).unwrap();

        let names: Vec<&str> = layer.modules().map(|m| m.name()).collect();
        assert_eq!(names, vec!["app", "app.core"]);
        let app = layer.module("app").unwrap();
        let core = layer.module("app.core").unwrap();
        assert!(app.reads(core));
        assert!(!core.reads(app));
    }

    #[test]
    fn test_missing_module() {
        let f = finder(vec![ModuleDescriptor::new("app").requires("app.core")]);
        let err = Layer::define("boot", &f, &roots(&["app"]), &Layer::empty()).unwrap_err();
        assert!(matches!(err, LauncherError::ModuleNotFound { ref module, .. } if module.starts_with("app.core")));

        let err = Layer::define("boot", &f, &roots(&["nope"]), &Layer::empty()).unwrap_err();
        assert!(matches!(err, LauncherError::ModuleNotFound { .. }));
    }

    #[test]
    fn test_cycle_is_fatal() {
        let f = finder(vec![
            ModuleDescriptor::new("a").requires("b"),
            ModuleDescriptor::new("b").requires("c"),
            ModuleDescriptor::new("c").requires("a"),
        ]);
        let err = Layer::define("boot", &f, &roots(&["a"]), &Layer::empty()).unwrap_err();
        match err {
            LauncherError::Resolution(msg) => {
                assert!(msg.contains("cycle"), "{}", msg);
                assert!(msg.contains("a -> b -> c -> a"), "{}", msg);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_requirements_fall_back_to_parent() {
        let host = Layer::host("host")
            .module(ModuleDescriptor::new("host.api").exports("host.api"))
            .build()
            .unwrap();
        let f = finder(vec![ModuleDescriptor::new("app").requires("host.api")]);
        let layer = Layer::define("boot", &f, &roots(&["app"]), &host).unwrap();

        let app = layer.module("app").unwrap();
        let api = layer.find_module("host.api").unwrap();
        assert_eq!(api.layer(), host.id());
        assert!(app.can_access(api, "host.api", AccessKind::Direct));
        assert!(!app.can_access(api, "host.api", AccessKind::Reflective));
        assert!(layer.contains_layer(host.id()));
    }

    #[test]
    fn test_access_rules() {
        let f = finder(vec![
            ModuleDescriptor::new("app.plugin").requires("app.core"),
            ModuleDescriptor::new("app.other").requires("app.core"),
            ModuleDescriptor::new("app.core")
                .package("com.x")
                .exports_to("com.api", "app.plugin"),
            ModuleDescriptor::automatic("util"),
        ]);
        let layer = Layer::define(
            "boot",
            &f,
            &roots(&["app.plugin", "app.other", "util"]),
            &Layer::empty(),
        )
        .unwrap();
        let core = layer.module("app.core").unwrap();
        let plugin = layer.module("app.plugin").unwrap();
        let other = layer.module("app.other").unwrap();
        let util = layer.module("util").unwrap();

        assert!(plugin.can_access(core, "com.api", AccessKind::Direct));
        assert!(!other.can_access(core, "com.api", AccessKind::Direct));
        assert!(!plugin.can_access(core, "com.x", AccessKind::Direct));

        core.add_export("com.x", plugin);
        assert!(plugin.can_access(core, "com.x", AccessKind::Direct));
        assert!(!plugin.can_access(core, "com.x", AccessKind::Reflective));
        assert!(!other.can_access(core, "com.x", AccessKind::Direct));

        // automatic modules read and expose everything
        assert!(util.reads(core));
        assert!(plugin.is_open("anything", plugin));
        assert!(util.is_open("any.pkg", other));
        assert!(!other.reads(util));
    }

    #[test]
    fn test_host_entries() {
        let host = Layer::host("launchpad")
            .entry("app.host", "com.host.Main", |_ctx| Ok(()))
            .build()
            .unwrap();
        assert!(host.host_entry("com.host.Main").is_some());
        let module = host.module("app.host").unwrap();
        assert!(module.descriptor().entries.contains_key("com.host.Main"));
        assert!(module.descriptor().contains_package("com.host"));
    }
}
