//! Module descriptors and the artifact finder
//!
//! A module artifact carries a JSON descriptor, either as the artifact itself
//! (`*.module.json`) or as a `<artifact>.module.json` sidecar. Artifacts with
//! no descriptor become automatic modules named after their file.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{LauncherError, Result};

/// Suffix of descriptor documents
pub const DESCRIPTOR_SUFFIX: &str = ".module.json";

/// Trailing version in an artifact name, as in `core-1.2.0.so`
static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\d+(\.|$))").unwrap());
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// `exports`/`opens` rule; an empty `to` means every module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRule {
    pub package: String,
    #[serde(default)]
    pub to: BTreeSet<String>,
}

impl PackageRule {
    pub fn applies_to(&self, package: &str, target: &str) -> bool {
        self.package == package && (self.to.is_empty() || self.to.contains(target))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub name: String,

    /// Every package is open for reflection
    #[serde(default)]
    pub open: bool,

    #[serde(default)]
    pub requires: BTreeSet<String>,

    #[serde(default)]
    pub packages: BTreeSet<String>,

    #[serde(default)]
    pub exports: Vec<PackageRule>,

    #[serde(default)]
    pub opens: Vec<PackageRule>,

    /// Native library holding the module's code
    #[serde(default)]
    pub library: Option<String>,

    /// Entry identifier -> exported symbol
    #[serde(default)]
    pub entries: BTreeMap<String, String>,

    /// Derived from a file name rather than declared
    #[serde(skip)]
    pub automatic: bool,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn requires(mut self, module: impl Into<String>) -> Self {
        self.requires.insert(module.into());
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.packages.insert(package.into());
        self
    }

    pub fn exports(mut self, package: impl Into<String>) -> Self {
        let package = package.into();
        self.packages.insert(package.clone());
        self.exports.push(PackageRule {
            package,
            to: BTreeSet::new(),
        });
        self
    }

    pub fn exports_to(mut self, package: impl Into<String>, target: impl Into<String>) -> Self {
        let package = package.into();
        self.packages.insert(package.clone());
        self.exports.push(PackageRule {
            package,
            to: BTreeSet::from([target.into()]),
        });
        self
    }

    pub fn opens(mut self, package: impl Into<String>) -> Self {
        let package = package.into();
        self.packages.insert(package.clone());
        self.opens.push(PackageRule {
            package,
            to: BTreeSet::new(),
        });
        self
    }

    pub fn entry(mut self, class: impl Into<String>, symbol: impl Into<String>) -> Self {
        let class = class.into();
        if let Some(package) = package_of(&class) {
            self.packages.insert(package.to_string());
        }
        self.entries.insert(class, symbol.into());
        self
    }

    /// Automatic module: reads, exports and opens everything
    pub fn automatic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            automatic: true,
            ..Self::default()
        }
    }

    pub fn contains_package(&self, package: &str) -> bool {
        self.automatic || self.packages.contains(package)
    }

    pub fn exports_package(&self, package: &str, target: &str) -> bool {
        self.automatic || self.exports.iter().any(|r| r.applies_to(package, target))
    }

    pub fn opens_package(&self, package: &str, target: &str) -> bool {
        self.automatic || self.open || self.opens.iter().any(|r| r.applies_to(package, target))
    }

    /// Fill in implied packages and check names
    fn normalize(mut self, origin: &Path) -> Result<Self> {
        let invalid = |reason: String| LauncherError::InvalidDescriptor {
            path: origin.to_path_buf(),
            reason,
        };

        if !is_module_name(&self.name) {
            return Err(invalid(format!("invalid module name `{}`", self.name)));
        }
        if let Some(bad) = self.requires.iter().find(|r| !is_module_name(r)) {
            return Err(invalid(format!("invalid required module `{}`", bad)));
        }

        let implied: Vec<String> = self
            .exports
            .iter()
            .chain(self.opens.iter())
            .map(|r| r.package.clone())
            .chain(
                self.entries
                    .keys()
                    .filter_map(|class| package_of(class).map(str::to_string)),
            )
            .collect();
        self.packages.extend(implied);
        Ok(self)
    }
}

/// Package part of an entry identifier: `com.x.Main` -> `com.x`
pub fn package_of(class: &str) -> Option<&str> {
    class.rsplit_once('.').map(|(package, _)| package)
}

fn is_module_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn is_native_library(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".so")
        || name.contains(".so.")
        || name.ends_with(".dylib")
        || name.ends_with(".dll")
}

/// Name an automatic module after its artifact file:
/// `libapp_core-1.2.so` -> `app.core`
pub fn automatic_module_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_string_lossy().into_owned();
    let mut stem = match file_name.find('.') {
        Some(0) | None => file_name.clone(),
        Some(dot) => file_name[..dot].to_string(),
    };

    if let Some(m) = VERSION_SUFFIX.find(&stem) {
        stem.truncate(m.start());
    }
    if is_native_library(path) {
        if let Some(rest) = stem.strip_prefix("lib") {
            if !rest.is_empty() {
                stem = rest.to_string();
            }
        }
    }

    let name = NON_ALNUM.replace_all(&stem, ".");
    let name = name.trim_matches('.');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// A module found on disk: its descriptor and where its code lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    pub descriptor: ModuleDescriptor,
    /// The artifact the module was found in
    pub location: PathBuf,
    /// Resolved native library, if any
    pub library: Option<PathBuf>,
}

impl ModuleReference {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Read the module an artifact provides
    pub fn from_artifact(path: &Path) -> Result<Self> {
        let as_string = path.to_string_lossy();
        if as_string.ends_with(DESCRIPTOR_SUFFIX) {
            let descriptor = read_descriptor(path)?;
            let library = descriptor
                .library
                .as_ref()
                .map(|lib| path.parent().unwrap_or(Path::new(".")).join(lib));
            return Ok(Self {
                descriptor,
                location: path.to_path_buf(),
                library,
            });
        }

        fs::metadata(path).map_err(|source| LauncherError::Stat {
            path: path.to_path_buf(),
            source,
        })?;

        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(DESCRIPTOR_SUFFIX);
        let sidecar = PathBuf::from(sidecar);
        let own_library = is_native_library(path).then(|| path.to_path_buf());

        if sidecar.is_file() {
            let descriptor = read_descriptor(&sidecar)?;
            let library = match &descriptor.library {
                Some(lib) => Some(path.parent().unwrap_or(Path::new(".")).join(lib)),
                None => own_library,
            };
            return Ok(Self {
                descriptor,
                location: path.to_path_buf(),
                library,
            });
        }

        let name = automatic_module_name(path).ok_or_else(|| LauncherError::InvalidDescriptor {
            path: path.to_path_buf(),
            reason: "cannot derive an automatic module name".to_string(),
        })?;
        debug!("Automatic module {} from {}", name, path.display());
        Ok(Self {
            descriptor: ModuleDescriptor::automatic(name),
            location: path.to_path_buf(),
            library: own_library,
        })
    }
}

fn read_descriptor(path: &Path) -> Result<ModuleDescriptor> {
    let text = fs::read_to_string(path).map_err(|source| LauncherError::Stat {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptor: ModuleDescriptor =
        serde_json::from_str(&text).map_err(|e| LauncherError::InvalidDescriptor {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    descriptor.normalize(path)
}

/// Modules discoverable from a set of artifact paths
#[derive(Debug, Clone, Default)]
pub struct ModuleFinder {
    modules: BTreeMap<String, ModuleReference>,
}

impl ModuleFinder {
    /// Scan artifacts; directories are searched one level deep.
    ///
    /// A `<artifact>.module.json` listed next to its artifact describes that
    /// artifact instead of being a module of its own. Two artifacts providing
    /// the same module name is an error.
    pub fn of(paths: &[PathBuf]) -> Result<Self> {
        let mut artifacts = Vec::new();
        for path in paths {
            if path.is_dir() {
                let mut entries: Vec<PathBuf> = fs::read_dir(path)
                    .map_err(|source| LauncherError::Stat {
                        path: path.clone(),
                        source,
                    })?
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.is_file())
                    .collect();
                entries.sort();
                artifacts.extend(entries);
            } else {
                artifacts.push(path.clone());
            }
        }

        let listed: HashSet<&Path> = artifacts.iter().map(PathBuf::as_path).collect();
        let is_sidecar = |p: &Path| {
            let name = p.to_string_lossy();
            name.strip_suffix(DESCRIPTOR_SUFFIX)
                .is_some_and(|artifact| listed.contains(Path::new(artifact)))
        };

        let mut finder = Self::default();
        for artifact in artifacts.iter().filter(|p| !is_sidecar(p.as_path())) {
            finder.add(ModuleReference::from_artifact(artifact)?)?;
        }
        Ok(finder)
    }

    /// Build a finder from in-memory references
    pub fn from_references(references: impl IntoIterator<Item = ModuleReference>) -> Result<Self> {
        let mut finder = Self::default();
        for reference in references {
            finder.add(reference)?;
        }
        Ok(finder)
    }

    fn add(&mut self, reference: ModuleReference) -> Result<()> {
        if let Some(existing) = self.modules.get(reference.name()) {
            return Err(LauncherError::Resolution(format!(
                "two versions of module {} found ({} and {})",
                reference.name(),
                existing.location.display(),
                reference.location.display()
            )));
        }
        self.modules.insert(reference.name().to_string(), reference);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&ModuleReference> {
        self.modules.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
