//! Synchronizable artifacts
//!
//! A resource is one file the manifest promises: where it lives relative to
//! the update source and the install root, how big it must be, which platform
//! needs it and how it gets loaded.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{LauncherError, Result};
use crate::platform::Platform;

/// How a resource is loaded at startup
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    /// Joins the module graph
    #[default]
    #[serde(alias = "JAR")]
    Module,
    /// Native library loaded from its absolute local path
    #[serde(alias = "NATIVE")]
    NativeLocal,
    /// Native library loaded by logical name from the system search path
    #[serde(alias = "NATIVE_SYS")]
    NativeSystem,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resource {
    /// Relative to the base url and to the install root
    pub path: String,

    /// Expected byte length
    pub size: u64,

    /// `None` applies everywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// `None` means `Module`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResourceKind>,
}

impl Resource {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            platform: None,
            kind: None,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind.unwrap_or_default()
    }

    pub fn applies_to(&self, platform: Platform) -> bool {
        match self.platform {
            None | Some(Platform::Common) => true,
            Some(p) => p == platform,
        }
    }

    /// Local path under the install root
    pub fn local_path(&self, root: &Path) -> PathBuf {
        root.join(&self.path)
    }

    /// Relative, and never climbs out of the install root
    pub fn is_contained(&self) -> bool {
        is_contained_path(&self.path)
    }

    /// Download location relative to the manifest base url
    pub fn remote_url(&self, base: &Url) -> Result<Url> {
        base.join(&self.path).map_err(|e| LauncherError::InvalidUrl {
            url: format!("{}{}", base, self.path),
            reason: e.to_string(),
        })
    }

    /// Missing locally, or the local size differs from the declared size.
    ///
    /// Only a missing file counts as stale; any other stat failure is an
    /// error so unreadable local state is never taken as current.
    pub fn is_stale(&self, root: &Path) -> Result<bool> {
        let path = self.local_path(root);
        match fs::metadata(&path) {
            Ok(meta) => Ok(!meta.is_file() || meta.len() != self.size),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(source) => Err(LauncherError::Stat { path, source }),
        }
    }

    /// Logical name for system library lookup: `lib/libfoo.so` -> `foo`
    pub fn logical_name(&self) -> String {
        let file_name = Path::new(&self.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.clone());
        let stem = file_name
            .split('.')
            .next()
            .unwrap_or(file_name.as_str())
            .to_string();
        match stem.strip_prefix("lib") {
            Some(rest) if !rest.is_empty() && !cfg!(windows) => rest.to_string(),
            _ => stem,
        }
    }
}

/// True for a non-empty relative path made only of plain segments
pub fn is_contained_path(path: &str) -> bool {
    let path = Path::new(path);
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_nullable_fields() {
        let json = r#"{"path":"lib/a.jar","size":1000,"platform":null,"type":null}"#;
        let res: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(res, Resource::new("lib/a.jar", 1000));
        assert_eq!(res.kind(), ResourceKind::Module);

        let json = r#"{"path":"natives/libx.so","size":5,"platform":"LINUX","type":"NATIVE_LOCAL"}"#;
        let res: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(res.platform, Some(Platform::Linux));
        assert_eq!(res.kind(), ResourceKind::NativeLocal);
    }

    #[test]
    fn test_legacy_type_names() {
        for (name, kind) in [
            ("JAR", ResourceKind::Module),
            ("NATIVE", ResourceKind::NativeLocal),
            ("NATIVE_SYS", ResourceKind::NativeSystem),
        ] {
            let json = format!(r#"{{"path":"x","size":1,"type":"{}"}}"#, name);
            let res: Resource = serde_json::from_str(&json).unwrap();
            assert_eq!(res.kind(), kind);
        }
    }

    #[test]
    fn test_unset_fields_are_not_serialized() {
        let json = serde_json::to_string(&Resource::new("lib/a.jar", 3)).unwrap();
        assert_eq!(json, r#"{"path":"lib/a.jar","size":3}"#);
    }

    #[test]
    fn test_platform_filter() {
        let common = Resource::new("a", 1);
        let explicit_common = Resource::new("b", 1).with_platform(Platform::Common);
        let mac = Resource::new("c", 1).with_platform(Platform::Mac);

        assert!(common.applies_to(Platform::Linux));
        assert!(explicit_common.applies_to(Platform::Win));
        assert!(mac.applies_to(Platform::Mac));
        assert!(!mac.applies_to(Platform::Linux));
    }

    #[test]
    fn test_staleness_is_size_only() {
        let temp = TempDir::new().unwrap();
        let res = Resource::new("lib/a.jar", 4);
        assert!(res.is_stale(temp.path()).unwrap(), "missing file is stale");

        fs::create_dir_all(temp.path().join("lib")).unwrap();
        fs::write(temp.path().join("lib/a.jar"), b"abc").unwrap();
        assert!(res.is_stale(temp.path()).unwrap(), "short file is stale");

        fs::write(temp.path().join("lib/a.jar"), b"XXXX").unwrap();
        assert!(
            !res.is_stale(temp.path()).unwrap(),
            "same size counts as current regardless of content"
        );
    }

    #[test]
    fn test_directory_in_place_of_file_is_stale() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("lib/a.jar")).unwrap();
        assert!(Resource::new("lib/a.jar", 0).is_stale(temp.path()).unwrap());
    }

    #[test]
    fn test_remote_url_is_relative_to_base() {
        let base = Url::parse("https://example.com/app/").unwrap();
        let url = Resource::new("lib/a.jar", 1).remote_url(&base).unwrap();
        assert_eq!(url.as_str(), "https://example.com/app/lib/a.jar");
    }

    #[test]
    fn test_logical_name() {
        let expected = if cfg!(windows) { "libsqlite3" } else { "sqlite3" };
        assert_eq!(Resource::new("natives/libsqlite3.so", 1).logical_name(), expected);
        assert_eq!(Resource::new("gl.dll", 1).logical_name(), "gl");
        assert_eq!(Resource::new("z", 1).logical_name(), "z");
    }

    #[test]
    fn test_paths_must_stay_under_root() {
        assert!(Resource::new("lib/a.jar", 1).is_contained());
        assert!(Resource::new("./natives/libx.so", 1).is_contained());
        assert!(!Resource::new("/etc/passwd", 1).is_contained());
        assert!(!Resource::new("../outside.jar", 1).is_contained());
        assert!(!Resource::new("lib/../../outside.jar", 1).is_contained());
        assert!(!Resource::new("", 1).is_contained());
    }
}
