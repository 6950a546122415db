//! Application manifest
//!
//! The manifest names the application version, where its files come from,
//! which files make it up and how its modules are wired. It is parsed once
//! and then only ever replaced as a whole: the bootstrap holds it in an `Arc`
//! and swaps the pointer when a newer manifest wins.

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LauncherError, Result};
use crate::platform::Platform;
use crate::resource::{is_contained_path, Resource};
use crate::transport::Transport;

/// Default manifest location, locally and remotely
pub const DEFAULT_CONFIG_PATH: &str = "app.json";

/// Application name used when a manifest names none
pub const DEFAULT_APP_NAME: &str = "Launchpad";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Relative path of this document
    #[serde(default = "default_config_path", deserialize_with = "or_default_config_path")]
    pub config_path: String,

    #[serde(default = "default_app_name", deserialize_with = "or_default_app_name")]
    pub app_name: String,

    /// Base location of all resources, always ending in `/`
    #[serde(default, deserialize_with = "normalized_url")]
    pub url: String,

    /// Explicit remote manifest location, overrides `url` + `config_path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_url: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub version: String,

    /// Release notes in display order
    #[serde(default, deserialize_with = "nullable")]
    pub change_log: Vec<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub resources: Vec<Resource>,

    /// Entry point identifier
    #[serde(default, deserialize_with = "nullable")]
    pub launch_class: String,

    /// Module owning the entry point; empty for non-modular loading
    #[serde(default, deserialize_with = "nullable")]
    pub launch_module: String,

    /// Grant statements applied before the entry point loads
    #[serde(default, deserialize_with = "nullable")]
    pub module_options: Vec<String>,
}

fn default_config_path() -> String {
    DEFAULT_CONFIG_PATH.to_string()
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn or_default_config_path<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(default_config_path))
}

fn or_default_app_name<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_app_name))
}

fn normalized_url<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let url: String = nullable(deserializer)?;
    Ok(normalize_url(&url))
}

/// Ensure a non-empty base url ends with `/` so relative paths join under it
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Named process-argument overrides for the embedded manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub name: Option<String>,
    pub url: Option<String>,
    pub config_url: Option<String>,
    pub launch_class: Option<String>,
    pub launch_module: Option<String>,
    pub config_path: Option<String>,
    pub version: Option<String>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        *self == Overrides::default()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            app_name: default_app_name(),
            url: String::new(),
            config_url: None,
            version: String::new(),
            change_log: Vec::new(),
            resources: Vec::new(),
            launch_class: String::new(),
            launch_module: String::new(),
            module_options: Vec::new(),
        }
    }
}

impl Manifest {
    /// Parse a manifest document; `origin` only labels errors
    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|source| LauncherError::ManifestParse {
            origin: origin.to_string(),
            source,
        })
    }

    /// The manifest compiled into the launcher; blank means defaults
    pub fn embedded(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::parse(text, "<embedded>")
    }

    /// Read a manifest from local disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| LauncherError::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Fetch and parse a manifest from the update source
    pub fn fetch(transport: &dyn Transport, url: &Url) -> Result<Self> {
        let text = transport
            .fetch_string(url)
            .map_err(|source| LauncherError::Fetch {
                url: url.to_string(),
                source,
            })?;
        Self::parse(&text, url.as_str())
    }

    /// Apply process-argument overrides, producing a new manifest
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(name) = &overrides.name {
            self.app_name = name.clone();
        }
        if let Some(url) = &overrides.url {
            self.url = normalize_url(url);
        }
        if let Some(config_url) = &overrides.config_url {
            self.config_url = Some(config_url.clone());
        }
        if let Some(launch_class) = &overrides.launch_class {
            self.launch_class = launch_class.clone();
        }
        if let Some(launch_module) = &overrides.launch_module {
            self.launch_module = launch_module.clone();
        }
        if let Some(config_path) = &overrides.config_path {
            self.config_path = config_path.clone();
        }
        if let Some(version) = &overrides.version {
            self.version = version.clone();
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Non-blank `launchClass`; every local path stays under the install root
    pub fn validate(&self) -> Result<()> {
        if self.launch_class.trim().is_empty() {
            return Err(LauncherError::InvalidManifest(format!(
                "launchClass is empty (app={}, version={})",
                self.app_name, self.version
            )));
        }
        if !is_contained_path(&self.config_path) {
            return Err(LauncherError::InvalidManifest(format!(
                "configPath {} escapes the install root",
                self.config_path
            )));
        }
        if let Some(resource) = self.resources.iter().find(|r| !r.is_contained()) {
            return Err(LauncherError::InvalidManifest(format!(
                "resource {} escapes the install root",
                resource.path
            )));
        }
        Ok(())
    }

    /// Base url for resources
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.url).map_err(|e| LauncherError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    /// Where the remote copy of this manifest lives
    pub fn remote_manifest_url(&self) -> Result<Url> {
        match self.config_url.as_deref().map(str::trim) {
            Some(config_url) if !config_url.is_empty() => {
                Url::parse(config_url).map_err(|e| LauncherError::InvalidUrl {
                    url: config_url.to_string(),
                    reason: e.to_string(),
                })
            }
            _ => self
                .base_url()?
                .join(&self.config_path)
                .map_err(|e| LauncherError::InvalidUrl {
                    url: format!("{}{}", self.url, self.config_path),
                    reason: e.to_string(),
                }),
        }
    }

    /// Where the synchronized copy of this manifest lives
    pub fn local_manifest_path(&self, root: &Path) -> PathBuf {
        root.join(&self.config_path)
    }

    /// Resources needed on `platform`, in document order
    pub fn resources_for(&self, platform: Platform) -> Vec<&Resource> {
        self.resources
            .iter()
            .filter(|r| r.applies_to(platform))
            .collect()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| LauncherError::ManifestParse {
            origin: "<serialize>".to_string(),
            source,
        })
    }
}

/// Value equality; the resource list compares as a set
impl PartialEq for Manifest {
    fn eq(&self, other: &Self) -> bool {
        self.config_path == other.config_path
            && self.app_name == other.app_name
            && self.url == other.url
            && self.config_url == other.config_url
            && self.version == other.version
            && self.change_log == other.change_log
            && self.launch_class == other.launch_class
            && self.launch_module == other.launch_module
            && self.module_options == other.module_options
            && self.resources.iter().collect::<BTreeSet<_>>()
                == other.resources.iter().collect::<BTreeSet<_>>()
    }
}

impl Eq for Manifest {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "appName": "Demo",
        "url": "https://updates.example.com/demo",
        "version": "1.0",
        "changeLog": ["faster startup", "new icons"],
        "resources": [
            {"path": "lib/a.jar", "size": 1000},
            {"path": "natives/libgl.so", "size": 10, "platform": "LINUX", "type": "NATIVE_LOCAL"}
        ],
        "launchClass": "com.demo.Main",
        "launchModule": "demo.app",
        "moduleOptions": ["--add-reads=demo.app=demo.util"]
    }"#;

    #[test]
    fn test_parse_sample() {
        let m = Manifest::parse(SAMPLE, "test").unwrap();
        assert_eq!(m.app_name, "Demo");
        assert_eq!(m.config_path, DEFAULT_CONFIG_PATH);
        assert_eq!(m.url, "https://updates.example.com/demo/");
        assert_eq!(m.change_log, vec!["faster startup", "new icons"]);
        assert_eq!(m.resources.len(), 2);
        assert_eq!(m.resources[1].kind(), ResourceKind::NativeLocal);
        assert!(m.is_valid());
    }

    #[test]
    fn test_nulls_read_as_defaults() {
        let m = Manifest::parse(
            r#"{"configPath":null,"appName":null,"url":null,"version":null,"changeLog":null,
                "resources":null,"launchClass":"a.B","launchModule":null,"moduleOptions":null}"#,
            "test",
        )
        .unwrap();
        assert_eq!(m.config_path, DEFAULT_CONFIG_PATH);
        assert_eq!(m.app_name, DEFAULT_APP_NAME);
        assert!(m.url.is_empty());
        assert!(m.resources.is_empty());
        assert!(m.launch_module.is_empty());
    }

    #[test]
    fn test_blank_embedded_is_default() {
        let m = Manifest::embedded("  \n").unwrap();
        assert_eq!(m, Manifest::default());
        assert!(!m.is_valid());
    }

    #[test]
    fn test_validate_requires_launch_class() {
        let m = Manifest {
            launch_class: "   ".into(),
            ..Manifest::default()
        };
        assert!(matches!(
            m.validate(),
            Err(LauncherError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_escaping_paths() {
        for path in ["/tmp/evil.jar", "../evil.jar", "lib/../../evil.jar"] {
            let m = Manifest {
                launch_class: "a.B".into(),
                resources: vec![Resource::new(path, 1)],
                ..Manifest::default()
            };
            assert!(
                matches!(m.validate(), Err(LauncherError::InvalidManifest(_))),
                "{} accepted",
                path
            );
        }

        let m = Manifest {
            launch_class: "a.B".into(),
            config_path: "../app.json".into(),
            ..Manifest::default()
        };
        assert!(!m.is_valid());
    }

    #[test]
    fn test_overrides_replace_fields() {
        let overrides = Overrides {
            name: Some("Other".into()),
            url: Some("http://localhost:8080/files".into()),
            launch_class: Some("x.Y".into()),
            config_path: Some("conf/app.json".into()),
            ..Overrides::default()
        };
        let m = Manifest::parse(SAMPLE, "test").unwrap().with_overrides(&overrides);
        assert_eq!(m.app_name, "Other");
        assert_eq!(m.url, "http://localhost:8080/files/");
        assert_eq!(m.launch_class, "x.Y");
        assert_eq!(m.config_path, "conf/app.json");
        assert_eq!(m.version, "1.0", "untouched fields stay");
    }

    #[test]
    fn test_remote_manifest_url() {
        let mut m = Manifest::parse(SAMPLE, "test").unwrap();
        assert_eq!(
            m.remote_manifest_url().unwrap().as_str(),
            "https://updates.example.com/demo/app.json"
        );

        m.config_url = Some("   ".into());
        assert_eq!(
            m.remote_manifest_url().unwrap().as_str(),
            "https://updates.example.com/demo/app.json",
            "blank configUrl falls back to url + configPath"
        );

        m.config_url = Some("https://cdn.example.com/demo.json".into());
        assert_eq!(
            m.remote_manifest_url().unwrap().as_str(),
            "https://cdn.example.com/demo.json"
        );
    }

    #[test]
    fn test_remote_manifest_url_without_base_is_error() {
        let m = Manifest::default();
        assert!(matches!(
            m.remote_manifest_url(),
            Err(LauncherError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_equality_ignores_resource_order() {
        let a = Manifest::parse(SAMPLE, "test").unwrap();
        let mut b = a.clone();
        b.resources.reverse();
        assert_eq!(a, b);

        b.resources[0].size += 1;
        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_covers_every_field() {
        let a = Manifest::parse(SAMPLE, "test").unwrap();
        let mut b = a.clone();
        b.change_log.push("one more".into());
        assert_ne!(a, b);

        let mut c = a.clone();
        c.module_options.clear();
        assert_ne!(a, c);
    }

    #[test]
    fn test_serialized_manifest_reads_back_equal() {
        let temp = TempDir::new().unwrap();
        let m = Manifest::parse(SAMPLE, "test").unwrap();
        let path = m.local_manifest_path(temp.path());
        fs::write(&path, m.to_json_pretty().unwrap()).unwrap();
        assert_eq!(Manifest::load(&path).unwrap(), m);
    }

    #[test]
    fn test_resources_for_platform() {
        let m = Manifest::parse(SAMPLE, "test").unwrap();
        assert_eq!(m.resources_for(Platform::Linux).len(), 2);
        let win = m.resources_for(Platform::Win);
        assert_eq!(win.len(), 1);
        assert_eq!(win[0].path, "lib/a.jar");
    }
}
