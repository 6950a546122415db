//! Manifest Generator - describe a release directory as a launcher manifest
//!
//! Usage:
//!   manifest_gen --dir dist --url https://updates.example.com/app \
//!       --launch-class com.x.Main --launch-module app --version 1.2.0 \
//!       --change-log "Faster startup" --change-log "New icons"
//!
//! Every file under `--dir` becomes a resource with its current size. The
//! platform comes from a `mac`/`linux`/`win` path segment; files under
//! `natives/` or with a native library extension load as native libraries,
//! unless a `<file>.module.json` descriptor ships next to them.

use anyhow::{Context, Result};
use clap::Parser;
use launchpad_common::manifest::{normalize_url, DEFAULT_CONFIG_PATH};
use launchpad_common::{Manifest, Platform, Resource, ResourceKind};
use launchpad_common::modules::descriptor::DESCRIPTOR_SUFFIX;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "manifest_gen")]
#[command(about = "Generate a launcher manifest from a release directory", long_about = None)]
struct Args {
    /// Release directory to scan
    #[arg(long, value_name = "DIR")]
    dir: PathBuf,

    /// Base URL the release directory is served from
    #[arg(long, value_name = "URL")]
    url: String,

    /// Entry point identifier
    #[arg(long, value_name = "CLASS")]
    launch_class: String,

    /// Module owning the entry point
    #[arg(long, value_name = "MODULE", default_value = "")]
    launch_module: String,

    #[arg(long, value_name = "NAME")]
    app_name: Option<String>,

    #[arg(long, value_name = "VERSION", default_value = "")]
    version: String,

    /// Release note line, repeatable
    #[arg(long, value_name = "LINE")]
    change_log: Vec<String>,

    /// Grant statement, repeatable (`--module-option=--add-reads=a=b`)
    #[arg(long, value_name = "GRANT", allow_hyphen_values = true)]
    module_option: Vec<String>,

    /// Output file [default: DIR/app.json]
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

fn platform_of(relative: &str) -> Option<Platform> {
    relative
        .split('/')
        .filter_map(|segment| match segment.to_lowercase().as_str() {
            "mac" | "macos" | "osx" => Some(Platform::Mac),
            "linux" => Some(Platform::Linux),
            "win" | "windows" => Some(Platform::Win),
            _ => None,
        })
        .next()
}

fn is_native_library(name: &str) -> bool {
    let name = name.to_lowercase();
    name.ends_with(".so")
        || name.contains(".so.")
        || name.ends_with(".dylib")
        || name.ends_with(".jnilib")
        || name.ends_with(".dll")
}

/// `has_descriptor`: a `<file>.module.json` sidecar ships next to the file,
/// which makes a native library a module instead of a preloaded library
fn kind_of(relative: &str, has_descriptor: bool) -> Option<ResourceKind> {
    if relative.ends_with(DESCRIPTOR_SUFFIX) || has_descriptor {
        return None;
    }
    let in_natives = relative.split('/').any(|segment| segment == "natives");
    let file_name = relative.rsplit('/').next().unwrap_or(relative);
    if in_natives || is_native_library(file_name) {
        Some(ResourceKind::NativeLocal)
    } else {
        None
    }
}

// ============================================================================
// SCANNING
// ============================================================================

/// Every file under `dir` except `skip`, sorted by path
fn scan(dir: &Path, skip: &Path) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to scan {}", dir.display()))?;
        if !entry.file_type().is_file() || entry.path() == skip {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("{} is outside {}", entry.path().display(), dir.display()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let size = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?
            .len();

        resources.push(Resource::new(relative, size));
    }

    let paths: HashSet<String> = resources.iter().map(|r| r.path.clone()).collect();
    for resource in &mut resources {
        let sidecar = format!("{}{}", resource.path, DESCRIPTOR_SUFFIX);
        resource.platform = platform_of(&resource.path);
        resource.kind = kind_of(&resource.path, paths.contains(&sidecar));
    }
    Ok(resources)
}

fn generate(args: &Args) -> Result<(Manifest, PathBuf)> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.dir.join(DEFAULT_CONFIG_PATH));
    let resources = scan(&args.dir, &output)?;

    let mut manifest = Manifest {
        url: normalize_url(&args.url),
        version: args.version.clone(),
        change_log: args.change_log.clone(),
        resources,
        launch_class: args.launch_class.clone(),
        launch_module: args.launch_module.clone(),
        module_options: args.module_option.clone(),
        ..Manifest::default()
    };
    if let Some(name) = &args.app_name {
        manifest.app_name = name.clone();
    }
    manifest.validate()?;
    Ok((manifest, output))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (manifest, output) = generate(&args)?;

    let json = manifest.to_json_pretty()?;
    fs::write(&output, json).with_context(|| format!("Failed to write {}", output.display()))?;

    let total: u64 = manifest.resources.iter().map(|r| r.size).sum();
    println!(
        "Wrote {} ({} resources, {} bytes)",
        output.display(),
        manifest.resources.len(),
        total
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put(root: &Path, path: &str, len: usize) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, vec![1u8; len]).unwrap();
    }

    #[test]
    fn test_classification() {
        assert_eq!(platform_of("natives/linux/libgl.so"), Some(Platform::Linux));
        assert_eq!(platform_of("natives/Win/gl.dll"), Some(Platform::Win));
        assert_eq!(platform_of("lib/darwin-tools.jar"), None);
        assert_eq!(kind_of("natives/readme.txt", false), Some(ResourceKind::NativeLocal));
        assert_eq!(kind_of("lib/libcore.so.1", false), Some(ResourceKind::NativeLocal));
        assert_eq!(kind_of("lib/app.module.json", false), None);
        assert_eq!(kind_of("lib/libcore.so.module.json", false), None);
        assert_eq!(kind_of("natives/linux/libgl.so.module.json", false), None);
        assert_eq!(kind_of("lib/libcore.so", true), None);
    }

    #[test]
    fn test_generate_skips_output_and_sorts() {
        let temp = TempDir::new().unwrap();
        put(temp.path(), "lib/b.jar", 20);
        put(temp.path(), "lib/a.jar", 10);
        put(temp.path(), "natives/mac/libgl.dylib", 5);
        put(temp.path(), "app.json", 3);

        let args = Args::try_parse_from([
            "manifest_gen",
            "--dir",
            temp.path().to_str().unwrap(),
            "--url",
            "https://updates.example.com/app",
            "--launch-class",
            "com.x.Main",
            "--version",
            "1.2.0",
            "--change-log",
            "First",
            "--change-log",
            "Second",
            "--module-option",
            "--add-reads=app=util",
        ])
        .unwrap();
        let (manifest, output) = generate(&args).unwrap();

        assert_eq!(output, temp.path().join("app.json"));
        assert_eq!(manifest.url, "https://updates.example.com/app/");
        assert_eq!(manifest.change_log, vec!["First", "Second"]);
        assert_eq!(manifest.module_options, vec!["--add-reads=app=util"]);
        let paths: Vec<&str> = manifest.resources.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["lib/a.jar", "lib/b.jar", "natives/mac/libgl.dylib"]);
        let native = &manifest.resources[2];
        assert_eq!(native.size, 5);
        assert_eq!(native.platform, Some(Platform::Mac));
        assert_eq!(native.kind, Some(ResourceKind::NativeLocal));
    }

    #[test]
    fn test_missing_launch_class_rejected() {
        let temp = TempDir::new().unwrap();
        let args = Args::try_parse_from([
            "manifest_gen",
            "--dir",
            temp.path().to_str().unwrap(),
            "--url",
            "https://updates.example.com/app",
            "--launch-class",
            " ",
        ])
        .unwrap();
        assert!(generate(&args).is_err());
    }

    #[test]
    fn test_native_module_with_sidecar_is_a_module() {
        let temp = TempDir::new().unwrap();
        put(temp.path(), "lib/libcore.so", 8);
        put(temp.path(), "lib/libcore.so.module.json", 4);
        put(temp.path(), "natives/linux/libgl.so", 6);

        let resources = scan(temp.path(), &temp.path().join("app.json")).unwrap();
        let kinds: Vec<(&str, Option<ResourceKind>)> = resources
            .iter()
            .map(|r| (r.path.as_str(), r.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("lib/libcore.so", None),
                ("lib/libcore.so.module.json", None),
                ("natives/linux/libgl.so", Some(ResourceKind::NativeLocal)),
            ]
        );
        assert_eq!(resources[2].platform, Some(Platform::Linux));
    }
}
