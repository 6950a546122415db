//! The launcher's own host layer
//!
//! Applications can require `launchpad.host` and launch
//! `launchpad.host.Status` to print what is installed.

use anyhow::Result;
use launchpad_common::modules::{HostLayerBuilder, LaunchContext};
use launchpad_common::{Layer, ModuleDescriptor};
use owo_colors::OwoColorize;
use std::sync::Arc;

pub const HOST_LAYER: &str = "launchpad";
pub const HOST_MODULE: &str = "launchpad.host";
pub const STATUS_ENTRY: &str = "launchpad.host.Status";

pub fn builder() -> HostLayerBuilder {
    Layer::host(HOST_LAYER)
        .module(ModuleDescriptor::new(HOST_MODULE).exports(HOST_MODULE))
        .entry(HOST_MODULE, STATUS_ENTRY, status)
}

pub fn layer() -> launchpad_common::Result<Arc<Layer>> {
    builder().build()
}

fn status(ctx: &LaunchContext) -> Result<()> {
    let manifest = &ctx.manifest;
    let marker = if ctx.new_version { " (updated)" } else { "" };
    println!(
        "{} {}{}",
        manifest.app_name.bold(),
        manifest.version,
        marker.green()
    );

    let layer = ctx.boundary.layer();
    let modules: Vec<&str> = layer.modules().map(|m| m.name()).collect();
    if modules.is_empty() {
        println!("  no application modules");
    } else {
        println!("  modules: {}", modules.join(", "));
    }
    if ctx.boundary.native_count() > 0 {
        println!("  native libraries: {}", ctx.boundary.native_count());
    }
    if !ctx.args.is_empty() {
        println!("  arguments: {}", ctx.args.join(" "));
    }
    Ok(())
}
