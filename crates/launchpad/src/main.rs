//! Launchpad - self-updating application launcher
//!
//! The main thread runs the UI loop; the `launcher` worker checks for
//! updates, synchronizes, loads modules and hands the entry point back to
//! the UI thread.

mod cli;
mod console_view;
mod host;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use launchpad_common::error::{EXIT_CONFIG_ERROR, EXIT_RUNTIME_ERROR};
use launchpad_common::{
    event_loop, launch, BootstrapEnv, LauncherSettings, Platform, SchemeTransport,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

use cli::Cli;
use console_view::ConsoleView;

/// Manifest compiled into the launcher
const EMBEDDED_MANIFEST: &str = include_str!("../app.json");

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("launchpad: {:#}", e);
            ExitCode::from(EXIT_CONFIG_ERROR as u8)
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let settings = LauncherSettings::discover(cli.settings.as_deref())?;
    logging::init(&settings.logging, cli.verbose)?;
    info!("Launchpad v{} starting", env!("CARGO_PKG_VERSION"));

    let root = cli.root.clone().unwrap_or_else(|| settings.install.root.clone());
    let transport =
        SchemeTransport::new(&settings.network).context("Failed to set up HTTP client")?;
    let host = host::layer().context("Failed to describe host modules")?;

    let (ui, event_loop) = event_loop();
    let env = BootstrapEnv {
        root,
        platform: Platform::detect(),
        transport: Arc::new(transport),
        host,
        view: Arc::new(ConsoleView::new(ui.clone())),
        ui,
        args: cli.args.clone(),
    };
    let overrides = cli.overrides();

    // The worker owns every UI handle; the loop ends when it and the
    // application let go of theirs.
    let worker = thread::Builder::new()
        .name("launcher".to_string())
        .spawn(move || {
            launch(EMBEDDED_MANIFEST, &overrides, env);
        })
        .context("Failed to start launcher thread")?;

    let code = event_loop.run();
    Ok(exit_status(code, worker.join()))
}

/// A panicked worker drops its UI handles, which alone reads as success
fn exit_status(loop_code: i32, worker: thread::Result<()>) -> i32 {
    match worker {
        Ok(()) => loop_code,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("❌ Launcher thread panicked: {}", message);
            EXIT_RUNTIME_ERROR
        }
    }
}
