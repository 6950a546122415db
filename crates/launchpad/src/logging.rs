//! Logging setup
//!
//! `RUST_LOG` wins; otherwise the settings level, or `debug` with
//! `--verbose`. With `logging.file` set, output is mirrored to that file.

use anyhow::{anyhow, Context, Result};
use launchpad_common::settings::LoggingSettings;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

pub fn init(settings: &LoggingSettings, verbose: bool) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => {
            let level = if verbose { "debug" } else { settings.level.as_str() };
            EnvFilter::try_new(level)
                .with_context(|| format!("Invalid log level `{}`", level))?
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = match &settings.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::io::stderr.and(Mutex::new(file)))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
