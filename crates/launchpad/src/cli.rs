//! Command line
//!
//! Named overrides for the embedded manifest, launcher options, and
//! application arguments after `--`.

use clap::Parser;
use launchpad_common::Overrides;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "launchpad")]
#[command(about = "Keeps an application up to date, then launches it", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Application name shown while launching
    #[arg(long, value_name = "NAME", alias = "appName")]
    pub name: Option<String>,

    /// Base URL of the update source
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Explicit remote manifest URL
    #[arg(long, value_name = "URL", alias = "configUrl")]
    pub config_url: Option<String>,

    /// Entry point identifier
    #[arg(long, value_name = "CLASS", alias = "launchClass")]
    pub launch_class: Option<String>,

    /// Module owning the entry point
    #[arg(long, value_name = "MODULE", alias = "launchModule")]
    pub launch_module: Option<String>,

    /// Manifest path, locally and relative to the update source
    #[arg(long, value_name = "PATH", alias = "configPath")]
    pub config_path: Option<String>,

    /// Application version assumed when nothing is installed
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Launcher settings file
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Install root (overrides settings)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Arguments forwarded to the application
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            name: self.name.clone(),
            url: self.url.clone(),
            config_url: self.config_url.clone(),
            launch_class: self.launch_class.clone(),
            launch_module: self.launch_module.clone(),
            config_path: self.config_path.clone(),
            version: self.version.clone(),
        }
    }
}
