//! Progress reporting surface
//!
//! The bootstrap only ever notifies the view; it never waits on it except
//! through the acknowledgement callback of `set_error`.

use tracing::{error, info};

use crate::error::LauncherError;

pub trait LauncherView: Send + Sync {
    fn set_phase(&self, text: &str);

    /// Switch into update mode (progress and release notes)
    fn init_update_view(&self);

    /// Fraction in `0.0..=1.0`
    fn set_progress(&self, fraction: f64);

    fn set_what_new(&self, lines: &[String]);

    /// Show a fatal error; `on_acknowledge` ends the process
    fn set_error(&self, error: &LauncherError, on_acknowledge: Box<dyn FnOnce() + Send>);
}

/// View that only logs; acknowledges errors immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct LogView;

impl LauncherView for LogView {
    fn set_phase(&self, text: &str) {
        info!("{}", text);
    }

    fn init_update_view(&self) {}

    fn set_progress(&self, _fraction: f64) {}

    fn set_what_new(&self, lines: &[String]) {
        for line in lines {
            info!("  • {}", line);
        }
    }

    fn set_error(&self, err: &LauncherError, on_acknowledge: Box<dyn FnOnce() + Send>) {
        error!("❌ {}", err);
        on_acknowledge();
    }
}
