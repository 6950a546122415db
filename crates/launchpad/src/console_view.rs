//! Terminal view
//!
//! Every call is posted to the UI thread. The progress bar stays hidden
//! until an update starts, and never draws when stderr is not a terminal.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use launchpad_common::{LauncherError, LauncherView, UiHandle};
use owo_colors::OwoColorize;
use tracing::debug;

/// Progress bar resolution
const STEPS: u64 = 1000;

pub struct ConsoleView {
    ui: UiHandle,
    bar: ProgressBar,
    colors: bool,
}

impl ConsoleView {
    pub fn new(ui: UiHandle) -> Self {
        Self {
            ui,
            bar: ProgressBar::with_draw_target(Some(STEPS), ProgressDrawTarget::hidden()),
            colors: console::colors_enabled_stderr(),
        }
    }

    fn post(&self, task: impl FnOnce() + Send + 'static) {
        if self.ui.run_later(task).is_err() {
            debug!("View update dropped, UI loop is gone");
        }
    }
}

fn print_line(bar: &ProgressBar, line: String) {
    if bar.is_hidden() {
        eprintln!("{}", line);
    } else {
        bar.println(line);
    }
}

impl LauncherView for ConsoleView {
    fn set_phase(&self, text: &str) {
        let bar = self.bar.clone();
        let line = if self.colors {
            format!("{} {}", "▸".cyan(), text.bold())
        } else {
            format!("> {}", text)
        };
        self.post(move || {
            bar.set_message(String::new());
            print_line(&bar, line);
        });
    }

    fn init_update_view(&self) {
        let bar = self.bar.clone();
        self.post(move || {
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{bar:40.cyan/blue} {percent:>3}% {msg}")
            {
                bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
            }
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar.set_position(0);
        });
    }

    fn set_progress(&self, fraction: f64) {
        let bar = self.bar.clone();
        let position = (fraction.clamp(0.0, 1.0) * STEPS as f64).round() as u64;
        self.post(move || {
            bar.set_position(position);
            if position >= STEPS {
                bar.finish();
            }
        });
    }

    fn set_what_new(&self, lines: &[String]) {
        let bar = self.bar.clone();
        let header = if self.colors {
            "What's new".bold().to_string()
        } else {
            "What's new".to_string()
        };
        let lines = lines.to_vec();
        self.post(move || {
            print_line(&bar, header);
            for line in lines {
                print_line(&bar, format!("  • {}", line));
            }
        });
    }

    fn set_error(&self, err: &LauncherError, on_acknowledge: Box<dyn FnOnce() + Send>) {
        let bar = self.bar.clone();
        let message = if self.colors {
            format!("{} {}", "✗".red().bold(), err.red())
        } else {
            format!("error: {}", err)
        };
        let status = err.exit_code();
        self.post(move || {
            bar.finish_and_clear();
            eprintln!("{}", message);
            debug!("Exiting with status {}", status);
            on_acknowledge();
        });
    }
}
