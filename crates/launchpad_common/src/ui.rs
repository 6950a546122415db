//! UI thread task queue
//!
//! The process main thread runs an `EventLoop`; everything else talks to it
//! through cloneable `UiHandle`s. The loop ends with status 0 once the last
//! handle is dropped, or with whatever status `quit` asks for.

use once_cell::sync::OnceCell;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

use crate::error::{LauncherError, Result, EXIT_SUCCESS};

enum UiTask {
    Run(Box<dyn FnOnce() + Send>),
    Quit(i32),
}

#[derive(Clone)]
pub struct UiHandle {
    tx: Sender<UiTask>,
    ui_thread: Arc<OnceCell<ThreadId>>,
}

impl std::fmt::Debug for UiHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiHandle")
            .field("ui_thread", &self.ui_thread.get())
            .finish()
    }
}

impl UiHandle {
    /// Queue `task` for the UI thread
    pub fn run_later<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(UiTask::Run(Box::new(task)))
            .map_err(|_| LauncherError::UiUnavailable("post a task"))
    }

    /// Run `task` on the UI thread and wait for its result. Called from the
    /// UI thread itself, the task runs inline.
    pub fn run_and_wait<F, R>(&self, task: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_ui_thread() {
            return Ok(task());
        }

        let (done_tx, done_rx) = mpsc::sync_channel(1);
        self.run_later(move || {
            let _ = done_tx.send(task());
        })?;
        done_rx
            .recv()
            .map_err(|_| LauncherError::UiUnavailable("wait for a task"))
    }

    /// Stop the loop with `code`; queued tasks behind this are dropped
    pub fn quit(&self, code: i32) {
        if self.tx.send(UiTask::Quit(code)).is_err() {
            debug!("UI loop already stopped");
        }
    }

    pub fn is_ui_thread(&self) -> bool {
        self.ui_thread.get() == Some(&thread::current().id())
    }
}

pub struct EventLoop {
    rx: Receiver<UiTask>,
    ui_thread: Arc<OnceCell<ThreadId>>,
}

/// A new loop and the first handle to it
pub fn event_loop() -> (UiHandle, EventLoop) {
    let (tx, rx) = mpsc::channel();
    let ui_thread = Arc::new(OnceCell::new());
    (
        UiHandle {
            tx,
            ui_thread: Arc::clone(&ui_thread),
        },
        EventLoop { rx, ui_thread },
    )
}

impl EventLoop {
    /// Drain tasks on the calling thread until quit or every handle is gone
    pub fn run(self) -> i32 {
        let _ = self.ui_thread.set(thread::current().id());
        for task in self.rx.iter() {
            match task {
                UiTask::Run(task) => task(),
                UiTask::Quit(code) => {
                    debug!("UI loop quit with status {}", code);
                    return code;
                }
            }
        }
        debug!("All UI handles released");
        EXIT_SUCCESS
    }
}
