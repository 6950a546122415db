//! Launchpad Common - self-updating application bootstrap
//!
//! Keeps a local install in step with a remote manifest, then loads the
//! application's modules into an isolated layer and starts its entry point.

pub mod bootstrap;
pub mod error;
pub mod manifest;
pub mod modules;
pub mod platform;
pub mod resource;
pub mod settings;
pub mod transport;
pub mod ui;
pub mod updater;
pub mod view;

pub use bootstrap::{launch, report_failure, Bootstrap, BootstrapEnv, Stage};
pub use error::{ErrorKind, LauncherError, Result};
pub use manifest::{Manifest, Overrides};
pub use modules::{Boundary, Layer, LaunchContext, ModuleDescriptor, ModuleLoader};
pub use platform::Platform;
pub use resource::{Resource, ResourceKind};
pub use settings::LauncherSettings;
pub use transport::{FileTransport, HttpTransport, SchemeTransport, Transport};
pub use ui::{event_loop, EventLoop, UiHandle};
pub use view::{LauncherView, LogView};
