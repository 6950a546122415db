//! Module graph loading
//!
//! Synchronized artifacts become a layer of named modules parented on the
//! launcher's own host layer:
//! - Descriptors declare packages, requirements, exports, opens and entries
//! - Grants add export/open/read edges at load time
//! - Native libraries back entry symbols; host functions back host entries

pub mod controller;
pub mod descriptor;
pub mod entry;
pub mod grant;
pub mod layer;
pub mod loader;

pub use controller::{Controller, ControllerError};
pub use descriptor::{ModuleDescriptor, ModuleFinder, ModuleReference, PackageRule};
pub use entry::{EntryPoint, HostEntry, LaunchContext};
pub use grant::{Grant, GrantOp};
pub use layer::{AccessKind, HostLayerBuilder, Layer, LayerId, Module, ModuleKey};
pub use loader::{Boundary, LoadRequest, ModuleLoader, BOUNDARY_LAYER};
