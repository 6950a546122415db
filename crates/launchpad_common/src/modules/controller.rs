//! Layer controllers
//!
//! A controller is the only way to add edges to the modules of one layer.
//! Loaders hand them out for layers they define or were given.

use std::sync::Arc;
use tracing::debug;

use super::layer::{Layer, Module};

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("module {module} is not defined in layer {layer}")]
    NotInLayer { module: String, layer: String },

    #[error("package {package} not in module {module}")]
    UnknownPackage { package: String, module: String },
}

#[derive(Debug, Clone)]
pub struct Controller {
    layer: Arc<Layer>,
}

impl Controller {
    pub(crate) fn new(layer: Arc<Layer>) -> Self {
        Self { layer }
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.layer
    }

    /// `source` reads `target` from now on
    pub fn add_reads(&self, source: &Module, target: &Module) -> Result<(), ControllerError> {
        self.check_owner(source)?;
        source.add_read(target);
        debug!("{} now reads {}", source.name(), target.name());
        Ok(())
    }

    /// `package` of `source` becomes accessible to `target`
    pub fn add_exports(
        &self,
        source: &Module,
        package: &str,
        target: &Module,
    ) -> Result<(), ControllerError> {
        self.check_package(source, package)?;
        source.add_export(package, target);
        debug!("{}/{} exported to {}", source.name(), package, target.name());
        Ok(())
    }

    /// `package` of `source` becomes reflectively accessible to `target`
    pub fn add_opens(
        &self,
        source: &Module,
        package: &str,
        target: &Module,
    ) -> Result<(), ControllerError> {
        self.check_package(source, package)?;
        source.add_open(package, target);
        debug!("{}/{} opened to {}", source.name(), package, target.name());
        Ok(())
    }

    fn check_owner(&self, source: &Module) -> Result<(), ControllerError> {
        if source.layer() != self.layer.id() {
            return Err(ControllerError::NotInLayer {
                module: source.name().to_string(),
                layer: self.layer.name().to_string(),
            });
        }
        Ok(())
    }

    fn check_package(&self, source: &Module, package: &str) -> Result<(), ControllerError> {
        self.check_owner(source)?;
        if !source.descriptor().contains_package(package) {
            return Err(ControllerError::UnknownPackage {
                package: package.to_string(),
                module: source.name().to_string(),
            });
        }
        Ok(())
    }
}
