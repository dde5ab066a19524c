pub mod dsl;

use std::any;
use std::error::Error;

use crate::kernel::registry::Configurer;

pub use dsl::bind;

/// A unit of configuration. `configure` registers bindings, descriptors and
/// advice on the configurer.
///
/// An error returned by `configure` doesn't abort the kernel's construction
/// right away: it is reported to the configurer and aggregated with the
/// errors of every other module.
pub trait Module: 'static {
    fn setup(&self, configurer: &mut dyn Configurer) {
        if let Err(err) = self.configure(configurer) {
            configurer.report_module_error(any::type_name::<Self>(), err);
        }
    }

    fn configure(
        &self,
        configurer: &mut dyn Configurer,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// A list of modules configured in insertion order.
#[derive(Default)]
pub struct Configuration {
    modules: Vec<Box<dyn Module>>,
}

impl Configuration {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with<M: Module>(mut self, module: M) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn compose(mut self, mut other: Configuration) -> Self {
        self.modules.append(&mut other.modules);
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Module for Configuration {
    fn configure(
        &self,
        configurer: &mut dyn Configurer,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.modules
            .iter()
            .for_each(|module| module.setup(configurer));
        Ok(())
    }
}
