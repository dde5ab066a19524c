use std::sync::Arc;

use crate::coercion::{Coercer, StandardCoercer};

/// Options of a [`Kernel`], built with chained setters.
///
/// ```rust
/// # use ioc_kernel::kernel::KernelSettings;
/// let settings = KernelSettings::new()
///     .eager_activation(true)
///     .coerce_inline_arguments(false);
/// assert!(settings.is_eager_activation());
/// ```
///
/// [`Kernel`]: crate::kernel::Kernel
#[derive(Debug, Clone)]
pub struct KernelSettings {
    eager_activation: bool,
    coerce_inline_arguments: bool,
    coercer: Arc<dyn Coercer>,
}

impl KernelSettings {
    pub fn new() -> Self {
        Self {
            eager_activation: false,
            coerce_inline_arguments: true,
            coercer: Arc::new(StandardCoercer),
        }
    }

    /// Activates every singleton while the kernel is built instead of on
    /// first request.
    pub fn eager_activation(mut self, enabled: bool) -> Self {
        self.eager_activation = enabled;
        self
    }

    /// Whether inline arguments of another type than their target are
    /// converted. Without it such an argument fails the activation.
    pub fn coerce_inline_arguments(mut self, enabled: bool) -> Self {
        self.coerce_inline_arguments = enabled;
        self
    }

    pub fn coercer(mut self, coercer: Arc<dyn Coercer>) -> Self {
        self.coercer = coercer;
        self
    }

    pub fn is_eager_activation(&self) -> bool {
        self.eager_activation
    }

    pub fn is_coercing_inline_arguments(&self) -> bool {
        self.coerce_inline_arguments
    }

    pub fn get_coercer(&self) -> &Arc<dyn Coercer> {
        &self.coercer
    }
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self::new()
    }
}
