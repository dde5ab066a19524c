use std::sync::Arc;

use crate::behavior::{Activated, Behavior};
use crate::kernel::context::Context;
use crate::kernel::resolver::ActivationError;
use crate::kernel::Instance;

/// Activates a new instance for every request and never tracks it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransientBehavior;

impl Behavior for TransientBehavior {
    fn name(&self) -> &'static str {
        "transient"
    }

    fn resolve(
        &self,
        _context: &Arc<Context>,
        activate: &mut dyn FnMut() -> Result<Activated, ActivationError>,
    ) -> Result<Instance, ActivationError> {
        activate().map(|activated| activated.instance)
    }

    fn release(&self, _address: usize) -> Option<Activated> {
        None
    }

    fn clear(&self) -> Vec<Activated> {
        Vec::new()
    }
}
