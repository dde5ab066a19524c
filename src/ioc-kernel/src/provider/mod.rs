mod constant;
mod method;
mod standard;

use std::fmt::Debug;
use std::sync::Arc;

use crate::kernel::context::{Context, ServiceRequest, SlotState};
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::kernel::{Instance, InstanceReference, Managed};
use crate::service::ImplementationType;
use crate::util::any::Downcast;

pub use constant::ConstantProvider;
pub use method::MethodProvider;
pub use standard::StandardProvider;

/// Creates the objects of one binding.
///
/// Activation is split in two steps. [`Provider::create`] returns the raw
/// concrete object, which member injection then mutates in place, and
/// [`Provider::seal`] turns the finished object into the shared instance of
/// the bound service.
///
/// In convention, a [`Provider`] is stateless and used by multiple threads.
/// Every call to [`Provider::create`] should produce a new object, unless the
/// provider hands out a constant.
pub trait Provider: Debug + Send + Sync + 'static {
    /// The concrete type this provider creates for `request`, which is the
    /// key of its activation plan.
    fn implementation_type(&self, request: &ServiceRequest) -> ImplementationType;

    /// Creates the raw object. `context` holds the activation plan for
    /// [`Provider::implementation_type`]. Returns `Ok(None)` if nothing could
    /// be produced.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency can't be resolved or the construction
    /// itself fails.
    fn create(
        &self,
        resolver: &dyn Resolver,
        context: &Arc<Context>,
    ) -> Result<Option<Box<dyn Managed>>, ActivationError>;

    /// Wraps the initialized raw object into an instance of the bound service.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` isn't an object this provider created.
    fn seal(
        &self,
        context: &Context,
        raw: Box<dyn Managed>,
    ) -> Result<InstanceReference, ActivationError>;
}

/// The error of [`Provider::seal`] called with an object of another type.
fn foreign_object(context: &Context, raw: &dyn Managed) -> ActivationError {
    tracing::warn!(
        binding = %context.binding(),
        object = raw.type_name(),
        "provider received an object it did not create",
    );
    ActivationError::InvalidOperation {
        operation: "seal",
        state: SlotState::Created,
        chain: context.chain(),
    }
}

/// Seals a raw `Arc<S>` produced by a provider which hands out shared objects
/// as they are.
fn seal_shared<S>(
    context: &Context,
    raw: Box<dyn Managed>,
) -> Result<InstanceReference, ActivationError>
where
    S: ?Sized + Send + Sync + 'static,
{
    match raw.downcast::<Arc<S>>() {
        Ok(object) => Ok(InstanceReference::new(Instance::new(*object), None)),
        Err(raw) => Err(foreign_object(context, &*raw)),
    }
}
