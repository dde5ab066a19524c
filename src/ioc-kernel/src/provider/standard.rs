use std::any;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::kernel::context::{Context, ServiceRequest};
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::kernel::{Instance, InstanceReference, Managed};
use crate::planning::{resolve_arguments, Injectable};
use crate::provider::{foreign_object, Provider};
use crate::service::ImplementationType;
use crate::util::any::Downcast;

/// Constructs `I` through the constructor chosen by its activation plan and
/// hands it out as the service `S`.
///
/// `cast` converts the concrete object into the service, usually an unsizing
/// coercion such as `|object| object as Arc<dyn Trait>`.
pub struct StandardProvider<I, S>
where
    I: Injectable,
    S: ?Sized + Send + Sync + 'static,
{
    cast: fn(Arc<I>) -> Arc<S>,
}

impl<I, S> StandardProvider<I, S>
where
    I: Injectable,
    S: ?Sized + Send + Sync + 'static,
{
    pub fn new(cast: fn(Arc<I>) -> Arc<S>) -> Self {
        Self { cast }
    }
}

impl<I> StandardProvider<I, I>
where
    I: Injectable,
{
    /// Hands out `I` itself.
    pub fn to_self() -> Self {
        Self::new(|object| object)
    }
}

impl<I, S> Debug for StandardProvider<I, S>
where
    I: Injectable,
    S: ?Sized + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StandardProvider")
            .field("implementation", &any::type_name::<I>())
            .field("service", &any::type_name::<S>())
            .finish()
    }
}

impl<I, S> Provider for StandardProvider<I, S>
where
    I: Injectable,
    S: ?Sized + Send + Sync + 'static,
{
    fn implementation_type(&self, _request: &ServiceRequest) -> ImplementationType {
        ImplementationType::of::<I>()
    }

    fn create(
        &self,
        resolver: &dyn Resolver,
        context: &Arc<Context>,
    ) -> Result<Option<Box<dyn Managed>>, ActivationError> {
        let plan = context.plan();
        let Some(constructor) = plan.constructor() else {
            return Err(ActivationError::NoConstructor {
                implementation: plan.implementation(),
                chain: context.chain(),
            });
        };

        let arguments = resolve_arguments(constructor.arguments(), resolver, context)?;
        tracing::trace!(
            implementation = %plan.implementation(),
            constructor = constructor.name(),
            arguments = arguments.len(),
            "invoking constructor",
        );
        let object =
            (constructor.invoker())(arguments).map_err(|err| ActivationError::Construction {
                service: context.service(),
                source: Arc::from(err),
                chain: context.chain(),
            })?;
        Ok(Some(object))
    }

    fn seal(
        &self,
        context: &Context,
        raw: Box<dyn Managed>,
    ) -> Result<InstanceReference, ActivationError> {
        let object: Arc<I> = match raw.downcast::<I>() {
            Ok(object) => Arc::from(object),
            Err(raw) => return Err(foreign_object(context, &*raw)),
        };
        let concrete: Arc<dyn Managed> = Arc::clone(&object) as Arc<dyn Managed>;
        Ok(InstanceReference::new(
            Instance::new((self.cast)(object)),
            Some(concrete),
        ))
    }
}
