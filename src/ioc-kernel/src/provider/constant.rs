use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::kernel::context::{Context, ServiceRequest};
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::kernel::{InstanceReference, Managed};
use crate::provider::{seal_shared, Provider};
use crate::service::ImplementationType;

/// A [`Provider`] which always hands out the same object.
pub struct ConstantProvider<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    value: Arc<S>,
}

impl<S> ConstantProvider<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    pub fn new(value: Arc<S>) -> Self {
        Self { value }
    }
}

impl<S> Debug for ConstantProvider<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConstantProvider")
            .field("service", &std::any::type_name::<S>())
            .finish_non_exhaustive()
    }
}

impl<S> Provider for ConstantProvider<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    fn implementation_type(&self, _request: &ServiceRequest) -> ImplementationType {
        ImplementationType::of::<Arc<S>>()
    }

    fn create(
        &self,
        _resolver: &dyn Resolver,
        _context: &Arc<Context>,
    ) -> Result<Option<Box<dyn Managed>>, ActivationError> {
        Ok(Some(Box::new(Arc::clone(&self.value))))
    }

    fn seal(
        &self,
        context: &Context,
        raw: Box<dyn Managed>,
    ) -> Result<InstanceReference, ActivationError> {
        seal_shared::<S>(context, raw)
    }
}

#[cfg(test)]
mod tests {
    use crate::kernel::context::Parameters;
    use crate::kernel::registry::Binding;
    use crate::kernel::resolver::MockResolver;
    use crate::planning::ActivationPlan;
    use crate::service::ServiceType;

    use super::*;

    #[test]
    fn constant_provider_succeeds() {
        let value = Arc::new(42i32);
        let binding = Binding::new(
            ServiceType::of::<i32>(),
            Arc::new(ConstantProvider::new(Arc::clone(&value))),
        );
        let context = Arc::new(Context::new(
            ServiceRequest::new(ServiceType::of::<i32>(), Parameters::new()),
            Arc::new(binding),
            Arc::new(ActivationPlan::opaque(ImplementationType::of::<Arc<i32>>())),
        ));
        let provider = ConstantProvider::new(Arc::clone(&value));
        let resolver = MockResolver::new();

        for _ in 0..2 {
            let raw = provider.create(&resolver, &context).unwrap().unwrap();
            let reference = provider.seal(&context, raw).unwrap();
            assert!(Arc::ptr_eq(
                &reference.instance().downcast::<i32>().unwrap(),
                &value
            ));
        }
        assert_eq!(
            provider.implementation_type(context.request()),
            ImplementationType::of::<Arc<i32>>()
        );
    }
}
