use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::kernel::context::{Context, ServiceRequest};
use crate::kernel::resolver::{ActivationError, ForwardingResolver, Resolver};
use crate::kernel::{InstanceReference, Managed};
use crate::planning::BoxError;
use crate::provider::{seal_shared, Provider};
use crate::service::ImplementationType;

/// A [`Provider`] which supplies objects from a closure.
///
/// The closure receives a [`ForwardingResolver`], so that dependencies it
/// fetches become children of the current request. It returns the outer
/// error when a dependency can't be resolved and the inner one when the
/// construction itself fails.
///
/// # Examples
///
/// ```rust
/// # use std::convert::Infallible;
/// # use std::sync::Arc;
/// # use ioc_kernel::provider::MethodProvider;
/// let provider = MethodProvider::new(|_| Ok(Ok::<_, Infallible>(Arc::new(42u32))));
/// ```
pub struct MethodProvider<S, F, E>
where
    S: ?Sized + Send + Sync + 'static,
{
    method: F,
    _marker: PhantomData<fn() -> (Arc<S>, E)>,
}

impl<S, F, E> MethodProvider<S, F, E>
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(&ForwardingResolver<'_>) -> Result<Result<Arc<S>, E>, ActivationError>
        + Send
        + Sync
        + 'static,
    E: Into<BoxError> + 'static,
{
    pub fn new(method: F) -> Self {
        Self {
            method,
            _marker: PhantomData,
        }
    }
}

impl<S, F, E> Debug for MethodProvider<S, F, E>
where
    S: ?Sized + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MethodProvider")
            .field("service", &std::any::type_name::<S>())
            .finish_non_exhaustive()
    }
}

impl<S, F, E> Provider for MethodProvider<S, F, E>
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(&ForwardingResolver<'_>) -> Result<Result<Arc<S>, E>, ActivationError>
        + Send
        + Sync
        + 'static,
    E: Into<BoxError> + 'static,
{
    fn implementation_type(&self, _request: &ServiceRequest) -> ImplementationType {
        ImplementationType::of::<Arc<S>>()
    }

    fn create(
        &self,
        resolver: &dyn Resolver,
        context: &Arc<Context>,
    ) -> Result<Option<Box<dyn Managed>>, ActivationError> {
        let forwarding = ForwardingResolver::new(resolver, context);
        match (self.method)(&forwarding)? {
            Ok(object) => Ok(Some(Box::new(object))),
            Err(err) => {
                let source: BoxError = err.into();
                Err(ActivationError::Construction {
                    service: context.service(),
                    source: Arc::from(source),
                    chain: context.chain(),
                })
            }
        }
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
    use std::convert::Infallible;

    use crate::kernel::context::Parameters;
    use crate::kernel::registry::Binding;
    use crate::kernel::resolver::{MockResolver, TypedResolver};
    use crate::planning::ActivationPlan;
    use crate::service::ServiceType;

    use super::*;

    fn make_context<P: Provider>(provider: P) -> Arc<Context> {
        let implementation = provider.implementation_type(&ServiceRequest::new(
            ServiceType::of::<String>(),
            Parameters::new(),
        ));
        let binding = Binding::new(ServiceType::of::<String>(), Arc::new(provider));
        Arc::new(Context::new(
            ServiceRequest::new(ServiceType::of::<String>(), Parameters::new()),
            Arc::new(binding),
            Arc::new(ActivationPlan::opaque(implementation)),
        ))
    }

    #[test]
    fn method_provider_create_resolves_children_of_current_context() {
        let provider = MethodProvider::new(|resolver: &ForwardingResolver<'_>| {
            let count = resolver.get::<u8>()?;
            Ok(Ok::<_, Infallible>(Arc::new("x".repeat(*count as usize))))
        });
        let context = make_context(MethodProvider::new(|_: &ForwardingResolver<'_>| {
            Ok(Ok::<_, Infallible>(Arc::new(String::new())))
        }));
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve_request()
            .withf(|request| request.parent().is_some())
            .returning(|_| Ok(Some(crate::kernel::Instance::from_value(3u8))));

        let raw = provider.create(&resolver, &context).unwrap().unwrap();
        let reference = provider.seal(&context, raw).unwrap();
        assert_eq!(*reference.instance().downcast::<String>().unwrap(), "xxx");
        assert!(reference.concrete().is_none());
    }

    #[test]
    fn method_provider_create_fails_when_method_fails() {
        let provider = MethodProvider::new(|_: &ForwardingResolver<'_>| {
            Ok(Err::<Arc<String>, _>("broken"))
        });
        let context = make_context(MethodProvider::new(|_: &ForwardingResolver<'_>| {
            Ok(Ok::<_, Infallible>(Arc::new(String::new())))
        }));
        let resolver = MockResolver::new();

        match provider.create(&resolver, &context) {
            Err(err @ ActivationError::Construction { .. }) => {
                assert!(err.to_string().contains("broken"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
