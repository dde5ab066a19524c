use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use snafu::prelude::*;

use crate::activation::Phase;
use crate::kernel::context::{Context, ContextChain, Parameters, ServiceRequest, SlotState};
use crate::kernel::Instance;
use crate::service::{ImplementationType, ServiceType};

/// The resolution entry point seen by providers, argument resolvers and
/// activation strategies.
#[cfg_attr(test, mockall::automock)]
pub trait Resolver: Send + Sync {
    /// Resolves a single instance for `request`. Returns `Ok(None)` only for
    /// an optional request no binding matched.
    fn resolve_request(&self, request: ServiceRequest)
        -> Result<Option<Instance>, ActivationError>;

    /// Resolves one instance per binding of the requested service whose
    /// condition holds, in registration order.
    fn resolve_all_requests(&self, request: ServiceRequest)
        -> Result<Vec<Instance>, ActivationError>;

    /// Converts `value` into an instance of `target`, if possible.
    fn coerce(&self, value: &Instance, target: ServiceType) -> Option<Instance>;
}

pub trait TypedResolver: Resolver {
    fn get<S>(&self) -> Result<Arc<S>, ActivationError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.get_with::<S>(Parameters::new())
    }

    fn get_with<S>(&self, parameters: Parameters) -> Result<Arc<S>, ActivationError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let request = ServiceRequest::new(ServiceType::of::<S>(), parameters);
        let chain = request.chain();
        match self.resolve_request(request)? {
            Some(instance) => downcast_instance(&instance, chain),
            None => Err(ActivationError::NotFound {
                service: ServiceType::of::<S>(),
                chain,
            }),
        }
    }

    fn try_get<S>(&self) -> Result<Option<Arc<S>>, ActivationError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let request = ServiceRequest::new(ServiceType::of::<S>(), Parameters::new()).optional(true);
        let chain = request.chain();
        self.resolve_request(request)?
            .map(|instance| downcast_instance(&instance, chain))
            .transpose()
    }

    fn get_all<S>(&self) -> Result<Vec<Arc<S>>, ActivationError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let request = ServiceRequest::new(ServiceType::of::<S>(), Parameters::new());
        let chain = request.chain();
        self.resolve_all_requests(request)?
            .iter()
            .map(|instance| downcast_instance(instance, chain.clone()))
            .collect()
    }

    fn upcast_dyn(&self) -> &dyn Resolver;
}

impl<T> TypedResolver for T
where
    T: Resolver,
{
    fn upcast_dyn(&self) -> &dyn Resolver {
        self
    }
}

impl TypedResolver for dyn Resolver + '_ {
    fn upcast_dyn(&self) -> &dyn Resolver {
        self
    }
}

pub(crate) fn downcast_instance<S>(
    instance: &Instance,
    chain: ContextChain,
) -> Result<Arc<S>, ActivationError>
where
    S: ?Sized + Send + Sync + 'static,
{
    instance
        .downcast::<S>()
        .context(ServiceMismatchSnafu {
            expected: ServiceType::of::<S>(),
            actual: instance.service_type(),
            chain,
        })
}

/// A [`Resolver`] which resolves every request without a parent as a
/// dependency of `context`.
///
/// Factory methods receive one, so whatever they resolve takes part in cycle
/// detection and sees the inherited parameters of the request being built.
pub struct ForwardingResolver<'a> {
    inner: &'a dyn Resolver,
    context: &'a Arc<Context>,
}

impl<'a> ForwardingResolver<'a> {
    pub fn new(inner: &'a dyn Resolver, context: &'a Arc<Context>) -> Self {
        Self { inner, context }
    }

    pub fn context(&self) -> &Arc<Context> {
        self.context
    }

    /// A transient parameter of the request being built.
    pub fn parameter<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.context
            .request()
            .parameters()
            .get(name)
            .and_then(Instance::downcast::<T>)
    }

    fn forward(&self, request: ServiceRequest) -> ServiceRequest {
        if request.parent().is_some() {
            request
        } else {
            request.reparent(self.context)
        }
    }
}

impl Resolver for ForwardingResolver<'_> {
    fn resolve_request(
        &self,
        request: ServiceRequest,
    ) -> Result<Option<Instance>, ActivationError> {
        self.inner.resolve_request(self.forward(request))
    }

    fn resolve_all_requests(
        &self,
        request: ServiceRequest,
    ) -> Result<Vec<Instance>, ActivationError> {
        self.inner.resolve_all_requests(self.forward(request))
    }

    fn coerce(&self, value: &Instance, target: ServiceType) -> Option<Instance> {
        self.inner.coerce(value, target)
    }
}

#[derive(Debug, Clone, Snafu)]
#[non_exhaustive]
pub enum ActivationError {
    #[snafu(display("could not find any binding for {service}{chain}"))]
    #[non_exhaustive]
    NotFound {
        service: ServiceType,
        chain: ContextChain,
    },
    #[snafu(display(
        "could not choose among the {} bindings of {service} which match: {}{chain}",
        bindings.len(),
        bindings.join(", ")
    ))]
    #[non_exhaustive]
    AmbiguousBinding {
        service: ServiceType,
        bindings: Vec<String>,
        chain: ContextChain,
    },
    #[snafu(display(
        "could not plan {implementation} which has {count} constructors marked for injection{chain}"
    ))]
    #[non_exhaustive]
    AmbiguousConstructor {
        implementation: ImplementationType,
        count: usize,
        chain: ContextChain,
    },
    #[snafu(display("could not plan {implementation} which has no usable constructor{chain}"))]
    #[non_exhaustive]
    NoConstructor {
        implementation: ImplementationType,
        chain: ContextChain,
    },
    #[snafu(display(
        "could not plan {implementation} which refers to the unknown interceptor `{name}`{chain}"
    ))]
    #[non_exhaustive]
    UnknownInterceptor {
        implementation: ImplementationType,
        name: &'static str,
        chain: ContextChain,
    },
    #[snafu(display(
        "could not use inline argument `{name}` of type {actual} as {expected}{chain}"
    ))]
    #[non_exhaustive]
    InvalidInlineArgument {
        name: &'static str,
        expected: ServiceType,
        actual: ServiceType,
        chain: ContextChain,
    },
    #[snafu(display("the provider of {service} did not produce an object{chain}"))]
    #[non_exhaustive]
    ProviderFailed {
        service: ServiceType,
        chain: ContextChain,
    },
    #[snafu(display("expected an instance of {expected} but the provider produced {actual}{chain}"))]
    #[non_exhaustive]
    ServiceMismatch {
        expected: ServiceType,
        actual: ServiceType,
        chain: ContextChain,
    },
    #[snafu(display("could not {operation} an instance in the {state:?} state{chain}"))]
    #[non_exhaustive]
    InvalidOperation {
        operation: &'static str,
        state: SlotState,
        chain: ContextChain,
    },
    #[snafu(display("could not activate {service} which depends on itself{chain}"))]
    #[non_exhaustive]
    CyclicDependency {
        service: ServiceType,
        chain: ContextChain,
    },
    #[snafu(display("could not construct {service}: {source}{chain}"))]
    #[non_exhaustive]
    Construction {
        service: ServiceType,
        source: Arc<dyn Error + Send + Sync>,
        chain: ContextChain,
    },
    #[snafu(display("the {phase} step of {service} failed: {source}{chain}"))]
    #[non_exhaustive]
    Lifecycle {
        service: ServiceType,
        phase: Phase,
        source: Arc<dyn Error + Send + Sync>,
        chain: ContextChain,
    },
    #[snafu(display("{} failure(s) while destroying an instance:{}", failures.len(), FailuresDisplayer(failures)))]
    #[non_exhaustive]
    Destruction { failures: Vec<ActivationError> },
}

impl ActivationError {
    /// The context chain the error was raised in.
    pub fn chain(&self) -> Option<&ContextChain> {
        match self {
            Self::NotFound { chain, .. }
            | Self::AmbiguousBinding { chain, .. }
            | Self::AmbiguousConstructor { chain, .. }
            | Self::NoConstructor { chain, .. }
            | Self::UnknownInterceptor { chain, .. }
            | Self::InvalidInlineArgument { chain, .. }
            | Self::ProviderFailed { chain, .. }
            | Self::ServiceMismatch { chain, .. }
            | Self::InvalidOperation { chain, .. }
            | Self::CyclicDependency { chain, .. }
            | Self::Construction { chain, .. }
            | Self::Lifecycle { chain, .. } => Some(chain),
            Self::Destruction { .. } => None,
        }
    }
}

struct FailuresDisplayer<'a>(&'a [ActivationError]);

impl Display for FailuresDisplayer<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for (i, err) in self.0.iter().enumerate() {
            write!(f, "\n  {}: {}", i + 1, err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::kernel::registry::Binding;
    use crate::planning::ActivationPlan;
    use crate::provider::ConstantProvider;

    use super::*;

    #[test]
    fn typed_resolver_get_succeeds() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve_request()
            .withf(|request| request.service() == ServiceType::of::<String>())
            .returning(|_| Ok(Some(Instance::from_value(String::from("value")))));

        let value = resolver.get::<String>().unwrap();
        assert_eq!(value.as_str(), "value");
    }

    #[test]
    fn typed_resolver_get_fails_when_instance_has_other_type() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve_request()
            .returning(|_| Ok(Some(Instance::from_value(1u8))));

        let res = resolver.upcast_dyn().get::<String>();
        assert!(matches!(res, Err(ActivationError::ServiceMismatch { .. })));
    }

    #[test]
    fn typed_resolver_try_get_sends_optional_request() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve_request()
            .withf(|request| request.is_optional())
            .returning(|_| Ok(None));

        assert!(resolver.try_get::<String>().unwrap().is_none());
    }

    #[test]
    fn typed_resolver_get_all_succeeds() {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve_all_requests().returning(|_| {
            Ok(vec![
                Instance::from_value(1u32),
                Instance::from_value(2u32),
            ])
        });

        let values = resolver.get_all::<u32>().unwrap();
        assert_eq!(values.iter().map(|v| **v).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn forwarding_resolver_reparents_requests() {
        let binding = Arc::new(Binding::new(
            ServiceType::of::<u32>(),
            Arc::new(ConstantProvider::new(Arc::new(0u32))),
        ));
        let context = Arc::new(Context::new(
            ServiceRequest::new(
                ServiceType::of::<u32>(),
                Parameters::new().with_inherited("shared", 5i32).with("local", 6i32),
            ),
            binding,
            Arc::new(ActivationPlan::opaque(ImplementationType::of::<Arc<u32>>())),
        ));

        let mut inner = MockResolver::new();
        inner
            .expect_resolve_request()
            .withf(|request| {
                request.depth() == 1
                    && request.parent().is_some()
                    && request.parameters().get("shared").is_some()
                    && request.parameters().get("local").is_none()
            })
            .times(1)
            .returning(|_| Ok(Some(Instance::from_value(1u8))));

        let forwarding = ForwardingResolver::new(&inner, &context);
        assert_eq!(*forwarding.get::<u8>().unwrap(), 1);
        assert_eq!(*forwarding.parameter::<i32>("local").unwrap(), 6);
    }

    #[test]
    fn destruction_error_lists_every_failure() {
        let err = ActivationError::Destruction {
            failures: vec![
                ActivationError::ProviderFailed {
                    service: ServiceType::of::<u8>(),
                    chain: ContextChain::default(),
                },
                ActivationError::NotFound {
                    service: ServiceType::of::<u16>(),
                    chain: ContextChain::default(),
                },
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("2 failure(s)"));
        assert!(message.contains("1: the provider of u8"));
        assert!(message.contains("2: could not find any binding for u16"));
        assert!(err.chain().is_none());
    }
}
