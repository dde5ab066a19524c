//! Interceptor dispatch.
//!
//! Advice associates an interceptor with either one method or a predicate
//! over intercepted calls. A proxy built by a [`ProxyFactory`] turns every
//! call into a [`Request`], asks the [`AdviceRegistry`] for the matching
//! interceptors and runs them as an [`Invocation`].

mod invocation;
mod proxy;
mod registry;

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::service::ImplementationType;

pub use invocation::{InterceptionError, Invocation, Request, ReturnValue};
pub use proxy::{Dispatch, ProxyFactory, TypedProxyFactory};
pub use registry::{AdviceId, AdviceRegistry};

/// Identifies a method of an implementation type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodId {
    owner: ImplementationType,
    name: &'static str,
}

impl MethodId {
    pub fn new(owner: ImplementationType, name: &'static str) -> Self {
        Self { owner, name }
    }

    pub fn of<T>(name: &'static str) -> Self
    where
        T: ?Sized + 'static,
    {
        Self::new(ImplementationType::of::<T>(), name)
    }

    pub fn owner(&self) -> ImplementationType {
        self.owner
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Display for MethodId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}::{}", self.owner, self.name)
    }
}

pub trait Interceptor: Send + Sync + 'static {
    /// Handles an intercepted call. Call [`Invocation::proceed`] to continue
    /// the chain, or set a return value to short-circuit it.
    fn intercept(&self, invocation: &mut Invocation<'_>) -> Result<(), InterceptionError>;
}

impl<F> Interceptor for F
where
    F: Fn(&mut Invocation<'_>) -> Result<(), InterceptionError> + Send + Sync + 'static,
{
    fn intercept(&self, invocation: &mut Invocation<'_>) -> Result<(), InterceptionError> {
        self(invocation)
    }
}

type InterceptorFactory = Arc<dyn Fn(&Request) -> Arc<dyn Interceptor> + Send + Sync>;

/// Where the interceptor of an advice comes from.
#[derive(Clone)]
pub enum InterceptorSource {
    /// One interceptor shared by every call.
    Instance(Arc<dyn Interceptor>),
    /// A new interceptor for every call.
    Factory(InterceptorFactory),
}

impl InterceptorSource {
    pub fn instance<I>(interceptor: I) -> Self
    where
        I: Interceptor,
    {
        Self::Instance(Arc::new(interceptor))
    }

    pub fn from_fn<F>(interceptor: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<(), InterceptionError> + Send + Sync + 'static,
    {
        Self::instance(interceptor)
    }

    pub fn factory<F, I>(factory: F) -> Self
    where
        F: Fn(&Request) -> I + Send + Sync + 'static,
        I: Interceptor,
    {
        Self::Factory(Arc::new(move |request: &Request| -> Arc<dyn Interceptor> {
            Arc::new(factory(request))
        }))
    }

    pub fn get(&self, request: &Request) -> Arc<dyn Interceptor> {
        match self {
            Self::Instance(interceptor) => Arc::clone(interceptor),
            Self::Factory(factory) => factory(request),
        }
    }
}

impl Debug for InterceptorSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Instance(_) => f.write_str("InterceptorSource::Instance"),
            Self::Factory(_) => f.write_str("InterceptorSource::Factory"),
        }
    }
}

type Predicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Decides which calls an advice applies to.
#[derive(Clone)]
pub enum MatchRule {
    Method(MethodId),
    Predicate(Predicate),
}

impl MatchRule {
    pub fn method<T>(name: &'static str) -> Self
    where
        T: ?Sized + 'static,
    {
        Self::Method(MethodId::of::<T>(name))
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Self::Method(method) => method == request.method(),
            Self::Predicate(predicate) => predicate(request),
        }
    }

    /// Whether some call on `implementation` may match, which is always the
    /// case for a predicate.
    pub fn may_apply_to(&self, implementation: ImplementationType) -> bool {
        match self {
            Self::Method(method) => method.owner() == implementation,
            Self::Predicate(_) => true,
        }
    }
}

impl Debug for MatchRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Method(method) => f.debug_tuple("Method").field(method).finish(),
            Self::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

/// An interceptor, the calls it applies to and its position in the chain.
/// Lower orders run earlier.
#[derive(Debug, Clone)]
pub struct Advice {
    rule: MatchRule,
    source: InterceptorSource,
    order: i32,
}

impl Advice {
    pub fn new(rule: MatchRule, source: InterceptorSource, order: i32) -> Self {
        Self {
            rule,
            source,
            order,
        }
    }

    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    pub fn source(&self) -> &InterceptorSource {
        &self.source
    }

    pub fn order(&self) -> i32 {
        self.order
    }
}
