use std::marker::PhantomData;
use std::sync::Arc;

use crate::kernel::registry::Binding;
use crate::kernel::resolver::{ActivationError, ForwardingResolver};
use crate::module::dsl::binding_helper::BindingSyntax;
use crate::planning::{BoxError, Injectable};
use crate::provider::{ConstantProvider, MethodProvider, Provider, StandardProvider};
use crate::service::ServiceType;

/// A binding of `S` which doesn't know how to produce its instances yet.
pub struct BindTarget<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    _marker: PhantomData<fn() -> Arc<S>>,
}

impl<S> BindTarget<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    pub(super) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Activates `I` through its descriptor and hands it out as `S`.
    ///
    /// `cast` is usually a plain upcast such as `|it| it`, which the compiler
    /// turns into an unsizing coercion.
    pub fn to<I>(self, cast: fn(Arc<I>) -> Arc<S>) -> BindingSyntax<S>
    where
        I: Injectable,
    {
        BindingSyntax::new(self.binding(StandardProvider::<I, S>::new(cast)))
            .with_descriptor(I::describe())
    }

    /// Calls `method` for every new instance.
    pub fn to_method<F, E>(self, method: F) -> BindingSyntax<S>
    where
        F: Fn(&ForwardingResolver<'_>) -> Result<Result<Arc<S>, E>, ActivationError>
            + Send
            + Sync
            + 'static,
        E: Into<BoxError> + 'static,
    {
        BindingSyntax::new(self.binding(MethodProvider::new(method)))
    }

    /// Hands out `value` itself. Combined with a caching scope, releasing it
    /// still runs the deactivation actions.
    pub fn to_constant(self, value: Arc<S>) -> BindingSyntax<S> {
        BindingSyntax::new(self.binding(ConstantProvider::new(value)))
    }

    pub fn to_provider<P>(self, provider: P) -> BindingSyntax<S>
    where
        P: Provider,
    {
        BindingSyntax::new(self.binding(provider))
    }

    fn binding<P>(&self, provider: P) -> Binding
    where
        P: Provider,
    {
        Binding::new(ServiceType::of::<S>(), Arc::new(provider))
    }
}

impl<S> BindTarget<S>
where
    S: Injectable,
{
    /// Activates `S` itself through its descriptor.
    pub fn to_self(self) -> BindingSyntax<S> {
        BindingSyntax::new(self.binding(StandardProvider::<S, S>::to_self()))
            .with_descriptor(S::describe())
    }
}
