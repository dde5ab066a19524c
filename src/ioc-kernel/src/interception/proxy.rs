use std::any::{self, Any};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::interception::{
    AdviceRegistry, InterceptionError, Invocation, MethodId, Request, ReturnValue,
};
use crate::kernel::context::Context;
use crate::kernel::registry::BindingId;
use crate::kernel::Instance;
use crate::planning::BoxError;
use crate::service::ImplementationType;

/// Wraps activated instances into proxies which route their calls through a
/// [`Dispatch`].
pub trait ProxyFactory: Send + Sync + 'static {
    fn create_proxy(&self, instance: &Instance, dispatch: Dispatch) -> Result<Instance, BoxError>;
}

/// A [`ProxyFactory`] for the service `S`, written as a closure which wraps
/// the real object.
pub struct TypedProxyFactory<S, F>
where
    S: ?Sized,
{
    factory: F,
    _marker: PhantomData<fn(Arc<S>) -> Arc<S>>,
}

impl<S, F> TypedProxyFactory<S, F>
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<S>, Dispatch) -> Arc<S> + Send + Sync + 'static,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            _marker: PhantomData,
        }
    }
}

impl<S, F> ProxyFactory for TypedProxyFactory<S, F>
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<S>, Dispatch) -> Arc<S> + Send + Sync + 'static,
{
    fn create_proxy(&self, instance: &Instance, dispatch: Dispatch) -> Result<Instance, BoxError> {
        let target = instance.downcast::<S>().ok_or_else(|| {
            format!(
                "cannot proxy `{}` as `{}`",
                instance.service_type(),
                any::type_name::<S>()
            )
        })?;
        Ok(Instance::new((self.factory)(target, dispatch)))
    }
}

/// What a proxy needs to turn one of its calls into an [`Invocation`].
///
/// The context is held weakly so that a proxy stored in its own context does
/// not keep it alive. The binding id outlives it, so advice declared on the
/// binding keeps matching for untracked instances.
#[derive(Clone)]
pub struct Dispatch {
    registry: Arc<AdviceRegistry>,
    context: Weak<Context>,
    binding: BindingId,
    implementation: ImplementationType,
    target: Instance,
}

impl Dispatch {
    pub fn new(
        registry: Arc<AdviceRegistry>,
        context: &Arc<Context>,
        implementation: ImplementationType,
        target: Instance,
    ) -> Self {
        Self {
            registry,
            context: Arc::downgrade(context),
            binding: context.binding().id(),
            implementation,
            target,
        }
    }

    pub fn implementation(&self) -> ImplementationType {
        self.implementation
    }

    pub fn target(&self) -> &Instance {
        &self.target
    }

    pub fn method(&self, name: &'static str) -> MethodId {
        MethodId::new(self.implementation, name)
    }

    /// Builds the invocation of the method `name`, with the interceptors
    /// which apply to it at this moment.
    pub fn create_invocation<'a, F>(
        &self,
        name: &'static str,
        arguments: Vec<Box<dyn Any + Send>>,
        target: F,
    ) -> Invocation<'a>
    where
        F: FnOnce(&mut Request) -> Result<ReturnValue, BoxError> + 'a,
    {
        let request = Request::new(
            self.context.upgrade(),
            self.target.clone(),
            self.method(name),
            arguments,
        )
        .with_binding(self.binding);
        let interceptors = self.registry.get_interceptors(&request);
        tracing::trace!(
            method = %request.method(),
            interceptors = interceptors.len(),
            "dispatching intercepted call",
        );
        Invocation::new(request, interceptors, target)
    }

    /// Runs the method `name` through its interceptors. `target` performs the
    /// real call.
    pub fn invoke<'a, T, F>(
        &self,
        name: &'static str,
        arguments: Vec<Box<dyn Any + Send>>,
        target: F,
    ) -> Result<T, InterceptionError>
    where
        T: Any + Send,
        F: FnOnce(&mut Request) -> Result<T, BoxError> + 'a,
    {
        self.create_invocation(name, arguments, move |request: &mut Request| {
            target(request).map(|value| Box::new(value) as ReturnValue)
        })
        .run_as()
    }
}

impl Debug for Dispatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Dispatch")
            .field("binding", &self.binding)
            .field("implementation", &self.implementation)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::interception::{Advice, InterceptorSource, MatchRule};

    use super::*;

    trait Counter: Send + Sync {
        fn add(&self, a: i32, b: i32) -> i32;
    }

    struct Plain;

    impl Counter for Plain {
        fn add(&self, a: i32, b: i32) -> i32 {
            a + b
        }
    }

    struct CounterProxy {
        inner: Arc<dyn Counter>,
        dispatch: Dispatch,
    }

    impl Counter for CounterProxy {
        fn add(&self, a: i32, b: i32) -> i32 {
            let inner = Arc::clone(&self.inner);
            self.dispatch
                .invoke("add", vec![Box::new(a), Box::new(b)], move |request| {
                    let a = request.take_argument::<i32>(0).ok_or("a")?;
                    let b = request.take_argument::<i32>(1).ok_or("b")?;
                    Ok(inner.add(a, b))
                })
                .unwrap_or_default()
        }
    }

    fn make_dispatch(registry: Arc<AdviceRegistry>, target: Instance) -> Dispatch {
        Dispatch {
            registry,
            context: Weak::new(),
            binding: BindingId::default(),
            implementation: ImplementationType::of::<Plain>(),
            target,
        }
    }

    #[test]
    fn typed_proxy_factory_create_proxy_succeeds() {
        let registry = Arc::new(AdviceRegistry::new());
        registry.register(Advice::new(
            MatchRule::method::<Plain>("add"),
            InterceptorSource::from_fn(|invocation: &mut Invocation<'_>| {
                if let Some(a) = invocation.request_mut().argument_mut::<i32>(0) {
                    *a += 100;
                }
                invocation.proceed()
            }),
            0,
        ));

        let instance = Instance::new(Arc::new(Plain) as Arc<dyn Counter>);
        let factory = TypedProxyFactory::new(|inner: Arc<dyn Counter>, dispatch: Dispatch| {
            Arc::new(CounterProxy { inner, dispatch }) as Arc<dyn Counter>
        });
        let proxy = factory
            .create_proxy(&instance, make_dispatch(registry, instance.clone()))
            .unwrap();

        assert!(!proxy.ptr_eq(&instance));
        assert_eq!(proxy.downcast::<dyn Counter>().unwrap().add(1, 2), 103);
    }

    #[test]
    fn typed_proxy_factory_create_proxy_fails_when_service_differs() {
        let instance = Instance::from_value(1u8);
        let factory = TypedProxyFactory::new(|inner: Arc<dyn Counter>, _: Dispatch| inner);
        let dispatch = make_dispatch(Arc::new(AdviceRegistry::new()), instance.clone());
        assert!(factory.create_proxy(&instance, dispatch).is_err());
    }

    #[test]
    fn dispatch_invoke_without_advice_calls_target() {
        let instance = Instance::from_value(Plain);
        let dispatch = make_dispatch(Arc::new(AdviceRegistry::new()), instance);
        let value: i32 = dispatch
            .invoke("add", Vec::new(), |_: &mut Request| Ok(7))
            .unwrap();
        assert_eq!(value, 7);
    }
}
