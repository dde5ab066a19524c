use std::marker::PhantomData;
use std::sync::Arc;

use crate::behavior::{Behavior, LifecyclePolicy};
use crate::interception::{Advice, Dispatch, InterceptorSource, MatchRule, TypedProxyFactory};
use crate::kernel::context::ServiceRequest;
use crate::kernel::registry::{Binding, BindingAction, Configurer, TypedConfigurer};
use crate::kernel::Instance;
use crate::planning::{BoxError, TypeDescriptor};
use crate::service::{ImplementationType, ServiceType};

/// A binding of `S` with its provider, ready to be refined and registered
/// with [`BindingSyntax::set_on`].
///
/// A binding without a condition becomes the default binding of `S` unless
/// it is marked with [`BindingSyntax::as_additional`].
pub struct BindingSyntax<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    binding: Binding,
    descriptor: Option<TypeDescriptor>,
    _marker: PhantomData<fn() -> Arc<S>>,
}

impl<S> BindingSyntax<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    pub(super) fn new(binding: Binding) -> Self {
        Self {
            binding,
            descriptor: None,
            _marker: PhantomData,
        }
    }

    pub(super) fn with_descriptor(mut self, descriptor: TypeDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn in_transient_scope(self) -> Self {
        self.in_policy(LifecyclePolicy::Transient)
    }

    pub fn in_singleton_scope(self) -> Self {
        self.in_policy(LifecyclePolicy::Singleton)
    }

    pub fn in_thread_scope(self) -> Self {
        self.in_policy(LifecyclePolicy::Thread)
    }

    /// One instance per [`ActivationScope`], a new one for every request made
    /// outside of any scope.
    ///
    /// [`ActivationScope`]: crate::behavior::ActivationScope
    pub fn in_activation_scope(self) -> Self {
        self.in_policy(LifecyclePolicy::ActivationScope)
    }

    /// Uses a custom behavior. The same behavior object may not be shared by
    /// several bindings.
    pub fn in_behavior(self, behavior: Arc<dyn Behavior>) -> Self {
        self.in_policy(LifecyclePolicy::Custom(behavior))
    }

    fn in_policy(mut self, policy: LifecyclePolicy) -> Self {
        self.binding.set_policy(policy);
        self
    }

    /// Restricts the binding to the requests for which `condition` holds.
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ServiceRequest) -> bool + Send + Sync + 'static,
    {
        self.binding.set_condition(Arc::new(condition));
        self
    }

    /// Restricts the binding to dependencies of `T`, which is either the
    /// implementation or the service of the object being activated.
    pub fn when_injected_into<T>(self) -> Self
    where
        T: ?Sized + 'static,
    {
        self.when(|request| {
            request.parent().is_some_and(|parent| {
                parent.plan().implementation() == ImplementationType::of::<T>()
                    || parent.service() == ServiceType::of::<T>()
            })
        })
    }

    /// Restricts the binding to injection targets called `name`.
    pub fn when_target_named(self, name: &'static str) -> Self {
        self.when(move |request| request.target().is_some_and(|target| target.name() == name))
    }

    /// Supplies the value of the injection target `name`, for every object
    /// activated through this binding.
    pub fn with_argument<T>(mut self, name: &'static str, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.binding
            .set_inline_argument(name, Instance::from_value(value));
        self
    }

    /// Adds advice which only applies to objects activated through this
    /// binding.
    pub fn intercept(mut self, rule: MatchRule, interceptor: InterceptorSource, order: i32) -> Self {
        self.binding
            .add_advice(Advice::new(rule, interceptor, order));
        self
    }

    /// Wraps the activated object with `factory` when some advice may apply
    /// to its implementation type.
    pub fn proxy_with<F>(mut self, factory: F) -> Self
    where
        F: Fn(Arc<S>, Dispatch) -> Arc<S> + Send + Sync + 'static,
    {
        self.binding
            .set_proxy(Arc::new(TypedProxyFactory::<S, F>::new(factory)));
        self
    }

    /// Runs `action` on every object once it is initialized.
    pub fn on_activation<F, E>(mut self, action: F) -> Self
    where
        F: Fn(&Arc<S>) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.binding
            .add_activation_action(typed_action(action));
        self
    }

    /// Runs `action` on every object before it is destroyed.
    pub fn on_deactivation<F, E>(mut self, action: F) -> Self
    where
        F: Fn(&Arc<S>) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.binding
            .add_deactivation_action(typed_action(action));
        self
    }

    /// Keeps an unconditional binding from becoming the default one. It is
    /// then selected like a conditional binding whose condition always holds.
    pub fn as_additional(mut self) -> Self {
        self.binding.set_additional(true);
        self
    }

    pub fn set_on(self, configurer: &mut dyn Configurer) {
        if let Some(descriptor) = self.descriptor {
            configurer.register_descriptor(descriptor);
        }
        configurer.register(self.binding);
    }
}

fn typed_action<S, F, E>(action: F) -> BindingAction
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(&Arc<S>) -> Result<(), E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    Arc::new(move |instance: &Instance| {
        let object = instance.downcast::<S>().ok_or_else(|| {
            BoxError::from(format!(
                "expected an instance of {} but got {}",
                ServiceType::of::<S>(),
                instance.service_type(),
            ))
        })?;
        action(&object).map_err(Into::into)
    })
}
