//! A fluent syntax for registering bindings.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use ioc_kernel::module::bind;
//! # use ioc_kernel::kernel::registry::Configurer;
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//!
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         String::from("hello")
//!     }
//! }
//!
//! fn configure(configurer: &mut dyn Configurer) {
//!     bind::<dyn Greeter>()
//!         .to_constant(Arc::new(English))
//!         .in_singleton_scope()
//!         .set_on(configurer);
//! }
//! ```

pub mod binding_helper;
pub mod target_helper;

use target_helper::BindTarget;

/// Starts a binding of the service `S`, which is usually a trait object.
pub fn bind<S>() -> BindTarget<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    BindTarget::new()
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::error::Error;
    use std::sync::Arc;

    use crate::behavior::TransientBehavior;
    use crate::interception::{InterceptorSource, Invocation, MatchRule};
    use crate::kernel::context::Parameters;
    use crate::kernel::registry::{Configurer, ConfigurerImpl};
    use crate::kernel::resolver::{ActivationError, TypedResolver};
    use crate::module::Module;
    use crate::planning::{Injectable, TypeDescriptor};
    use crate::provider::ConstantProvider;
    use crate::service::ServiceType;

    use super::*;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    #[derive(Default)]
    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            42
        }
    }

    impl Injectable for FixedClock {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::builder::<Self>()
                .constructor("FixedClock::default", vec![], true, |_| {
                    Ok::<_, Infallible>(FixedClock)
                })
                .build()
        }
    }

    struct DslCompilationTest;

    impl Module for DslCompilationTest {
        fn configure(
            &self,
            configurer: &mut dyn Configurer,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            bind::<dyn Clock>()
                .to::<FixedClock>(|clock| clock)
                .in_singleton_scope()
                .intercept(
                    MatchRule::method::<FixedClock>("now"),
                    InterceptorSource::from_fn(|invocation: &mut Invocation<'_>| {
                        invocation.proceed()
                    }),
                    0,
                )
                .proxy_with(|clock, _dispatch| clock)
                .on_activation(|clock: &Arc<dyn Clock>| {
                    assert_eq!(clock.now(), 42);
                    Ok::<_, Infallible>(())
                })
                .set_on(configurer);

            bind::<FixedClock>()
                .to_self()
                .in_thread_scope()
                .set_on(configurer);

            bind::<u64>()
                .to_method(|resolver| {
                    let clock = resolver.get::<dyn Clock>()?;
                    Ok(Ok::<_, Infallible>(Arc::new(clock.now())))
                })
                .in_activation_scope()
                .set_on(configurer);

            bind::<u64>()
                .to_constant(Arc::new(7))
                .when_target_named("timeout")
                .set_on(configurer);

            bind::<u64>()
                .to_provider(ConstantProvider::new(Arc::new(8)))
                .when_injected_into::<FixedClock>()
                .in_behavior(Arc::new(TransientBehavior))
                .set_on(configurer);

            bind::<String>()
                .to_constant(Arc::new(String::from("first")))
                .as_additional()
                .with_argument("unused", 1u8)
                .in_transient_scope()
                .on_deactivation(|_: &Arc<String>| Ok::<_, Infallible>(()))
                .set_on(configurer);

            bind::<String>()
                .to_constant(Arc::new(String::from("second")))
                .when(|request| request.parameters().get("second").is_some())
                .set_on(configurer);

            Ok(())
        }
    }

    #[test]
    fn dsl_registers_every_binding() {
        let mut configurer = ConfigurerImpl::new();
        DslCompilationTest.setup(&mut configurer);
        let registration = configurer.finish().unwrap();

        assert_eq!(registration.bindings.len(), 7);
        assert_eq!(registration.catalog.len(), 1);
        assert_eq!(registration.bindings.get(ServiceType::of::<u64>()).len(), 3);
        let clock = registration
            .bindings
            .default_of(ServiceType::of::<dyn Clock>())
            .unwrap();
        assert_eq!(clock.advice().len(), 1);
        assert!(clock.proxy().is_some());
        assert_eq!(clock.activation_actions().len(), 1);
        assert!(registration
            .bindings
            .default_of(ServiceType::of::<String>())
            .is_none());
    }

    #[test]
    fn dsl_bindings_resolve_through_kernel() {
        let kernel = crate::kernel::Kernel::init(DslCompilationTest).unwrap();

        assert_eq!(kernel.get::<dyn Clock>().unwrap().now(), 42);
        assert_eq!(*kernel.get::<u64>().unwrap(), 42);

        let strings = kernel.get_all::<String>().unwrap();
        assert_eq!(strings.len(), 1);
        assert_eq!(strings[0].as_str(), "first");

        // Both the additional and the conditional binding match without a
        // default to fall back to.
        let res = kernel.get_with::<String>(Parameters::new().with("second", ()));
        assert!(matches!(res, Err(ActivationError::AmbiguousBinding { .. })));
    }
}
