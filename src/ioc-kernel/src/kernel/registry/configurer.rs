use std::collections::HashMap;
use std::error::Error;

use crate::interception::{Advice, InterceptorSource};
use crate::kernel::registry::{Binding, BindingMap, Configurer, ConfigurerPrivate, RegistryError};
use crate::planning::{DescriptorCatalog, TypeDescriptor};

/// Everything a module registered, ready to build a kernel from.
#[derive(Debug)]
pub(crate) struct Registration {
    pub bindings: BindingMap,
    pub catalog: DescriptorCatalog,
    pub interceptors: HashMap<&'static str, InterceptorSource>,
    pub advice: Vec<Advice>,
}

pub(crate) struct ConfigurerImpl {
    registration: Registration,
    errors: Vec<RegistryError>,
}

impl ConfigurerImpl {
    pub fn new() -> Self {
        Self {
            registration: Registration {
                bindings: BindingMap::new(),
                catalog: DescriptorCatalog::new(),
                interceptors: HashMap::new(),
                advice: Vec::new(),
            },
            errors: Vec::new(),
        }
    }

    pub fn finish(self) -> Result<Registration, Vec<RegistryError>> {
        if self.errors.is_empty() {
            Ok(self.registration)
        } else {
            Err(self.errors)
        }
    }
}

impl Configurer for ConfigurerImpl {
    #[allow(private_interfaces)]
    fn as_private(&mut self) -> &mut dyn ConfigurerPrivate {
        self
    }

    fn report_module_error(&mut self, module: &'static str, err: Box<dyn Error + Send + Sync>) {
        self.errors.push(RegistryError::ModuleInner {
            module,
            source: err,
        });
    }
}

impl ConfigurerPrivate for ConfigurerImpl {
    fn dyn_register(&mut self, binding: Binding) {
        match self.registration.bindings.insert(binding) {
            Ok(binding) => tracing::trace!(binding = %binding, "registered binding"),
            Err(err) => self.errors.push(err),
        }
    }

    fn dyn_register_descriptor(&mut self, descriptor: TypeDescriptor) {
        self.registration.catalog.insert(descriptor);
    }

    fn dyn_register_interceptor(&mut self, name: &'static str, source: InterceptorSource) {
        if self.registration.interceptors.contains_key(name) {
            self.errors
                .push(RegistryError::DuplicateInterceptor { name });
        } else {
            self.registration.interceptors.insert(name, source);
        }
    }

    fn dyn_register_advice(&mut self, advice: Advice) {
        self.registration.advice.push(advice);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::interception::{Invocation, MatchRule};
    use crate::kernel::registry::TypedConfigurer;
    use crate::provider::ConstantProvider;
    use crate::service::{ImplementationType, ServiceType};

    use super::*;

    fn make_binding() -> Binding {
        Binding::new(
            ServiceType::of::<i32>(),
            Arc::new(ConstantProvider::new(Arc::new(42i32))),
        )
    }

    fn make_interceptor() -> InterceptorSource {
        InterceptorSource::from_fn(|invocation: &mut Invocation<'_>| invocation.proceed())
    }

    #[test]
    fn configurer_impl_register_succeeds() {
        let mut configurer = ConfigurerImpl::new();
        configurer.register(make_binding());
        configurer.register_descriptor(TypeDescriptor::opaque(ImplementationType::of::<i32>()));
        configurer.register_interceptor("audit", make_interceptor());
        configurer.register_advice(Advice::new(
            MatchRule::predicate(|_| true),
            make_interceptor(),
            0,
        ));

        let registration = configurer.finish().unwrap();
        assert_eq!(registration.bindings.len(), 1);
        assert_eq!(registration.catalog.len(), 1);
        assert!(registration.interceptors.contains_key("audit"));
        assert_eq!(registration.advice.len(), 1);
    }

    #[test]
    fn configurer_impl_finish_fails_when_default_is_duplicated() {
        let mut configurer = ConfigurerImpl::new();
        configurer.register(make_binding());
        configurer.register(make_binding());

        let errs = configurer.finish().unwrap_err();
        assert!(matches!(
            errs.first().unwrap(),
            RegistryError::DuplicateDefault { .. }
        ));
    }

    #[test]
    fn configurer_impl_finish_fails_when_interceptor_is_duplicated() {
        let mut configurer = ConfigurerImpl::new();
        configurer.register_interceptor("audit", make_interceptor());
        configurer.register_interceptor("audit", make_interceptor());

        let errs = configurer.finish().unwrap_err();
        assert!(matches!(
            errs.first().unwrap(),
            RegistryError::DuplicateInterceptor { name: "audit" }
        ));
    }

    #[test]
    fn configurer_impl_finish_fails_when_other_error_reported() {
        let mut configurer = ConfigurerImpl::new();
        configurer.register(make_binding());
        configurer.report_module_error("test", "whatever".into());

        let errs = configurer.finish().unwrap_err();
        assert!(matches!(
            errs.first().unwrap(),
            RegistryError::ModuleInner { .. }
        ));
    }
}
