use std::sync::Arc;

use crate::activation::Activator;
use crate::behavior::{ActivationScope, ScopeId};
use crate::interception::AdviceRegistry;
use crate::kernel::context::{Parameters, ServiceRequest};
use crate::kernel::core::KernelCore;
use crate::kernel::registry::{BindingMap, ConfigurerImpl, RegistryError};
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::kernel::{Instance, KernelSettings};
use crate::module::Module;
use crate::planning::Planner;
use crate::service::ServiceType;

/// The entry point of the resolution engine.
///
/// A [`Kernel`] is a cheap handle: clones share the same bindings, plans and
/// cached instances, and may be sent to other threads. Cached instances are
/// destroyed when the last handle is dropped.
#[derive(Clone)]
pub struct Kernel {
    core: Arc<KernelCore>,
}

impl Kernel {
    pub fn init<M>(module: M) -> Result<Self, RegistryError>
    where
        M: Module,
    {
        Self::with_settings(module, KernelSettings::new())
    }

    pub fn with_settings<M>(module: M, settings: KernelSettings) -> Result<Self, RegistryError>
    where
        M: Module,
    {
        let mut configurer = ConfigurerImpl::new();
        module.setup(&mut configurer);
        let registration = configurer
            .finish()
            .map_err(|errors| RegistryError::Aggregated { errors })?;

        let eager = settings.is_eager_activation();
        let kernel = Self {
            core: Arc::new(KernelCore::new(registration, settings)),
        };
        tracing::debug!(
            bindings = kernel.core.bindings().len(),
            eager,
            "initialized kernel",
        );
        if eager {
            kernel.core.activate_eagerly()?;
        }
        Ok(kernel)
    }

    /// Resolves an instance of `service`, passing `parameters` to the
    /// activation of the selected binding.
    pub fn resolve(
        &self,
        service: ServiceType,
        parameters: Parameters,
    ) -> Result<Instance, ActivationError> {
        let request = ServiceRequest::new(service, parameters);
        let chain = request.chain();
        self.core
            .resolve_request(request)?
            .ok_or(ActivationError::NotFound { service, chain })
    }

    /// Evicts `instance` from the behavior caching it and destroys it.
    ///
    /// Returns false without doing anything if no behavior tracks the
    /// instance, which is always the case for transient instances.
    pub fn release(&self, instance: &Instance) -> Result<bool, ActivationError> {
        self.core.release(instance.address())
    }

    /// Same as [`Kernel::release`] for an object obtained through the typed
    /// resolver methods.
    pub fn release_object<S>(&self, object: &Arc<S>) -> Result<bool, ActivationError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.core
            .release(Arc::as_ptr(object) as *const () as usize)
    }

    /// Opens a scope for bindings registered in activation scope.
    pub fn begin_scope(&self) -> ActivationScope {
        let id = self.core.next_scope_id();
        tracing::debug!(scope = %id, "began activation scope");
        ActivationScope::new(self.clone(), id)
    }

    pub(crate) fn end_scope(&self, scope: ScopeId) -> Result<(), ActivationError> {
        self.core.end_scope(scope)
    }

    pub fn bindings(&self) -> &BindingMap {
        self.core.bindings()
    }

    pub fn planner(&self) -> &Planner {
        self.core.planner()
    }

    pub fn activator(&self) -> &Activator {
        self.core.activator()
    }

    pub fn advice(&self) -> &Arc<AdviceRegistry> {
        self.core.advice()
    }

    pub fn settings(&self) -> &KernelSettings {
        self.core.settings()
    }
}

impl Resolver for Kernel {
    fn resolve_request(
        &self,
        request: ServiceRequest,
    ) -> Result<Option<Instance>, ActivationError> {
        self.core.resolve_request(request)
    }

    fn resolve_all_requests(
        &self,
        request: ServiceRequest,
    ) -> Result<Vec<Instance>, ActivationError> {
        self.core.resolve_all_requests(request)
    }

    fn coerce(&self, value: &Instance, target: ServiceType) -> Option<Instance> {
        self.core.coerce(value, target)
    }
}
