use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::activation::Activator;
use crate::behavior::{Activated, ScopeId};
use crate::interception::{Advice, AdviceRegistry, InterceptorSource, MatchRule};
use crate::kernel::context::{Context, ContextChain, Parameters, ServiceRequest};
use crate::kernel::dependency::{ArgumentResolver, StandardArgumentResolver};
use crate::kernel::registry::{
    select_all, select_binding, Binding, BindingMap, Registration, RegistryError,
};
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::kernel::{Instance, KernelSettings};
use crate::planning::{
    ActivationPlan, ConstructorSelectionStrategy, InterceptionPlanningStrategy,
    LifecyclePlanningStrategy, MemberKind, MemberPlanningStrategy, Planner, PlanningError,
    PlanningStrategy,
};
use crate::service::ServiceType;

/// The shared state behind every [`Kernel`] handle.
///
/// Bindings are frozen once the core is built. Everything mutable lives in
/// the planner's plan cache, the behaviors' instance caches and the advice
/// registry, each guarded by its own lock.
///
/// [`Kernel`]: crate::kernel::Kernel
pub struct KernelCore {
    bindings: BindingMap,
    planner: Planner,
    activator: Activator,
    advice: Arc<AdviceRegistry>,
    settings: KernelSettings,
    next_scope: AtomicU64,
}

impl KernelCore {
    pub fn new(registration: Registration, settings: KernelSettings) -> Self {
        let Registration {
            bindings,
            catalog,
            interceptors,
            advice,
        } = registration;

        let registry = Arc::new(AdviceRegistry::new());
        for advice in advice {
            registry.register(advice);
        }
        for binding in bindings.iter() {
            for advice in binding.advice() {
                registry.register(scoped_to_binding(binding, advice));
            }
        }

        let planner = Planner::new(
            Arc::new(catalog),
            standard_planning_strategies(Arc::clone(&registry), interceptors),
        );
        let activator = Activator::standard(Arc::clone(&registry));

        Self {
            bindings,
            planner,
            activator,
            advice: registry,
            settings,
            next_scope: AtomicU64::new(1),
        }
    }

    pub fn bindings(&self) -> &BindingMap {
        &self.bindings
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn activator(&self) -> &Activator {
        &self.activator
    }

    pub fn advice(&self) -> &Arc<AdviceRegistry> {
        &self.advice
    }

    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    pub fn next_scope_id(&self) -> ScopeId {
        ScopeId::new(self.next_scope.fetch_add(1, Ordering::Relaxed))
    }

    /// Activates every unconditional binding whose behavior allows it.
    pub fn activate_eagerly(&self) -> Result<(), RegistryError> {
        for binding in self.bindings.iter() {
            if binding.condition().is_some() {
                continue;
            }
            let service = binding.service();
            let request = ServiceRequest::new(service, Parameters::new());
            let eager = |source| RegistryError::EagerActivation { service, source };
            let plan = self.plan_for(binding, &request).map_err(eager)?;
            if !binding.behavior(&plan).is_eager() {
                continue;
            }
            self.activate_binding(request, Arc::clone(binding))
                .map_err(eager)?;
            tracing::debug!(binding = %binding, "eagerly activated instance");
        }
        Ok(())
    }

    fn plan_for(
        &self,
        binding: &Binding,
        request: &ServiceRequest,
    ) -> Result<Arc<ActivationPlan>, ActivationError> {
        let implementation = binding.implementation_type(request);
        self.planner
            .get_plan(binding, implementation)
            .map_err(|err| planning_failure(err, request.chain_with(Some(binding))))
    }

    fn activate_binding(
        &self,
        request: ServiceRequest,
        binding: Arc<Binding>,
    ) -> Result<Instance, ActivationError> {
        if request
            .ancestors()
            .any(|context| context.binding().id() == binding.id())
        {
            return Err(ActivationError::CyclicDependency {
                service: request.service(),
                chain: request.chain_with(Some(&binding)),
            });
        }

        let plan = self.plan_for(&binding, &request)?;
        let context = Arc::new(Context::new(request, Arc::clone(&binding), plan));
        let behavior = binding.behavior(context.plan());
        behavior.resolve(&context, &mut || {
            self.activator
                .activate(self, &context)
                .map(|instance| Activated::new(instance, Arc::clone(&context)))
        })
    }

    /// Evicts the tracked instance at `address` from the behavior caching it
    /// and destroys it. Returns false if no behavior tracks it.
    pub fn release(&self, address: usize) -> Result<bool, ActivationError> {
        for binding in self.bindings.iter() {
            let Some(behavior) = binding.initialized_behavior() else {
                continue;
            };
            if let Some(activated) = behavior.release(address) {
                tracing::debug!(
                    binding = %binding,
                    address,
                    "released tracked instance",
                );
                self.activator.destroy(self, &activated.context)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Destroys every instance cached for `scope`.
    pub fn end_scope(&self, scope: ScopeId) -> Result<(), ActivationError> {
        let released: Vec<Activated> = self
            .bindings
            .iter()
            .filter_map(|binding| binding.initialized_behavior())
            .flat_map(|behavior| behavior.release_scope(scope))
            .collect();
        tracing::debug!(scope = %scope, instances = released.len(), "ending activation scope");
        self.destroy_all(released)
    }

    fn destroy_all(&self, released: Vec<Activated>) -> Result<(), ActivationError> {
        let mut failures: Vec<_> = released
            .iter()
            .filter_map(|activated| self.activator.destroy(self, &activated.context).err())
            .collect();
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(ActivationError::Destruction { failures }),
        }
    }
}

impl Resolver for KernelCore {
    fn resolve_request(
        &self,
        request: ServiceRequest,
    ) -> Result<Option<Instance>, ActivationError> {
        let bindings = self.bindings.get(request.service());
        let binding = match select_binding(bindings, &request) {
            Ok(binding) => binding,
            Err(ActivationError::NotFound { .. }) if request.is_optional() => {
                tracing::trace!(service = %request.service(), "optional request not satisfied");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.activate_binding(request, binding).map(Some)
    }

    fn resolve_all_requests(
        &self,
        request: ServiceRequest,
    ) -> Result<Vec<Instance>, ActivationError> {
        select_all(self.bindings.get(request.service()), &request)
            .into_iter()
            .map(|binding| self.activate_binding(request.clone(), binding))
            .collect()
    }

    fn coerce(&self, value: &Instance, target: ServiceType) -> Option<Instance> {
        if !self.settings.is_coercing_inline_arguments() {
            return None;
        }
        self.settings.get_coercer().coerce(value, target)
    }
}

impl Drop for KernelCore {
    fn drop(&mut self) {
        let released: Vec<Activated> = self
            .bindings
            .iter()
            .filter_map(|binding| binding.initialized_behavior())
            .flat_map(|behavior| behavior.clear())
            .collect();
        if released.is_empty() {
            return;
        }
        tracing::debug!(instances = released.len(), "destroying cached instances");
        if let Err(err) = self.destroy_all(released) {
            tracing::warn!(error = %err, "failed to destroy cached instances");
        }
    }
}

fn standard_planning_strategies(
    registry: Arc<AdviceRegistry>,
    interceptors: HashMap<&'static str, InterceptorSource>,
) -> Vec<Arc<dyn PlanningStrategy>> {
    let arguments: Arc<dyn ArgumentResolver> = Arc::new(StandardArgumentResolver);
    vec![
        Arc::new(ConstructorSelectionStrategy::new(Arc::clone(&arguments))),
        Arc::new(MemberPlanningStrategy::new(
            MemberKind::Field,
            Arc::clone(&arguments),
        )),
        Arc::new(MemberPlanningStrategy::new(
            MemberKind::Property,
            Arc::clone(&arguments),
        )),
        Arc::new(MemberPlanningStrategy::new(MemberKind::Method, arguments)),
        Arc::new(LifecyclePlanningStrategy),
        Arc::new(InterceptionPlanningStrategy::new(
            registry,
            Arc::new(interceptors),
        )),
    ]
}

/// Advice declared on a binding only applies to calls on objects activated
/// through that binding.
fn scoped_to_binding(binding: &Binding, advice: &Advice) -> Advice {
    let id = binding.id();
    let rule = advice.rule().clone();
    Advice::new(
        MatchRule::predicate(move |request| request.binding() == Some(id) && rule.matches(request)),
        advice.source().clone(),
        advice.order(),
    )
}

fn planning_failure(err: PlanningError, chain: ContextChain) -> ActivationError {
    match err {
        PlanningError::AmbiguousConstructor {
            implementation,
            count,
        } => ActivationError::AmbiguousConstructor {
            implementation,
            count,
            chain,
        },
        PlanningError::NoConstructor { implementation } => ActivationError::NoConstructor {
            implementation,
            chain,
        },
        PlanningError::UnknownInterceptor {
            implementation,
            name,
        } => ActivationError::UnknownInterceptor {
            implementation,
            name,
            chain,
        },
    }
}
