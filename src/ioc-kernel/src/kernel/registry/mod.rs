mod binding_map;
mod configurer;
mod selector;

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::sync::{Arc, OnceLock};

use snafu::prelude::*;

use crate::behavior::{Behavior, LifecyclePolicy};
use crate::interception::{Advice, InterceptorSource, ProxyFactory};
use crate::kernel::context::ServiceRequest;
use crate::kernel::resolver::ActivationError;
use crate::kernel::Instance;
use crate::planning::{ActivationPlan, BoxError, TypeDescriptor};
use crate::provider::Provider;
use crate::service::{ImplementationType, ServiceType};

pub use binding_map::BindingMap;
pub(crate) use configurer::{ConfigurerImpl, Registration};
pub use selector::{select_all, select_binding};

pub type Condition = Arc<dyn Fn(&ServiceRequest) -> bool + Send + Sync>;

pub type BindingAction = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BindingId(usize);

impl BindingId {
    pub fn get(&self) -> usize {
        self.0
    }
}

impl Display for BindingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "#{}", self.0)
    }
}

/// Maps a service type to the provider of its instances, together with the
/// policies applied to them.
///
/// An unconditional binding is the default binding of its service unless it
/// was registered as additional. At most one default binding may exist per
/// service.
pub struct Binding {
    id: BindingId,
    service: ServiceType,
    provider: Arc<dyn Provider>,
    policy: Option<LifecyclePolicy>,
    behavior: OnceLock<Arc<dyn Behavior>>,
    condition: Option<Condition>,
    additional: bool,
    inline_arguments: HashMap<&'static str, Instance>,
    advice: Vec<Advice>,
    proxy: Option<Arc<dyn ProxyFactory>>,
    activation_actions: Vec<BindingAction>,
    deactivation_actions: Vec<BindingAction>,
}

impl Binding {
    pub fn new(service: ServiceType, provider: Arc<dyn Provider>) -> Self {
        Self {
            id: BindingId::default(),
            service,
            provider,
            policy: None,
            behavior: OnceLock::new(),
            condition: None,
            additional: false,
            inline_arguments: HashMap::new(),
            advice: Vec::new(),
            proxy: None,
            activation_actions: Vec::new(),
            deactivation_actions: Vec::new(),
        }
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: BindingId) {
        self.id = id;
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn implementation_type(&self, request: &ServiceRequest) -> ImplementationType {
        self.provider.implementation_type(request)
    }

    pub fn policy(&self) -> Option<&LifecyclePolicy> {
        self.policy.as_ref()
    }

    pub fn set_policy(&mut self, policy: LifecyclePolicy) {
        self.policy = Some(policy);
    }

    /// The behavior of this binding, created on first use from the explicit
    /// policy, else from the lifecycle recorded in `plan`, else transient.
    pub fn behavior(&self, plan: &ActivationPlan) -> &Arc<dyn Behavior> {
        self.behavior.get_or_init(|| {
            self.policy
                .as_ref()
                .or(plan.lifecycle())
                .unwrap_or(&LifecyclePolicy::Transient)
                .create_behavior()
        })
    }

    /// The behavior, if some request already created it.
    pub fn initialized_behavior(&self) -> Option<&Arc<dyn Behavior>> {
        self.behavior.get()
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn set_condition(&mut self, condition: Condition) {
        self.condition = Some(condition);
    }

    /// Keeps an unconditional binding from becoming the default one.
    pub fn set_additional(&mut self, additional: bool) {
        self.additional = additional;
    }

    pub fn is_default(&self) -> bool {
        self.condition.is_none() && !self.additional
    }

    pub fn is_conditional(&self) -> bool {
        !self.is_default()
    }

    /// Whether the condition holds for `request`. Unconditional bindings
    /// always match.
    pub fn matches(&self, request: &ServiceRequest) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition(request))
    }

    pub fn inline_argument(&self, name: &str) -> Option<&Instance> {
        self.inline_arguments.get(name)
    }

    pub fn set_inline_argument(&mut self, name: &'static str, value: Instance) -> Option<Instance> {
        self.inline_arguments.insert(name, value)
    }

    pub fn advice(&self) -> &[Advice] {
        &self.advice
    }

    pub fn add_advice(&mut self, advice: Advice) {
        self.advice.push(advice);
    }

    pub fn proxy(&self) -> Option<&Arc<dyn ProxyFactory>> {
        self.proxy.as_ref()
    }

    pub fn set_proxy(&mut self, proxy: Arc<dyn ProxyFactory>) {
        self.proxy = Some(proxy);
    }

    pub fn activation_actions(&self) -> &[BindingAction] {
        &self.activation_actions
    }

    pub fn add_activation_action(&mut self, action: BindingAction) {
        self.activation_actions.push(action);
    }

    pub fn deactivation_actions(&self) -> &[BindingAction] {
        &self.deactivation_actions
    }

    pub fn add_deactivation_action(&mut self, action: BindingAction) {
        self.deactivation_actions.push(action);
    }
}

impl Display for Binding {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "binding {} of {}", self.id, self.service)?;
        if self.condition.is_some() {
            f.write_str(" (conditional)")?;
        } else if self.additional {
            f.write_str(" (additional)")?;
        }
        Ok(())
    }
}

impl Debug for Binding {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("policy", &self.policy)
            .field("default", &self.is_default())
            .field("inline_arguments", &self.inline_arguments.keys())
            .field("advice", &self.advice.len())
            .finish_non_exhaustive()
    }
}

pub trait Configurer: Send + Sync + 'static {
    #[doc(hidden)]
    #[allow(private_interfaces)]
    fn as_private(&mut self) -> &mut dyn ConfigurerPrivate;

    fn report_module_error(&mut self, module: &'static str, err: Box<dyn Error + Send + Sync>);
}

trait ConfigurerPrivate: Configurer {
    fn dyn_register(&mut self, binding: Binding);

    fn dyn_register_descriptor(&mut self, descriptor: TypeDescriptor);

    fn dyn_register_interceptor(&mut self, name: &'static str, source: InterceptorSource);

    fn dyn_register_advice(&mut self, advice: Advice);
}

pub trait TypedConfigurer: Configurer {
    fn register(&mut self, binding: Binding) {
        self.as_private().dyn_register(binding);
    }

    /// Makes the metadata of a type known to the planner.
    fn register_descriptor(&mut self, descriptor: TypeDescriptor) {
        self.as_private().dyn_register_descriptor(descriptor);
    }

    /// Registers an interceptor that interceptor markers refer to by name.
    fn register_interceptor(&mut self, name: &'static str, source: InterceptorSource) {
        self.as_private().dyn_register_interceptor(name, source);
    }

    /// Registers advice matched against every intercepted call.
    fn register_advice(&mut self, advice: Advice) {
        self.as_private().dyn_register_advice(advice);
    }
}

impl<T: Configurer + ?Sized> TypedConfigurer for T {}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum RegistryError {
    #[snafu(display("a default binding of {service} already exists"))]
    #[non_exhaustive]
    DuplicateDefault { service: ServiceType },
    #[snafu(display("the interceptor `{name}` is already registered"))]
    #[non_exhaustive]
    DuplicateInterceptor { name: &'static str },
    #[snafu(display("module {module} fails to setup the configuration"))]
    #[non_exhaustive]
    ModuleInner {
        module: &'static str,
        source: Box<dyn Error + Send + Sync>,
    },
    #[snafu(display("could not eagerly activate {service}"))]
    #[non_exhaustive]
    EagerActivation {
        service: ServiceType,
        source: ActivationError,
    },
    #[snafu(display("aggregated registry errors:\n{}", AggregatedDisplayer::new(errors)))]
    Aggregated { errors: Vec<RegistryError> },
}

struct AggregatedDisplayer<'a> {
    errors: &'a [RegistryError],
}

impl<'a> AggregatedDisplayer<'a> {
    fn new(errors: &'a [RegistryError]) -> Self {
        Self { errors }
    }
}

impl Display for AggregatedDisplayer<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for (i, error) in self.errors.iter().enumerate() {
            writeln!(f, "{:4}: {}", i + 1, error)?;
        }
        Ok(())
    }
}
