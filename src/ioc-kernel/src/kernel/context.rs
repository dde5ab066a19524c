//! Per-request activation state.
//!
//! A [`ServiceRequest`] is the immutable description of what is being asked
//! for and from where. Binding conditions are evaluated against it. Once a
//! binding and a plan are chosen the request is wrapped in a [`Context`],
//! which additionally owns the [`InstanceSlot`] the activator fills.
//!
//! Contexts form a tree through their parent links: a dependency resolved
//! while activating a context gets a child request pointing at it.

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::iter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::behavior::ScopeId;
use crate::kernel::registry::Binding;
use crate::kernel::{Instance, InstanceReference, Managed};
use crate::planning::{ActivationPlan, Target};
use crate::service::ServiceType;

/// A named value supplied by the caller for a single resolution.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: &'static str,
    value: Instance,
    inherited: bool,
}

impl Parameter {
    pub fn new(name: &'static str, value: Instance) -> Self {
        Self {
            name,
            value,
            inherited: false,
        }
    }

    /// A parameter which is also visible to every dependency resolved
    /// underneath the request it is passed to.
    pub fn inherited(name: &'static str, value: Instance) -> Self {
        Self {
            name,
            value,
            inherited: true,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> &Instance {
        &self.value
    }

    pub fn is_inherited(&self) -> bool {
        self.inherited
    }
}

/// The transient parameters of a request. A later parameter shadows an
/// earlier one of the same name.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    entries: Vec<Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T>(mut self, name: &'static str, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.push(Parameter::new(name, Instance::from_value(value)));
        self
    }

    pub fn with_inherited<T>(mut self, name: &'static str, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.push(Parameter::inherited(name, Instance::from_value(value)));
        self
    }

    pub fn push(&mut self, parameter: Parameter) {
        self.entries.push(parameter);
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.entries
            .iter()
            .rev()
            .find(|parameter| parameter.name == name)
            .map(Parameter::value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.entries.iter()
    }

    /// The subset passed down to child requests.
    pub fn inherited(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|parameter| parameter.inherited)
            .cloned()
            .collect();
        Self { entries }
    }
}

impl FromIterator<Parameter> for Parameters {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// What is being resolved, for whom and with which overrides.
#[derive(Clone)]
pub struct ServiceRequest {
    service: ServiceType,
    parent: Option<Arc<Context>>,
    target: Option<Target>,
    optional: bool,
    parameters: Parameters,
    scope: Option<ScopeId>,
    depth: usize,
}

impl ServiceRequest {
    pub fn new(service: ServiceType, parameters: Parameters) -> Self {
        Self {
            service,
            parent: None,
            target: None,
            optional: false,
            parameters,
            scope: None,
            depth: 0,
        }
    }

    /// A request for the dependency `target` of the object being activated in
    /// `parent`.
    pub fn child(parent: &Arc<Context>, target: &Target) -> Self {
        let parent_request = parent.request();
        Self {
            service: target.service(),
            parent: Some(Arc::clone(parent)),
            target: Some(target.clone()),
            optional: target.is_optional(),
            parameters: parent_request.parameters.inherited(),
            scope: parent_request.scope,
            depth: parent_request.depth + 1,
        }
    }

    /// Moves a request built without knowledge of any context underneath
    /// `parent`. Parameters already present on `self` take precedence over
    /// those inherited from `parent`.
    pub fn reparent(self, parent: &Arc<Context>) -> Self {
        let parent_request = parent.request();
        let mut parameters = parent_request.parameters.inherited();
        self.parameters
            .entries
            .into_iter()
            .for_each(|parameter| parameters.push(parameter));
        Self {
            service: self.service,
            parent: Some(Arc::clone(parent)),
            target: self.target,
            optional: self.optional,
            parameters,
            scope: self.scope.or(parent_request.scope),
            depth: parent_request.depth + 1,
        }
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn within_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Iterates the contexts above this request, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Arc<Context>> {
        iter::successors(self.parent.as_ref(), |context| context.request.parent.as_ref())
    }

    /// The diagnostic chain for a failure that happened before any binding
    /// was chosen for this request.
    pub fn chain(&self) -> ContextChain {
        self.chain_with(None)
    }

    pub fn chain_with(&self, binding: Option<&Binding>) -> ContextChain {
        let frames = iter::once(ContextFrame::new(self, binding))
            .chain(
                self.ancestors()
                    .map(|context| ContextFrame::new(&context.request, Some(&context.binding))),
            )
            .collect();
        ContextChain { frames }
    }
}

impl Debug for ServiceRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ServiceRequest")
            .field("service", &self.service)
            .field("target", &self.target)
            .field("optional", &self.optional)
            .field("parameters", &self.parameters)
            .field("scope", &self.scope)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

/// The lifecycle state of the object owned by a [`Context`].
///
/// The activator moves a slot through `Empty`, `Created`, `Initialized` and
/// finally `Destroyed`; no other transition is possible.
#[derive(Default)]
pub enum InstanceSlot {
    #[default]
    Empty,
    Created(Box<dyn Managed>),
    Initialized(InstanceReference),
    Destroyed,
}

impl InstanceSlot {
    pub fn state(&self) -> SlotState {
        match self {
            Self::Empty => SlotState::Empty,
            Self::Created(_) => SlotState::Created,
            Self::Initialized(_) => SlotState::Initialized,
            Self::Destroyed => SlotState::Destroyed,
        }
    }

    pub fn reference(&self) -> Option<&InstanceReference> {
        match self {
            Self::Initialized(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn reference_mut(&mut self) -> Option<&mut InstanceReference> {
        match self {
            Self::Initialized(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn raw_mut(&mut self) -> Option<&mut dyn Managed> {
        match self {
            Self::Created(raw) => Some(&mut **raw),
            _ => None,
        }
    }
}

impl Debug for InstanceSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.state(), f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Created,
    Initialized,
    Destroyed,
}

/// The activation state of one request once a binding has been chosen.
pub struct Context {
    request: ServiceRequest,
    binding: Arc<Binding>,
    plan: Arc<ActivationPlan>,
    slot: Mutex<InstanceSlot>,
    initializing: AtomicBool,
    variables: Mutex<HashMap<&'static str, Instance>>,
}

impl Context {
    pub fn new(request: ServiceRequest, binding: Arc<Binding>, plan: Arc<ActivationPlan>) -> Self {
        Self {
            request,
            binding,
            plan,
            slot: Mutex::new(InstanceSlot::Empty),
            initializing: AtomicBool::new(false),
            variables: Mutex::new(HashMap::new()),
        }
    }

    pub fn request(&self) -> &ServiceRequest {
        &self.request
    }

    pub fn service(&self) -> ServiceType {
        self.request.service
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.request.parent.as_ref()
    }

    pub fn binding(&self) -> &Arc<Binding> {
        &self.binding
    }

    pub fn plan(&self) -> &Arc<ActivationPlan> {
        &self.plan
    }

    pub fn slot(&self) -> MutexGuard<'_, InstanceSlot> {
        self.slot.lock()
    }

    pub fn state(&self) -> SlotState {
        self.slot.lock().state()
    }

    /// Returns true while the object is created but not yet initialized, or
    /// not even created.
    pub fn is_activating(&self) -> bool {
        matches!(self.state(), SlotState::Empty | SlotState::Created)
    }

    /// The object handed out to callers, once initialized.
    pub fn instance(&self) -> Option<Instance> {
        self.slot
            .lock()
            .reference()
            .map(|reference| reference.instance().clone())
    }

    /// Marks initialization as started and returns whether it already was.
    pub(crate) fn begin_initialization(&self) -> bool {
        self.initializing.swap(true, Ordering::AcqRel)
    }

    pub fn set_variable(&self, name: &'static str, value: Instance) -> Option<Instance> {
        self.variables.lock().insert(name, value)
    }

    pub fn variable(&self, name: &str) -> Option<Instance> {
        self.variables.lock().get(name).cloned()
    }

    pub fn chain(&self) -> ContextChain {
        self.request.chain_with(Some(&self.binding))
    }

    /// A copy of this context without its parent link, sharing the
    /// initialized object. Caches keep this copy so that a cached instance
    /// does not hold on to the contexts it was first resolved for.
    pub fn detached(&self) -> Arc<Context> {
        let request = ServiceRequest {
            parent: None,
            ..self.request.clone()
        };
        let slot = self
            .slot
            .lock()
            .reference()
            .cloned()
            .map_or(InstanceSlot::Empty, InstanceSlot::Initialized);
        Arc::new(Self {
            request,
            binding: Arc::clone(&self.binding),
            plan: Arc::clone(&self.plan),
            slot: Mutex::new(slot),
            initializing: AtomicBool::new(self.initializing.load(Ordering::Acquire)),
            variables: Mutex::new(self.variables.lock().clone()),
        })
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Context")
            .field("service", &self.request.service)
            .field("binding", &self.binding.id())
            .field("implementation", &self.plan.implementation())
            .field("slot", &*self.slot.lock())
            .finish_non_exhaustive()
    }
}

/// A snapshot of a request and its ancestors, nearest first, rendered in
/// error messages.
#[derive(Debug, Clone, Default)]
pub struct ContextChain {
    frames: Vec<ContextFrame>,
}

impl ContextChain {
    pub fn frames(&self) -> &[ContextFrame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Display for ContextChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for (i, frame) in self.frames.iter().enumerate() {
            write!(f, "\n{:4}) {}", i + 1, frame)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ContextFrame {
    service: ServiceType,
    binding: Option<String>,
    target: Option<String>,
}

impl ContextFrame {
    fn new(request: &ServiceRequest, binding: Option<&Binding>) -> Self {
        Self {
            service: request.service,
            binding: binding.map(ToString::to_string),
            target: request.target.as_ref().map(ToString::to_string),
        }
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    pub fn binding(&self) -> Option<&str> {
        self.binding.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

impl Display for ContextFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "resolving {}", self.service)?;
        if let Some(target) = &self.target {
            write!(f, " for {target}")?;
        }
        if let Some(binding) = &self.binding {
            write!(f, " using {binding}")?;
        }
        Ok(())
    }
}
