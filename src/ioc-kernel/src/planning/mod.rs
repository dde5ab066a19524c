//! Activation plans and the planner which builds and caches them.

pub mod descriptor;
mod planner;
mod strategies;

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use snafu::prelude::*;

use crate::behavior::LifecyclePolicy;
use crate::interception::{AdviceId, MethodId};
use crate::kernel::context::Context;
use crate::kernel::dependency::ArgumentResolver;
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::kernel::Instance;
use crate::service::{ImplementationType, ServiceType};

pub use descriptor::{
    ArgumentError, ArgumentValues, BoxError, ConstructorDescriptor, DescriptorBuilder,
    DescriptorCatalog, Injectable, InterceptorMarker, LifecycleHooks, MemberDescriptor,
    MemberKind, TargetDescriptor, TypeDescriptor, TypeInspector,
};
pub use planner::Planner;
pub use strategies::{
    ConstructorSelectionStrategy, InterceptionPlanningStrategy, LifecyclePlanningStrategy,
    MemberPlanningStrategy,
};

use descriptor::{ConstructorFn, MemberFn};

/// Where an injection target is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Constructor,
    Property,
    Method,
    Field,
}

impl From<MemberKind> for TargetKind {
    fn from(kind: MemberKind) -> Self {
        match kind {
            MemberKind::Property => Self::Property,
            MemberKind::Method => Self::Method,
            MemberKind::Field => Self::Field,
        }
    }
}

/// An injection point: a constructor parameter, a property, a method
/// parameter or a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    name: &'static str,
    service: ServiceType,
    optional: bool,
    member: Option<&'static str>,
    kind: TargetKind,
}

impl Target {
    pub fn new(name: &'static str, service: ServiceType, optional: bool) -> Self {
        Self {
            name,
            service,
            optional,
            member: None,
            kind: TargetKind::Constructor,
        }
    }

    pub fn in_member(mut self, member: &'static str, kind: TargetKind) -> Self {
        self.member = Some(member);
        self.kind = kind;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn member(&self) -> Option<&'static str> {
        self.member
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let kind = match self.kind {
            TargetKind::Constructor | TargetKind::Method => "parameter",
            TargetKind::Property => "property",
            TargetKind::Field => "field",
        };
        write!(f, "{kind} `{}`", self.name)?;
        if let Some(member) = self.member {
            write!(f, " of `{member}`")?;
        }
        Ok(())
    }
}

/// A target together with the resolver that produces its value.
#[derive(Clone)]
pub struct Argument {
    target: Target,
    resolver: Arc<dyn ArgumentResolver>,
}

impl Argument {
    pub fn new(target: Target, resolver: Arc<dyn ArgumentResolver>) -> Self {
        Self { target, resolver }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn resolve(
        &self,
        resolver: &dyn Resolver,
        context: &Arc<Context>,
    ) -> Result<Option<Instance>, ActivationError> {
        self.resolver.resolve(resolver, context, &self.target)
    }
}

impl Debug for Argument {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Argument")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Resolves every argument in order and collects the values.
pub(crate) fn resolve_arguments(
    arguments: &[Argument],
    resolver: &dyn Resolver,
    context: &Arc<Context>,
) -> Result<ArgumentValues, ActivationError> {
    let mut values = ArgumentValues::new();
    for argument in arguments {
        let value = argument.resolve(resolver, context)?;
        values.push(argument.target().name(), value);
    }
    Ok(values)
}

#[derive(Clone)]
pub struct ConstructorDirective {
    name: &'static str,
    arguments: Vec<Argument>,
    invoke: ConstructorFn,
}

impl ConstructorDirective {
    pub(crate) fn new(name: &'static str, arguments: Vec<Argument>, invoke: ConstructorFn) -> Self {
        Self {
            name,
            arguments,
            invoke,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub(crate) fn invoker(&self) -> &ConstructorFn {
        &self.invoke
    }
}

impl Debug for ConstructorDirective {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConstructorDirective")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct MemberDirective {
    kind: MemberKind,
    name: &'static str,
    arguments: Vec<Argument>,
    inject: MemberFn,
}

impl MemberDirective {
    pub(crate) fn new(
        kind: MemberKind,
        name: &'static str,
        arguments: Vec<Argument>,
        inject: MemberFn,
    ) -> Self {
        Self {
            kind,
            name,
            arguments,
            inject,
        }
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub(crate) fn injector(&self) -> &MemberFn {
        &self.inject
    }
}

impl Debug for MemberDirective {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MemberDirective")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// Static advice registered while planning, unregistered when the plan is
/// released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionDirective {
    method: MethodId,
    interceptor: &'static str,
    order: i32,
    advice: AdviceId,
}

impl InterceptionDirective {
    pub fn new(method: MethodId, interceptor: &'static str, order: i32, advice: AdviceId) -> Self {
        Self {
            method,
            interceptor,
            order,
            advice,
        }
    }

    pub fn method(&self) -> &MethodId {
        &self.method
    }

    pub fn interceptor(&self) -> &'static str {
        self.interceptor
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn advice(&self) -> AdviceId {
        self.advice
    }
}

/// How to construct and wire an object of one implementation type.
///
/// A plan is filled in by the planning strategies and becomes immutable once
/// the planner caches it.
#[derive(Debug, Clone)]
pub struct ActivationPlan {
    implementation: ImplementationType,
    descriptor: Arc<TypeDescriptor>,
    constructor: Option<ConstructorDirective>,
    members: Vec<MemberDirective>,
    lifecycle: Option<LifecyclePolicy>,
    hooks: LifecycleHooks,
    interception: Vec<InterceptionDirective>,
}

impl ActivationPlan {
    pub fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        Self {
            implementation: descriptor.implementation(),
            descriptor,
            constructor: None,
            members: Vec::new(),
            lifecycle: None,
            hooks: LifecycleHooks::default(),
            interception: Vec::new(),
        }
    }

    /// An empty plan for a type the kernel does not construct itself.
    pub fn opaque(implementation: ImplementationType) -> Self {
        Self::new(Arc::new(TypeDescriptor::opaque(implementation)))
    }

    pub fn implementation(&self) -> ImplementationType {
        self.implementation
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn constructor(&self) -> Option<&ConstructorDirective> {
        self.constructor.as_ref()
    }

    pub fn set_constructor(&mut self, constructor: ConstructorDirective) {
        self.constructor = Some(constructor);
    }

    pub fn members(&self) -> &[MemberDirective] {
        &self.members
    }

    pub fn members_of(&self, kind: MemberKind) -> impl Iterator<Item = &MemberDirective> {
        self.members.iter().filter(move |member| member.kind == kind)
    }

    pub fn add_member(&mut self, member: MemberDirective) {
        self.members.push(member);
    }

    pub fn lifecycle(&self) -> Option<&LifecyclePolicy> {
        self.lifecycle.as_ref()
    }

    pub fn set_lifecycle(&mut self, lifecycle: LifecyclePolicy) {
        self.lifecycle = Some(lifecycle);
    }

    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    pub fn set_hooks(&mut self, hooks: LifecycleHooks) {
        self.hooks = hooks;
    }

    pub fn interception(&self) -> &[InterceptionDirective] {
        &self.interception
    }

    pub fn add_interception(&mut self, directive: InterceptionDirective) {
        self.interception.push(directive);
    }

    pub fn has_interception(&self) -> bool {
        !self.interception.is_empty()
    }
}

/// One step of plan construction.
///
/// Strategies run in registration order. `release` is called with the same
/// plan when it is evicted from the cache, or when a later strategy failed
/// to build it.
#[cfg_attr(test, mockall::automock)]
pub trait PlanningStrategy: Send + Sync + 'static {
    fn execute(&self, plan: &mut ActivationPlan) -> Result<(), PlanningError>;

    fn release(&self, _plan: &ActivationPlan) {}
}

#[derive(Debug, Clone, Snafu)]
#[non_exhaustive]
pub enum PlanningError {
    #[snafu(display("{implementation} has {count} constructors marked for injection"))]
    #[non_exhaustive]
    AmbiguousConstructor {
        implementation: ImplementationType,
        count: usize,
    },
    #[snafu(display("{implementation} has no constructor to inject through"))]
    #[non_exhaustive]
    NoConstructor { implementation: ImplementationType },
    #[snafu(display("{implementation} refers to interceptor `{name}` which is not registered"))]
    #[non_exhaustive]
    UnknownInterceptor {
        implementation: ImplementationType,
        name: &'static str,
    },
}
