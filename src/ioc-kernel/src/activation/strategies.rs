use std::sync::Arc;

use crate::activation::{lifecycle_error, ActivationStrategy, Phase};
use crate::interception::{AdviceRegistry, Dispatch};
use crate::kernel::context::Context;
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::kernel::InstanceReference;
use crate::planning::descriptor::HookFn;
use crate::planning::{resolve_arguments, MemberKind};

/// Injects the planned members of one kind into the created object.
pub struct MemberInjectionStrategy {
    kind: MemberKind,
}

impl MemberInjectionStrategy {
    pub fn new(kind: MemberKind) -> Self {
        Self { kind }
    }
}

impl ActivationStrategy for MemberInjectionStrategy {
    fn phase(&self) -> Phase {
        Phase::Initialize
    }

    fn execute(
        &self,
        resolver: &dyn Resolver,
        context: &Arc<Context>,
    ) -> Result<(), ActivationError> {
        let plan = Arc::clone(context.plan());
        for member in plan.members_of(self.kind) {
            // Dependencies are resolved before the slot is locked, they may
            // activate other contexts.
            let arguments = resolve_arguments(member.arguments(), resolver, context)?;

            let mut slot = context.slot();
            let state = slot.state();
            let Some(raw) = slot.raw_mut() else {
                return Err(ActivationError::InvalidOperation {
                    operation: "inject",
                    state,
                    chain: context.chain(),
                });
            };
            (member.injector())(raw.as_any_mut(), arguments)
                .map_err(|err| lifecycle_error(context, Phase::Initialize, err))?;
            tracing::trace!(
                implementation = %plan.implementation(),
                member = member.name(),
                kind = ?self.kind,
                "injected member",
            );
        }
        Ok(())
    }
}

/// The initialized object, cloned out of the slot so that user code never
/// runs under the slot lock.
fn reference_of(
    context: &Context,
    operation: &'static str,
) -> Result<InstanceReference, ActivationError> {
    let slot = context.slot();
    slot.reference()
        .cloned()
        .ok_or_else(|| ActivationError::InvalidOperation {
            operation,
            state: slot.state(),
            chain: context.chain(),
        })
}

fn run_hook(context: &Context, phase: Phase, hook: Option<&HookFn>) -> Result<(), ActivationError> {
    let Some(hook) = hook else {
        return Ok(());
    };
    let reference = reference_of(context, "run a hook on")?;
    let Some(concrete) = reference.concrete() else {
        return Ok(());
    };
    hook(concrete.as_any()).map_err(|err| lifecycle_error(context, phase, err))
}

/// Runs the start hook of the descriptor.
#[derive(Debug, Default)]
pub struct StartStrategy;

impl ActivationStrategy for StartStrategy {
    fn phase(&self) -> Phase {
        Phase::AfterInitialize
    }

    fn execute(&self, _: &dyn Resolver, context: &Arc<Context>) -> Result<(), ActivationError> {
        run_hook(context, Phase::AfterInitialize, context.plan().hooks().start())
    }
}

/// Runs the stop hook of the descriptor.
#[derive(Debug, Default)]
pub struct StopStrategy;

impl ActivationStrategy for StopStrategy {
    fn phase(&self) -> Phase {
        Phase::BeforeDestroy
    }

    fn execute(&self, _: &dyn Resolver, context: &Arc<Context>) -> Result<(), ActivationError> {
        run_hook(context, Phase::BeforeDestroy, context.plan().hooks().stop())
    }
}

/// Runs the dispose hook of the descriptor.
#[derive(Debug, Default)]
pub struct DisposeStrategy;

impl ActivationStrategy for DisposeStrategy {
    fn phase(&self) -> Phase {
        Phase::Destroy
    }

    fn execute(&self, _: &dyn Resolver, context: &Arc<Context>) -> Result<(), ActivationError> {
        run_hook(context, Phase::Destroy, context.plan().hooks().dispose())
    }
}

/// Runs the activation actions of the binding, in registration order.
#[derive(Debug, Default)]
pub struct ActivationActionStrategy;

impl ActivationStrategy for ActivationActionStrategy {
    fn phase(&self) -> Phase {
        Phase::AfterInitialize
    }

    fn execute(&self, _: &dyn Resolver, context: &Arc<Context>) -> Result<(), ActivationError> {
        let actions = context.binding().activation_actions();
        if actions.is_empty() {
            return Ok(());
        }
        let reference = reference_of(context, "run actions on")?;
        for action in actions {
            action(reference.instance())
                .map_err(|err| lifecycle_error(context, Phase::AfterInitialize, err))?;
        }
        Ok(())
    }
}

/// Runs the deactivation actions of the binding. Every action runs; a single
/// failure is reported as is, several are gathered into a
/// [`ActivationError::Destruction`].
#[derive(Debug, Default)]
pub struct DeactivationActionStrategy;

impl ActivationStrategy for DeactivationActionStrategy {
    fn phase(&self) -> Phase {
        Phase::BeforeDestroy
    }

    fn execute(&self, _: &dyn Resolver, context: &Arc<Context>) -> Result<(), ActivationError> {
        let actions = context.binding().deactivation_actions();
        if actions.is_empty() {
            return Ok(());
        }
        let reference = reference_of(context, "run actions on")?;
        let mut failures: Vec<_> = actions
            .iter()
            .filter_map(|action| action(reference.instance()).err())
            .map(|err| lifecycle_error(context, Phase::BeforeDestroy, err))
            .collect();
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(ActivationError::Destruction { failures }),
        }
    }
}

/// Replaces the initialized instance by a proxy when the binding has a proxy
/// factory and some advice may apply to the implementation type.
pub struct ProxyStrategy {
    advice: Arc<AdviceRegistry>,
}

impl ProxyStrategy {
    pub fn new(advice: Arc<AdviceRegistry>) -> Self {
        Self { advice }
    }
}

impl ActivationStrategy for ProxyStrategy {
    fn phase(&self) -> Phase {
        Phase::AfterInitialize
    }

    fn execute(&self, _: &dyn Resolver, context: &Arc<Context>) -> Result<(), ActivationError> {
        let Some(factory) = context.binding().proxy() else {
            return Ok(());
        };
        let implementation = context.plan().implementation();
        if !context.plan().has_interception() && !self.advice.has_advice(implementation) {
            return Ok(());
        }

        let reference = reference_of(context, "proxy")?;
        let target = reference.instance().clone();
        let dispatch = Dispatch::new(
            Arc::clone(&self.advice),
            context,
            implementation,
            target.clone(),
        );
        let proxy = factory
            .create_proxy(&target, dispatch)
            .map_err(|err| lifecycle_error(context, Phase::AfterInitialize, err))?;

        let mut slot = context.slot();
        if let Some(reference) = slot.reference_mut() {
            reference.replace_instance(proxy);
        }
        tracing::debug!(implementation = %implementation, "wrapped instance in a proxy");
        Ok(())
    }
}
