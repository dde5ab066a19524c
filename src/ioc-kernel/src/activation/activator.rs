use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::activation::{
    ActivationActionStrategy, ActivationStrategy, DeactivationActionStrategy, DisposeStrategy,
    MemberInjectionStrategy, Phase, ProxyStrategy, StartStrategy, StopStrategy,
};
use crate::interception::AdviceRegistry;
use crate::kernel::context::{Context, InstanceSlot, SlotState};
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::kernel::Instance;
use crate::planning::MemberKind;

/// Runs the activation strategies against contexts.
///
/// Within a phase, strategies run in the order they were added.
pub struct Activator {
    strategies: RwLock<Vec<Arc<dyn ActivationStrategy>>>,
}

impl Activator {
    pub fn new(strategies: Vec<Arc<dyn ActivationStrategy>>) -> Self {
        Self {
            strategies: RwLock::new(strategies),
        }
    }

    /// The default chain: field, property and method injection, then the
    /// start hook, activation actions and proxying; on destruction the
    /// deactivation actions, the stop hook and disposal.
    pub fn standard(advice: Arc<AdviceRegistry>) -> Self {
        Self::new(vec![
            Arc::new(MemberInjectionStrategy::new(MemberKind::Field)),
            Arc::new(MemberInjectionStrategy::new(MemberKind::Property)),
            Arc::new(MemberInjectionStrategy::new(MemberKind::Method)),
            Arc::new(StartStrategy),
            Arc::new(ActivationActionStrategy),
            Arc::new(ProxyStrategy::new(advice)),
            Arc::new(DeactivationActionStrategy),
            Arc::new(StopStrategy),
            Arc::new(DisposeStrategy),
        ])
    }

    pub fn add_strategy(&self, strategy: Arc<dyn ActivationStrategy>) {
        self.strategies.write().push(strategy);
    }

    /// Removes `strategy`, compared by identity. Returns whether it was
    /// registered.
    pub fn remove_strategy(&self, strategy: &Arc<dyn ActivationStrategy>) -> bool {
        let mut strategies = self.strategies.write();
        let before = strategies.len();
        strategies.retain(|other| !Arc::ptr_eq(other, strategy));
        strategies.len() != before
    }

    pub fn strategies(&self) -> Vec<Arc<dyn ActivationStrategy>> {
        self.strategies.read().clone()
    }

    fn strategies_of(&self, phase: Phase) -> Vec<Arc<dyn ActivationStrategy>> {
        self.strategies
            .read()
            .iter()
            .filter(|strategy| strategy.phase() == phase)
            .cloned()
            .collect()
    }

    fn run(
        &self,
        phase: Phase,
        resolver: &dyn Resolver,
        context: &Arc<Context>,
    ) -> Result<(), ActivationError> {
        tracing::trace!(binding = %context.binding(), %phase, "running activation phase");
        for strategy in self.strategies_of(phase) {
            strategy.execute(resolver, context)?;
        }
        Ok(())
    }

    /// Brings the object of `context` to the initialized state and returns
    /// the instance handed out to callers.
    ///
    /// Creation happens only from the empty state. Initialization happens
    /// exactly once: a later call returns the initialized instance, and a
    /// call made while the context is still being initialized means the
    /// object depends on itself.
    ///
    /// A failure leaves the context where it stopped. Side effects of the
    /// constructor or of earlier strategies are not undone.
    pub fn activate(
        &self,
        resolver: &dyn Resolver,
        context: &Arc<Context>,
    ) -> Result<Instance, ActivationError> {
        match context.state() {
            SlotState::Empty => self.create(resolver, context)?,
            SlotState::Created | SlotState::Initialized => {}
            state @ SlotState::Destroyed => {
                return Err(ActivationError::InvalidOperation {
                    operation: "activate",
                    state,
                    chain: context.chain(),
                })
            }
        }

        if context.begin_initialization() {
            return context
                .instance()
                .ok_or_else(|| ActivationError::CyclicDependency {
                    service: context.service(),
                    chain: context.chain(),
                });
        }

        self.run(Phase::Initialize, resolver, context)?;
        self.seal(context)?;
        self.run(Phase::AfterInitialize, resolver, context)?;

        let instance = context.instance().ok_or_else(|| ActivationError::InvalidOperation {
            operation: "activate",
            state: context.state(),
            chain: context.chain(),
        })?;
        tracing::debug!(
            binding = %context.binding(),
            implementation = %context.plan().implementation(),
            "activated instance",
        );
        Ok(instance)
    }

    fn create(&self, resolver: &dyn Resolver, context: &Arc<Context>) -> Result<(), ActivationError> {
        self.run(Phase::BeforeCreate, resolver, context)?;

        let raw = context
            .binding()
            .provider()
            .create(resolver, context)?
            .ok_or_else(|| ActivationError::ProviderFailed {
                service: context.service(),
                chain: context.chain(),
            })?;
        {
            let mut slot = context.slot();
            if let state @ (SlotState::Created | SlotState::Initialized | SlotState::Destroyed) =
                slot.state()
            {
                return Err(ActivationError::InvalidOperation {
                    operation: "create",
                    state,
                    chain: context.chain(),
                });
            }
            *slot = InstanceSlot::Created(raw);
        }

        self.run(Phase::AfterCreate, resolver, context)
    }

    fn seal(&self, context: &Arc<Context>) -> Result<(), ActivationError> {
        let mut slot = context.slot();
        let raw = match std::mem::take(&mut *slot) {
            InstanceSlot::Created(raw) => raw,
            other => {
                let state = other.state();
                *slot = other;
                return Err(ActivationError::InvalidOperation {
                    operation: "initialize",
                    state,
                    chain: context.chain(),
                });
            }
        };
        let reference = context.binding().provider().seal(context, raw)?;
        *slot = InstanceSlot::Initialized(reference);
        Ok(())
    }

    /// Runs the destruction phases on the object of `context` and marks it
    /// destroyed.
    ///
    /// Every strategy of every phase runs even if an earlier one failed. The
    /// failures are returned together.
    pub fn destroy(
        &self,
        resolver: &dyn Resolver,
        context: &Arc<Context>,
    ) -> Result<(), ActivationError> {
        let state = context.state();
        if matches!(state, SlotState::Empty | SlotState::Destroyed) {
            return Err(ActivationError::InvalidOperation {
                operation: "destroy",
                state,
                chain: context.chain(),
            });
        }

        let mut failures = Vec::new();
        for phase in Phase::DESTRUCTION {
            for strategy in self.strategies_of(phase) {
                if let Err(err) = strategy.execute(resolver, context) {
                    tracing::warn!(
                        binding = %context.binding(),
                        %phase,
                        error = %err,
                        "destruction step failed",
                    );
                    match err {
                        ActivationError::Destruction { failures: nested } => {
                            failures.extend(nested)
                        }
                        err => failures.push(err),
                    }
                }
            }
        }
        *context.slot() = InstanceSlot::Destroyed;
        tracing::debug!(binding = %context.binding(), "destroyed instance");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ActivationError::Destruction { failures })
        }
    }
}

impl Debug for Activator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let phases: Vec<_> = self
            .strategies
            .read()
            .iter()
            .map(|strategy| strategy.phase())
            .collect();
        f.debug_struct("Activator")
            .field("strategies", &phases)
            .finish()
    }
}
