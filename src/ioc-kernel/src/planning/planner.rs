use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::kernel::registry::Binding;
use crate::planning::{
    ActivationPlan, PlanningError, PlanningStrategy, TypeDescriptor, TypeInspector,
};
use crate::service::ImplementationType;

/// Builds activation plans and caches them by implementation type.
///
/// The cache lock is held for the whole build-or-fetch sequence, so a plan
/// is built at most once and never observed half-built. Strategies must not
/// call back into the planner.
pub struct Planner {
    inspector: Arc<dyn TypeInspector>,
    strategies: RwLock<Vec<Arc<dyn PlanningStrategy>>>,
    plans: Mutex<HashMap<ImplementationType, Arc<ActivationPlan>>>,
}

impl Planner {
    pub fn new(
        inspector: Arc<dyn TypeInspector>,
        strategies: Vec<Arc<dyn PlanningStrategy>>,
    ) -> Self {
        Self {
            inspector,
            strategies: RwLock::new(strategies),
            plans: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_plan(
        &self,
        binding: &Binding,
        implementation: ImplementationType,
    ) -> Result<Arc<ActivationPlan>, PlanningError> {
        let mut plans = self.plans.lock();
        if let Some(plan) = plans.get(&implementation) {
            return Ok(Arc::clone(plan));
        }

        let descriptor = self
            .inspector
            .inspect(implementation)
            .unwrap_or_else(|| Arc::new(TypeDescriptor::opaque(implementation)));
        let plan = Arc::new(self.build(descriptor)?);
        tracing::debug!(
            binding = %binding,
            implementation = %implementation,
            members = plan.members().len(),
            "built activation plan",
        );
        plans.insert(implementation, Arc::clone(&plan));
        Ok(plan)
    }

    /// Evicts the plan of `implementation` and lets every strategy release
    /// what it attached to it. Returns whether a plan was cached.
    pub fn release_plan(&self, binding: &Binding, implementation: ImplementationType) -> bool {
        let mut plans = self.plans.lock();
        let Some(plan) = plans.remove(&implementation) else {
            return false;
        };
        for strategy in self.strategies.read().iter() {
            strategy.release(&plan);
        }
        tracing::debug!(
            binding = %binding,
            implementation = %implementation,
            "released activation plan",
        );
        true
    }

    pub fn contains(&self, implementation: ImplementationType) -> bool {
        self.plans.lock().contains_key(&implementation)
    }

    pub fn len(&self) -> usize {
        self.plans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.lock().is_empty()
    }

    pub fn add_strategy(&self, strategy: Arc<dyn PlanningStrategy>) {
        self.strategies.write().push(strategy);
    }

    /// Removes a strategy by identity.
    pub fn remove_strategy(&self, strategy: &Arc<dyn PlanningStrategy>) -> bool {
        let mut strategies = self.strategies.write();
        let before = strategies.len();
        strategies.retain(|s| !Arc::ptr_eq(s, strategy));
        strategies.len() != before
    }

    pub fn strategies(&self) -> Vec<Arc<dyn PlanningStrategy>> {
        self.strategies.read().clone()
    }

    fn build(&self, descriptor: Arc<TypeDescriptor>) -> Result<ActivationPlan, PlanningError> {
        let strategies = self.strategies.read();
        let mut plan = ActivationPlan::new(descriptor);
        for (index, strategy) in strategies.iter().enumerate() {
            if let Err(err) = strategy.execute(&mut plan) {
                for executed in strategies[..index].iter().rev() {
                    executed.release(&plan);
                }
                tracing::debug!(
                    implementation = %plan.implementation(),
                    error = %err,
                    "failed to build activation plan",
                );
                return Err(err);
            }
        }
        Ok(plan)
    }
}

impl Debug for Planner {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Planner")
            .field("strategies", &self.strategies.read().len())
            .field("plans", &self.plans.lock().len())
            .finish_non_exhaustive()
    }
}
