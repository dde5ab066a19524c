use std::collections::HashMap;
use std::sync::Arc;

use crate::interception::{Advice, AdviceRegistry, InterceptorSource, MatchRule, MethodId};
use crate::kernel::dependency::ArgumentResolver;
use crate::planning::{
    ActivationPlan, Argument, ConstructorDescriptor, ConstructorDirective, InterceptionDirective,
    MemberDirective, MemberKind, PlanningError, PlanningStrategy, Target, TargetDescriptor,
    TargetKind,
};

fn make_arguments(
    targets: &[TargetDescriptor],
    member: &'static str,
    kind: TargetKind,
    resolver: &Arc<dyn ArgumentResolver>,
) -> Vec<Argument> {
    targets
        .iter()
        .map(|target| {
            let target = Target::new(target.name(), target.service(), target.is_optional())
                .in_member(member, kind);
            Argument::new(target, Arc::clone(resolver))
        })
        .collect()
}

/// Chooses the constructor to inject through.
///
/// A single constructor carrying the injection marker always wins. Without
/// one, the constructor with the most parameters is used, the first declared
/// on a tie.
pub struct ConstructorSelectionStrategy {
    resolver: Arc<dyn ArgumentResolver>,
}

impl ConstructorSelectionStrategy {
    pub fn new(resolver: Arc<dyn ArgumentResolver>) -> Self {
        Self { resolver }
    }

    fn select<'a>(
        &self,
        plan: &'a ActivationPlan,
    ) -> Result<&'a ConstructorDescriptor, PlanningError> {
        let implementation = plan.implementation();
        let constructors = plan.descriptor().constructors();

        let marked: Vec<_> = constructors
            .iter()
            .filter(|constructor| constructor.has_injection_marker())
            .collect();
        match marked.as_slice() {
            [constructor] => return Ok(*constructor),
            [] => {}
            _ => {
                return Err(PlanningError::AmbiguousConstructor {
                    implementation,
                    count: marked.len(),
                })
            }
        }

        constructors
            .iter()
            .rev()
            .max_by_key(|constructor| constructor.targets().len())
            .ok_or(PlanningError::NoConstructor { implementation })
    }
}

impl PlanningStrategy for ConstructorSelectionStrategy {
    fn execute(&self, plan: &mut ActivationPlan) -> Result<(), PlanningError> {
        if !plan.descriptor().is_constructible() {
            return Ok(());
        }
        let constructor = self.select(plan)?;
        let directive = ConstructorDirective::new(
            constructor.name(),
            make_arguments(
                constructor.targets(),
                constructor.name(),
                TargetKind::Constructor,
                &self.resolver,
            ),
            Arc::clone(constructor.invoker()),
        );
        tracing::trace!(
            implementation = %plan.implementation(),
            constructor = directive.name(),
            "selected constructor",
        );
        plan.set_constructor(directive);
        Ok(())
    }
}

/// Adds a directive for every marked member of one kind.
pub struct MemberPlanningStrategy {
    kind: MemberKind,
    resolver: Arc<dyn ArgumentResolver>,
}

impl MemberPlanningStrategy {
    pub fn new(kind: MemberKind, resolver: Arc<dyn ArgumentResolver>) -> Self {
        Self { kind, resolver }
    }
}

impl PlanningStrategy for MemberPlanningStrategy {
    fn execute(&self, plan: &mut ActivationPlan) -> Result<(), PlanningError> {
        let directives: Vec<_> = plan
            .descriptor()
            .members()
            .iter()
            .filter(|member| member.kind() == self.kind && member.has_injection_marker())
            .map(|member| {
                MemberDirective::new(
                    member.kind(),
                    member.name(),
                    make_arguments(
                        member.targets(),
                        member.name(),
                        member.kind().into(),
                        &self.resolver,
                    ),
                    Arc::clone(member.injector()),
                )
            })
            .collect();
        directives
            .into_iter()
            .for_each(|directive| plan.add_member(directive));
        Ok(())
    }
}

/// Copies the declared lifecycle policy and hooks into the plan.
#[derive(Debug, Default)]
pub struct LifecyclePlanningStrategy;

impl PlanningStrategy for LifecyclePlanningStrategy {
    fn execute(&self, plan: &mut ActivationPlan) -> Result<(), PlanningError> {
        let lifecycle = plan.descriptor().lifecycle().cloned();
        let hooks = plan.descriptor().hooks().clone();
        if let Some(lifecycle) = lifecycle {
            plan.set_lifecycle(lifecycle);
        }
        plan.set_hooks(hooks);
        Ok(())
    }
}

/// Turns interceptor markers into static advice.
///
/// The advice lives as long as the plan: it is unregistered again when the
/// plan is released.
pub struct InterceptionPlanningStrategy {
    registry: Arc<AdviceRegistry>,
    interceptors: Arc<HashMap<&'static str, InterceptorSource>>,
}

impl InterceptionPlanningStrategy {
    pub fn new(
        registry: Arc<AdviceRegistry>,
        interceptors: Arc<HashMap<&'static str, InterceptorSource>>,
    ) -> Self {
        Self {
            registry,
            interceptors,
        }
    }
}

impl PlanningStrategy for InterceptionPlanningStrategy {
    fn execute(&self, plan: &mut ActivationPlan) -> Result<(), PlanningError> {
        let implementation = plan.implementation();
        let markers = plan.descriptor().interceptors().to_vec();
        for marker in markers {
            let Some(source) = self.interceptors.get(marker.interceptor()) else {
                self.release(plan);
                return Err(PlanningError::UnknownInterceptor {
                    implementation,
                    name: marker.interceptor(),
                });
            };
            let method = MethodId::new(implementation, marker.method());
            let advice = Advice::new(
                MatchRule::Method(method.clone()),
                source.clone(),
                marker.order(),
            );
            let id = self.registry.register(advice);
            plan.add_interception(InterceptionDirective::new(
                method,
                marker.interceptor(),
                marker.order(),
                id,
            ));
        }
        Ok(())
    }

    fn release(&self, plan: &ActivationPlan) {
        for directive in plan.interception() {
            self.registry.unregister(directive.advice());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use crate::behavior::LifecyclePolicy;
    use crate::kernel::dependency::StandardArgumentResolver;
    use crate::planning::{TargetDescriptor, TypeDescriptor};
    use crate::service::ServiceType;

    use super::*;

    #[derive(Debug, Default)]
    struct Service {
        level: u8,
    }

    fn resolver() -> Arc<dyn ArgumentResolver> {
        Arc::new(StandardArgumentResolver::default())
    }

    fn plan_of(descriptor: TypeDescriptor) -> ActivationPlan {
        ActivationPlan::new(Arc::new(descriptor))
    }

    fn unit(_: crate::planning::ArgumentValues) -> Result<Service, Infallible> {
        Ok(Service::default())
    }

    #[test]
    fn constructor_selection_prefers_marked_constructor() {
        let mut plan = plan_of(
            TypeDescriptor::builder::<Service>()
                .constructor(
                    "with_two",
                    vec![
                        TargetDescriptor::required::<u8>("a"),
                        TargetDescriptor::required::<u8>("b"),
                    ],
                    false,
                    unit,
                )
                .constructor("new", vec![], true, unit)
                .build(),
        );
        ConstructorSelectionStrategy::new(resolver())
            .execute(&mut plan)
            .unwrap();
        assert_eq!(plan.constructor().unwrap().name(), "new");
    }

    #[test]
    fn constructor_selection_prefers_most_arguments_then_first_declared() {
        let mut plan = plan_of(
            TypeDescriptor::builder::<Service>()
                .constructor("empty", vec![], false, unit)
                .constructor("first", vec![TargetDescriptor::required::<u8>("a")], false, unit)
                .constructor("second", vec![TargetDescriptor::required::<u16>("b")], false, unit)
                .build(),
        );
        ConstructorSelectionStrategy::new(resolver())
            .execute(&mut plan)
            .unwrap();
        let constructor = plan.constructor().unwrap();
        assert_eq!(constructor.name(), "first");
        assert_eq!(
            constructor.arguments()[0].target().service(),
            ServiceType::of::<u8>()
        );
        assert_eq!(constructor.arguments()[0].target().kind(), TargetKind::Constructor);
    }

    #[test]
    fn constructor_selection_fails_when_several_are_marked() {
        let mut plan = plan_of(
            TypeDescriptor::builder::<Service>()
                .constructor("a", vec![], true, unit)
                .constructor("b", vec![], true, unit)
                .build(),
        );
        let res = ConstructorSelectionStrategy::new(resolver()).execute(&mut plan);
        assert!(matches!(
            res,
            Err(PlanningError::AmbiguousConstructor { count: 2, .. })
        ));
    }

    #[test]
    fn constructor_selection_fails_when_none_is_declared() {
        let mut plan = plan_of(TypeDescriptor::builder::<Service>().build());
        let res = ConstructorSelectionStrategy::new(resolver()).execute(&mut plan);
        assert!(matches!(res, Err(PlanningError::NoConstructor { .. })));
    }

    #[test]
    fn constructor_selection_skips_opaque_types() {
        let mut plan = ActivationPlan::opaque(crate::service::ImplementationType::of::<u8>());
        ConstructorSelectionStrategy::new(resolver())
            .execute(&mut plan)
            .unwrap();
        assert!(plan.constructor().is_none());
    }

    #[test]
    fn member_planning_keeps_marked_members_of_its_kind() {
        let set_level = |service: &mut Service, args: crate::planning::ArgumentValues| {
            service.level = args.value(0)?;
            Ok::<_, crate::planning::ArgumentError>(())
        };
        let descriptor = TypeDescriptor::builder::<Service>()
            .property("level", TargetDescriptor::required::<u8>("level"), set_level)
            .member(
                MemberKind::Property,
                "ignored",
                vec![TargetDescriptor::required::<u8>("level")],
                false,
                set_level,
            )
            .method("configure", vec![TargetDescriptor::required::<u8>("level")], set_level)
            .build();
        let mut plan = plan_of(descriptor);

        MemberPlanningStrategy::new(MemberKind::Property, resolver())
            .execute(&mut plan)
            .unwrap();
        assert_eq!(plan.members().len(), 1);
        assert_eq!(plan.members()[0].name(), "level");
        assert_eq!(
            plan.members()[0].arguments()[0].target().kind(),
            TargetKind::Property
        );

        MemberPlanningStrategy::new(MemberKind::Method, resolver())
            .execute(&mut plan)
            .unwrap();
        assert_eq!(plan.members_of(MemberKind::Method).count(), 1);
    }

    #[test]
    fn lifecycle_planning_copies_policy() {
        let mut plan = plan_of(
            TypeDescriptor::builder::<Service>()
                .lifecycle(LifecyclePolicy::Singleton)
                .build(),
        );
        LifecyclePlanningStrategy.execute(&mut plan).unwrap();
        assert!(matches!(plan.lifecycle(), Some(LifecyclePolicy::Singleton)));
    }

    fn make_interceptors() -> Arc<HashMap<&'static str, InterceptorSource>> {
        let mut interceptors = HashMap::new();
        interceptors.insert(
            "audit",
            InterceptorSource::from_fn(|invocation: &mut crate::interception::Invocation<'_>| {
                invocation.proceed()
            }),
        );
        Arc::new(interceptors)
    }

    #[test]
    fn interception_planning_registers_and_releases_advice() {
        let registry = Arc::new(AdviceRegistry::new());
        let strategy = InterceptionPlanningStrategy::new(Arc::clone(&registry), make_interceptors());
        let mut plan = plan_of(
            TypeDescriptor::builder::<Service>()
                .intercept("run", "audit", 3)
                .build(),
        );

        strategy.execute(&mut plan).unwrap();
        assert!(plan.has_interception());
        assert_eq!(plan.interception()[0].order(), 3);
        assert!(registry.has_advice(plan.implementation()));

        strategy.release(&plan);
        assert!(!registry.has_advice(plan.implementation()));
    }

    #[test]
    fn interception_planning_fails_when_interceptor_is_unknown() {
        let registry = Arc::new(AdviceRegistry::new());
        let strategy = InterceptionPlanningStrategy::new(Arc::clone(&registry), make_interceptors());
        let mut plan = plan_of(
            TypeDescriptor::builder::<Service>()
                .intercept("run", "audit", 0)
                .intercept("stop", "missing", 0)
                .build(),
        );

        let res = strategy.execute(&mut plan);
        assert!(matches!(
            res,
            Err(PlanningError::UnknownInterceptor { name: "missing", .. })
        ));
        assert!(!registry.has_advice(plan.implementation()));
    }
}
