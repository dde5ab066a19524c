use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::interception::{Advice, Interceptor, Request};
use crate::service::ImplementationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdviceId(usize);

/// Every advice known to a kernel.
#[derive(Debug, Default)]
pub struct AdviceRegistry {
    advice: RwLock<Vec<(AdviceId, Advice)>>,
    next: AtomicUsize,
}

impl AdviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, advice: Advice) -> AdviceId {
        let id = AdviceId(self.next.fetch_add(1, Ordering::Relaxed));
        self.advice.write().push((id, advice));
        id
    }

    pub fn unregister(&self, id: AdviceId) -> bool {
        let mut advice = self.advice.write();
        let before = advice.len();
        advice.retain(|(other, _)| *other != id);
        advice.len() != before
    }

    /// The interceptors of every advice matching `request`, ordered by the
    /// advice order. Equal orders keep registration order.
    pub fn get_interceptors(&self, request: &Request) -> Vec<Arc<dyn Interceptor>> {
        let mut matching: Vec<_> = self
            .advice
            .read()
            .iter()
            .filter(|(_, advice)| advice.rule().matches(request))
            .map(|(_, advice)| advice.clone())
            .collect();
        matching.sort_by_key(Advice::order);
        matching
            .iter()
            .map(|advice| advice.source().get(request))
            .collect()
    }

    /// Whether some advice may apply to a call on `implementation`.
    pub fn has_advice(&self, implementation: ImplementationType) -> bool {
        self.advice
            .read()
            .iter()
            .any(|(_, advice)| advice.rule().may_apply_to(implementation))
    }

    pub fn len(&self) -> usize {
        self.advice.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.advice.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use crate::interception::{InterceptorSource, Invocation, MatchRule, MethodId};
    use crate::kernel::Instance;

    use super::*;

    struct Greeter;

    fn make_request(method: &'static str) -> Request {
        Request::new(
            None,
            Instance::from_value(Greeter),
            MethodId::of::<Greeter>(method),
            Vec::new(),
        )
    }

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> InterceptorSource {
        let log = Arc::clone(log);
        InterceptorSource::from_fn(move |invocation: &mut Invocation<'_>| {
            log.lock().push(name);
            invocation.proceed()
        })
    }

    #[test]
    fn advice_registry_get_interceptors_orders_by_advice_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = AdviceRegistry::new();
        registry.register(Advice::new(
            MatchRule::method::<Greeter>("greet"),
            recording(&log, "a"),
            5,
        ));
        registry.register(Advice::new(
            MatchRule::method::<Greeter>("greet"),
            recording(&log, "b"),
            -1,
        ));
        registry.register(Advice::new(
            MatchRule::predicate(|_| true),
            recording(&log, "c"),
            5,
        ));
        registry.register(Advice::new(
            MatchRule::method::<Greeter>("leave"),
            recording(&log, "d"),
            -10,
        ));

        let request = make_request("greet");
        let interceptors = registry.get_interceptors(&request);
        assert_eq!(interceptors.len(), 3);

        let invocation = Invocation::new(request, interceptors, |_: &mut Request| {
            Ok::<_, crate::planning::BoxError>(Box::new(()) as Box<dyn std::any::Any + Send>)
        });
        invocation.run().unwrap();
        assert_eq!(*log.lock(), vec!["b", "a", "c"]);
    }

    #[test]
    fn advice_registry_factory_source_creates_interceptor_per_call() {
        let created = Arc::new(AtomicUsize::new(0));
        let registry = AdviceRegistry::new();
        let counter = Arc::clone(&created);
        registry.register(Advice::new(
            MatchRule::predicate(|_| true),
            InterceptorSource::factory(move |_: &Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                |invocation: &mut Invocation<'_>| invocation.proceed()
            }),
            0,
        ));

        registry.get_interceptors(&make_request("greet"));
        registry.get_interceptors(&make_request("greet"));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn advice_registry_unregister_succeeds() {
        let registry = AdviceRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = registry.register(Advice::new(
            MatchRule::method::<Greeter>("greet"),
            recording(&log, "a"),
            0,
        ));

        assert!(registry.has_advice(ImplementationType::of::<Greeter>()));
        assert!(!registry.has_advice(ImplementationType::of::<u8>()));
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
        assert!(!registry.has_advice(ImplementationType::of::<Greeter>()));
    }
}
