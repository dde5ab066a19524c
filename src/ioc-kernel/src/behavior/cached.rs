use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use oneshot::Sender;
use parking_lot::RwLock;

use crate::behavior::{Activated, Behavior, ScopeId};
use crate::kernel::context::Context;
use crate::kernel::resolver::ActivationError;
use crate::kernel::Instance;

/// How a [`CachedBehavior`] derives the cache key of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKeying {
    Kernel,
    Thread,
    Scope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Kernel,
    Thread(ThreadId),
    Scope(ScopeId),
}

/// Caches one instance per [`ScopeKey`].
///
/// A populated entry is read under the shared lock only. On a miss the first
/// thread marks the key as under construction and activates outside the
/// lock, while other threads asking for the same key wait for its outcome.
/// The same thread asking again while constructing is a cycle.
pub struct CachedBehavior {
    keying: CacheKeying,
    state: RwLock<CacheState>,
}

impl CachedBehavior {
    pub fn new(keying: CacheKeying) -> Self {
        Self {
            keying,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn keying(&self) -> CacheKeying {
        self.keying
    }

    pub fn len(&self) -> usize {
        self.state.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().objects.is_empty()
    }

    pub fn cached(&self, key: &ScopeKey) -> Option<Instance> {
        let state = self.state.read();
        state
            .objects
            .get(key)
            .map(|activated| activated.instance.clone())
    }

    fn key_of(&self, context: &Context) -> Option<ScopeKey> {
        match self.keying {
            CacheKeying::Kernel => Some(ScopeKey::Kernel),
            CacheKeying::Thread => Some(ScopeKey::Thread(thread::current().id())),
            CacheKeying::Scope => context.request().scope().map(ScopeKey::Scope),
        }
    }

    /// Either returns the cached instance, waits for another thread to
    /// construct it, or claims the key for the current thread.
    fn claim(&self, key: ScopeKey, context: &Context) -> Result<Claim, ActivationError> {
        loop {
            if let Some(instance) = self.cached(&key) {
                return Ok(Claim::Cached(instance));
            }

            let mut state = self.state.write();
            if let Some(activated) = state.objects.get(&key) {
                return Ok(Claim::Cached(activated.instance.clone()));
            }

            let Some(entry) = state.constructing.get_mut(&key) else {
                state.constructing.insert(key, ConstructingEntry::new());
                return Ok(Claim::Construct);
            };

            if entry.is_constructed_by_current_thread() {
                let err = ActivationError::CyclicDependency {
                    service: context.service(),
                    chain: context.chain(),
                };
                if let Some(entry) = state.constructing.remove(&key) {
                    drop(state);
                    entry.notify(WaitResponse::Error(err.clone()));
                }
                return Err(err);
            }

            let (sender, receiver) = oneshot::channel();
            entry.waiters.push(sender);
            drop(state);

            tracing::trace!(
                binding = %context.binding(),
                key = ?key,
                "waiting for an instance under construction",
            );
            match receiver.recv() {
                Ok(WaitResponse::Constructed(instance)) => return Ok(Claim::Cached(instance)),
                Ok(WaitResponse::Error(err)) => return Err(err),
                // The constructing thread unwound without an answer.
                Err(_) => continue,
            }
        }
    }
}

impl Behavior for CachedBehavior {
    fn name(&self) -> &'static str {
        match self.keying {
            CacheKeying::Kernel => "singleton",
            CacheKeying::Thread => "thread",
            CacheKeying::Scope => "activation scope",
        }
    }

    fn resolve(
        &self,
        context: &Arc<Context>,
        activate: &mut dyn FnMut() -> Result<Activated, ActivationError>,
    ) -> Result<Instance, ActivationError> {
        let Some(key) = self.key_of(context) else {
            return activate().map(|activated| activated.instance);
        };

        match self.claim(key, context)? {
            Claim::Cached(instance) => Ok(instance),
            Claim::Construct => {
                let guard = ConstructionGuard {
                    state: &self.state,
                    key,
                    finished: false,
                };
                let res = activate();
                if res.is_ok() {
                    tracing::debug!(
                        binding = %context.binding(),
                        key = ?key,
                        "cached a new instance",
                    );
                }
                guard.finish(res)
            }
        }
    }

    fn release(&self, address: usize) -> Option<Activated> {
        let mut state = self.state.write();
        let key = state
            .objects
            .iter()
            .find(|(_, activated)| activated.instance.address() == address)
            .map(|(key, _)| *key)?;
        state.objects.remove(&key)
    }

    fn release_scope(&self, scope: ScopeId) -> Vec<Activated> {
        let mut state = self.state.write();
        let keys: Vec<_> = state
            .objects
            .keys()
            .filter(|key| **key == ScopeKey::Scope(scope))
            .copied()
            .collect();
        keys.iter()
            .filter_map(|key| state.objects.remove(key))
            .collect()
    }

    fn clear(&self) -> Vec<Activated> {
        let mut state = self.state.write();
        state.objects.drain().map(|(_, activated)| activated).collect()
    }

    fn is_eager(&self) -> bool {
        self.keying == CacheKeying::Kernel
    }
}

impl Debug for CachedBehavior {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let state = self.state.read();
        f.debug_struct("CachedBehavior")
            .field("keying", &self.keying)
            .field("objects", &state.objects.len())
            .field("constructing", &state.constructing.len())
            .finish()
    }
}

enum Claim {
    Cached(Instance),
    Construct,
}

#[derive(Default)]
struct CacheState {
    objects: HashMap<ScopeKey, Activated>,
    constructing: HashMap<ScopeKey, ConstructingEntry>,
}

struct ConstructingEntry {
    on_thread: ThreadId,
    waiters: Vec<Sender<WaitResponse>>,
}

impl ConstructingEntry {
    fn new() -> Self {
        Self {
            on_thread: thread::current().id(),
            waiters: Vec::new(),
        }
    }

    fn is_constructed_by_current_thread(&self) -> bool {
        thread::current().id() == self.on_thread
    }

    fn notify(self, response: WaitResponse) {
        for sender in self.waiters {
            let _ = sender.send(response.clone());
        }
    }
}

#[derive(Clone)]
enum WaitResponse {
    Constructed(Instance),
    Error(ActivationError),
}

/// Publishes the outcome of a construction. Dropping it without calling
/// `finish` abandons the claim so waiters retry. The cache keeps a detached
/// copy of the context, never the parent chain it was activated under.
struct ConstructionGuard<'a> {
    state: &'a RwLock<CacheState>,
    key: ScopeKey,
    finished: bool,
}

impl ConstructionGuard<'_> {
    fn finish(
        mut self,
        res: Result<Activated, ActivationError>,
    ) -> Result<Instance, ActivationError> {
        let mut state = self.state.write();
        let entry = state.constructing.remove(&self.key);
        let response = match &res {
            Ok(activated) => {
                let cached =
                    Activated::new(activated.instance.clone(), activated.context.detached());
                state.objects.insert(self.key, cached);
                WaitResponse::Constructed(activated.instance.clone())
            }
            Err(err) => WaitResponse::Error(err.clone()),
        };
        drop(state);
        self.finished = true;

        if let Some(entry) = entry {
            entry.notify(response);
        }
        res.map(|activated| activated.instance)
    }
}

impl Drop for ConstructionGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.write().constructing.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::kernel::context::{Parameters, ServiceRequest};
    use crate::kernel::registry::Binding;
    use crate::planning::{ActivationPlan, Target};
    use crate::provider::ConstantProvider;
    use crate::service::{ImplementationType, ServiceType};

    use super::*;

    fn make_context(request: ServiceRequest) -> Arc<Context> {
        let binding = Binding::new(
            ServiceType::of::<usize>(),
            Arc::new(ConstantProvider::new(Arc::new(0usize))),
        );
        Arc::new(Context::new(
            request,
            Arc::new(binding),
            Arc::new(ActivationPlan::opaque(ImplementationType::of::<Arc<usize>>())),
        ))
    }

    fn root_context() -> Arc<Context> {
        make_context(ServiceRequest::new(ServiceType::of::<usize>(), Parameters::new()))
    }

    fn activate_counting(
        counter: &AtomicUsize,
        context: &Arc<Context>,
    ) -> Result<Activated, ActivationError> {
        let value = counter.fetch_add(1, Ordering::SeqCst);
        Ok(Activated::new(
            Instance::from_value(value),
            Arc::clone(context),
        ))
    }

    #[test]
    fn cached_behavior_resolve_returns_same_instance() {
        let behavior = CachedBehavior::new(CacheKeying::Kernel);
        let counter = AtomicUsize::new(0);
        let context = root_context();

        let first = behavior
            .resolve(&context, &mut || activate_counting(&counter, &context))
            .unwrap();
        let second = behavior
            .resolve(&context, &mut || activate_counting(&counter, &context))
            .unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(behavior.len(), 1);
    }

    #[test]
    fn cached_behavior_resolve_creates_once_when_concurrent() {
        const THREADS: usize = 16;
        let behavior = Arc::new(CachedBehavior::new(CacheKeying::Kernel));
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let behavior = Arc::clone(&behavior);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    let context = root_context();
                    behavior
                        .resolve(&context, &mut || {
                            thread::sleep(Duration::from_millis(20));
                            activate_counting(&counter, &context)
                        })
                        .unwrap()
                })
            })
            .collect();
        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| w[0].ptr_eq(&w[1])));
    }

    #[test]
    fn cached_behavior_resolve_fails_when_reentered_on_same_thread() {
        let behavior = CachedBehavior::new(CacheKeying::Kernel);
        let context = root_context();

        let res = behavior.resolve(&context, &mut || {
            let inner = behavior.resolve(&context, &mut || unreachable!());
            assert!(matches!(
                inner,
                Err(ActivationError::CyclicDependency { .. })
            ));
            inner.map(|instance| Activated::new(instance, Arc::clone(&context)))
        });

        assert!(matches!(res, Err(ActivationError::CyclicDependency { .. })));
        assert!(behavior.is_empty());
    }

    #[test]
    fn cached_behavior_resolve_shares_failure_with_waiters() {
        let behavior = Arc::new(CachedBehavior::new(CacheKeying::Kernel));
        let attempts = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let behavior = Arc::clone(&behavior);
                let attempts = Arc::clone(&attempts);
                thread::spawn(move || {
                    let context = root_context();
                    behavior.resolve(&context, &mut || {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        Err(ActivationError::ProviderFailed {
                            service: context.service(),
                            chain: context.chain(),
                        })
                    })
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_err());
        }
        assert!(attempts.load(Ordering::SeqCst) >= 1);
        assert!(behavior.is_empty());
    }

    #[test]
    fn cached_behavior_thread_keying_separates_threads() {
        let behavior = Arc::new(CachedBehavior::new(CacheKeying::Thread));
        let counter = Arc::new(AtomicUsize::new(0));

        let resolve = {
            let behavior = Arc::clone(&behavior);
            let counter = Arc::clone(&counter);
            move || {
                let context = root_context();
                let first = behavior
                    .resolve(&context, &mut || activate_counting(&counter, &context))
                    .unwrap();
                let second = behavior
                    .resolve(&context, &mut || activate_counting(&counter, &context))
                    .unwrap();
                assert!(first.ptr_eq(&second));
                first
            }
        };
        let here = resolve.clone()();
        let there = thread::spawn(resolve).join().unwrap();

        assert!(!here.ptr_eq(&there));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(!behavior.is_eager());
    }

    #[test]
    fn cached_behavior_scope_keying_is_transient_outside_scopes() {
        let behavior = CachedBehavior::new(CacheKeying::Scope);
        let counter = AtomicUsize::new(0);
        let context = root_context();

        let first = behavior
            .resolve(&context, &mut || activate_counting(&counter, &context))
            .unwrap();
        let second = behavior
            .resolve(&context, &mut || activate_counting(&counter, &context))
            .unwrap();
        assert!(!first.ptr_eq(&second));
        assert!(behavior.is_empty());
    }

    #[test]
    fn cached_behavior_release_scope_evicts_scope_entries() {
        let behavior = CachedBehavior::new(CacheKeying::Scope);
        let counter = AtomicUsize::new(0);
        let scope = ScopeId::new(1);
        let context = make_context(
            ServiceRequest::new(ServiceType::of::<usize>(), Parameters::new()).within_scope(scope),
        );
        let other = make_context(
            ServiceRequest::new(ServiceType::of::<usize>(), Parameters::new())
                .within_scope(ScopeId::new(2)),
        );

        behavior
            .resolve(&context, &mut || activate_counting(&counter, &context))
            .unwrap();
        behavior
            .resolve(&other, &mut || activate_counting(&counter, &other))
            .unwrap();
        assert_eq!(behavior.len(), 2);

        let released = behavior.release_scope(scope);
        assert_eq!(released.len(), 1);
        assert_eq!(behavior.len(), 1);
        assert!(behavior.cached(&ScopeKey::Scope(scope)).is_none());
    }

    #[test]
    fn cached_behavior_does_not_retain_parent_context() {
        let behavior = CachedBehavior::new(CacheKeying::Kernel);
        let counter = AtomicUsize::new(0);
        let parent = root_context();
        let target = Target::new("value", ServiceType::of::<usize>(), false);
        let context = make_context(ServiceRequest::child(&parent, &target));
        let parent_ref = Arc::downgrade(&parent);

        let instance = behavior
            .resolve(&context, &mut || activate_counting(&counter, &context))
            .unwrap();
        drop(context);
        drop(parent);
        assert!(parent_ref.upgrade().is_none());

        let released = behavior.release(instance.address()).unwrap();
        assert!(released.context.parent().is_none());
        assert_eq!(released.context.request().depth(), 1);
    }

    #[test]
    fn cached_behavior_release_evicts_by_address() {
        let behavior = CachedBehavior::new(CacheKeying::Kernel);
        let counter = AtomicUsize::new(0);
        let context = root_context();

        let instance = behavior
            .resolve(&context, &mut || activate_counting(&counter, &context))
            .unwrap();
        assert!(behavior.release(instance.address() + 1).is_none());

        let released = behavior.release(instance.address()).unwrap();
        assert!(released.instance.ptr_eq(&instance));
        assert!(behavior.is_empty());

        let again = behavior
            .resolve(&context, &mut || activate_counting(&counter, &context))
            .unwrap();
        assert!(!again.ptr_eq(&instance));
    }
}
