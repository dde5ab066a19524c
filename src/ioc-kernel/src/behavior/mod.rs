//! Lifecycle behaviors decide whether a request gets a fresh instance or a
//! cached one, and own the cache.

mod cached;
mod scope;
mod transient;

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::kernel::context::Context;
use crate::kernel::resolver::ActivationError;
use crate::kernel::Instance;

pub use cached::{CacheKeying, CachedBehavior, ScopeKey};
pub use scope::{ActivationScope, ScopeId};
pub use transient::TransientBehavior;

/// An instance produced by the activator together with the context it was
/// activated in, which is needed to destroy it later.
#[derive(Debug, Clone)]
pub struct Activated {
    pub instance: Instance,
    pub context: Arc<Context>,
}

impl Activated {
    pub fn new(instance: Instance, context: Arc<Context>) -> Self {
        Self { instance, context }
    }
}

/// A lifecycle policy for the instances of one binding.
///
/// `resolve` either returns a cached instance or calls `activate` to get a
/// new one. An implementation caching instances must hand every instance it
/// removes from its cache back to the caller, which destroys it.
pub trait Behavior: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn resolve(
        &self,
        context: &Arc<Context>,
        activate: &mut dyn FnMut() -> Result<Activated, ActivationError>,
    ) -> Result<Instance, ActivationError>;

    /// Evicts the cached instance at `address`.
    fn release(&self, address: usize) -> Option<Activated>;

    /// Evicts every instance cached for `scope`.
    fn release_scope(&self, _scope: ScopeId) -> Vec<Activated> {
        Vec::new()
    }

    /// Evicts everything.
    fn clear(&self) -> Vec<Activated>;

    /// Whether instances may be activated as soon as the kernel is built.
    fn is_eager(&self) -> bool {
        false
    }
}

/// The lifecycle a binding is registered with.
#[derive(Clone, Default)]
pub enum LifecyclePolicy {
    /// A new instance for every request.
    #[default]
    Transient,
    /// One instance per binding for the whole kernel.
    Singleton,
    /// One instance per binding and thread.
    Thread,
    /// One instance per binding and [`ActivationScope`]; transient outside
    /// of any scope.
    ActivationScope,
    Custom(Arc<dyn Behavior>),
}

impl LifecyclePolicy {
    /// Creates the behavior a binding uses. Every call creates a new cache,
    /// so a binding calls this once.
    pub fn create_behavior(&self) -> Arc<dyn Behavior> {
        match self {
            Self::Transient => Arc::new(TransientBehavior),
            Self::Singleton => Arc::new(CachedBehavior::new(CacheKeying::Kernel)),
            Self::Thread => Arc::new(CachedBehavior::new(CacheKeying::Thread)),
            Self::ActivationScope => Arc::new(CachedBehavior::new(CacheKeying::Scope)),
            Self::Custom(behavior) => Arc::clone(behavior),
        }
    }
}

impl Debug for LifecyclePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Custom(behavior) => f.debug_tuple("Custom").field(&behavior.name()).finish(),
            _ => Display::fmt(self, f),
        }
    }
}

impl Display for LifecyclePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Transient => f.write_str("Transient"),
            Self::Singleton => f.write_str("Singleton"),
            Self::Thread => f.write_str("Thread"),
            Self::ActivationScope => f.write_str("ActivationScope"),
            Self::Custom(behavior) => f.write_str(behavior.name()),
        }
    }
}
