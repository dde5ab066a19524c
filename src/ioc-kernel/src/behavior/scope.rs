use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::kernel::context::ServiceRequest;
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::kernel::{Instance, Kernel};
use crate::service::ServiceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "scope#{}", self.0)
    }
}

/// A resolver whose requests share the instances of bindings registered in
/// activation scope.
///
/// Ending the scope, explicitly or by dropping it, destroys those instances.
pub struct ActivationScope {
    kernel: Kernel,
    id: ScopeId,
    ended: AtomicBool,
}

impl ActivationScope {
    pub(crate) fn new(kernel: Kernel, id: ScopeId) -> Self {
        Self {
            kernel,
            id,
            ended: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Destroys every instance cached for this scope. Calling it again does
    /// nothing.
    pub fn end(&self) -> Result<(), ActivationError> {
        if self.ended.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.kernel.end_scope(self.id)
    }

    fn scoped(&self, request: ServiceRequest) -> ServiceRequest {
        if request.scope().is_some() {
            request
        } else {
            request.within_scope(self.id)
        }
    }
}

impl Resolver for ActivationScope {
    fn resolve_request(
        &self,
        request: ServiceRequest,
    ) -> Result<Option<Instance>, ActivationError> {
        self.kernel.resolve_request(self.scoped(request))
    }

    fn resolve_all_requests(
        &self,
        request: ServiceRequest,
    ) -> Result<Vec<Instance>, ActivationError> {
        self.kernel.resolve_all_requests(self.scoped(request))
    }

    fn coerce(&self, value: &Instance, target: ServiceType) -> Option<Instance> {
        self.kernel.coerce(value, target)
    }
}

impl Drop for ActivationScope {
    fn drop(&mut self) {
        if let Err(err) = self.end() {
            tracing::warn!(scope = %self.id, error = %err, "failed to end activation scope");
        }
    }
}
