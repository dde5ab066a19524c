use std::sync::Arc;

use crate::kernel::context::{Context, ServiceRequest};
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::kernel::Instance;
use crate::planning::Target;

/// Produces the value of one injection target.
pub trait ArgumentResolver: Send + Sync + 'static {
    fn resolve(
        &self,
        resolver: &dyn Resolver,
        context: &Arc<Context>,
        target: &Target,
    ) -> Result<Option<Instance>, ActivationError>;
}

/// Looks for a value in this order, the first hit wins:
///
/// 1. a transient parameter of the current request with the target's name,
/// 2. an inline argument of the binding with the target's name, coerced to
///    the target type when needed,
/// 3. a child request resolved through `resolver`.
#[derive(Debug, Default)]
pub struct StandardArgumentResolver;

impl ArgumentResolver for StandardArgumentResolver {
    fn resolve(
        &self,
        resolver: &dyn Resolver,
        context: &Arc<Context>,
        target: &Target,
    ) -> Result<Option<Instance>, ActivationError> {
        if let Some(value) = context.request().parameters().get(target.name()) {
            tracing::trace!(target = %target, "using transient parameter");
            return Ok(Some(value.clone()));
        }

        if let Some(value) = context.binding().inline_argument(target.name()) {
            if value.service_type() == target.service() {
                return Ok(Some(value.clone()));
            }
            return resolver
                .coerce(value, target.service())
                .map(Some)
                .ok_or_else(|| ActivationError::InvalidInlineArgument {
                    name: target.name(),
                    expected: target.service(),
                    actual: value.service_type(),
                    chain: context.chain(),
                });
        }

        resolver.resolve_request(ServiceRequest::child(context, target))
    }
}
