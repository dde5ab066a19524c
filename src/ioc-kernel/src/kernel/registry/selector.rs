use std::sync::Arc;

use crate::kernel::context::ServiceRequest;
use crate::kernel::registry::Binding;
use crate::kernel::resolver::ActivationError;

/// Chooses the binding which serves `request`.
///
/// The bindings split into the default one, if any, and the non-default ones
/// whose condition holds:
///
/// - exactly one matching non-default binding wins over the default,
/// - no match falls back to the default,
/// - several matches fall back to the default too,
/// - several matches without a default are ambiguous,
/// - nothing at all is not found.
pub fn select_binding(
    bindings: &[Arc<Binding>],
    request: &ServiceRequest,
) -> Result<Arc<Binding>, ActivationError> {
    let default = bindings.iter().find(|binding| binding.is_default());
    let matching: Vec<_> = bindings
        .iter()
        .filter(|binding| binding.is_conditional() && binding.matches(request))
        .collect();

    let selected = match (matching.as_slice(), default) {
        ([binding], _) => Arc::clone(binding),
        (_, Some(default)) => Arc::clone(default),
        ([], None) => {
            return Err(ActivationError::NotFound {
                service: request.service(),
                chain: request.chain(),
            })
        }
        (_, None) => {
            return Err(ActivationError::AmbiguousBinding {
                service: request.service(),
                bindings: matching.iter().map(ToString::to_string).collect(),
                chain: request.chain(),
            })
        }
    };

    tracing::trace!(
        service = %request.service(),
        binding = %selected,
        candidates = matching.len(),
        "selected binding",
    );
    Ok(selected)
}

/// Every binding whose condition holds for `request`, in registration order.
pub fn select_all(bindings: &[Arc<Binding>], request: &ServiceRequest) -> Vec<Arc<Binding>> {
    bindings
        .iter()
        .filter(|binding| binding.matches(request))
        .cloned()
        .collect()
}
