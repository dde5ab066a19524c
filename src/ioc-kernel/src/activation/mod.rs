//! Creation, initialization and destruction of the object owned by a
//! [`Context`].
//!
//! The [`Activator`] drives a context's slot through its states and, at each
//! [`Phase`], runs the [`ActivationStrategy`]s registered for that phase in
//! registration order.

mod activator;
mod strategies;

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::kernel::context::Context;
use crate::kernel::resolver::{ActivationError, Resolver};
use crate::planning::BoxError;

pub use activator::Activator;
pub use strategies::{
    ActivationActionStrategy, DeactivationActionStrategy, DisposeStrategy,
    MemberInjectionStrategy, ProxyStrategy, StartStrategy, StopStrategy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    BeforeCreate,
    AfterCreate,
    Initialize,
    AfterInitialize,
    BeforeDestroy,
    Destroy,
    AfterDestroy,
}

impl Phase {
    pub const ACTIVATION: [Phase; 4] = [
        Phase::BeforeCreate,
        Phase::AfterCreate,
        Phase::Initialize,
        Phase::AfterInitialize,
    ];

    pub const DESTRUCTION: [Phase; 3] = [Phase::BeforeDestroy, Phase::Destroy, Phase::AfterDestroy];
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::BeforeCreate => "before-create",
            Self::AfterCreate => "after-create",
            Self::Initialize => "initialize",
            Self::AfterInitialize => "after-initialize",
            Self::BeforeDestroy => "before-destroy",
            Self::Destroy => "destroy",
            Self::AfterDestroy => "after-destroy",
        };
        f.write_str(name)
    }
}

/// One step of activation or destruction.
///
/// A strategy belongs to exactly one [`Phase`]. Strategies are registered on
/// the [`Activator`] and removed again by identity.
#[cfg_attr(test, mockall::automock)]
pub trait ActivationStrategy: Send + Sync + 'static {
    fn phase(&self) -> Phase;

    fn execute(&self, resolver: &dyn Resolver, context: &Arc<Context>)
        -> Result<(), ActivationError>;
}

/// Wraps an error raised by user code during `phase`.
pub(crate) fn lifecycle_error(context: &Context, phase: Phase, err: BoxError) -> ActivationError {
    ActivationError::Lifecycle {
        service: context.service(),
        phase,
        source: Arc::from(err),
        chain: context.chain(),
    }
}
