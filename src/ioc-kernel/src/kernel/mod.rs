pub mod context;
pub mod dependency;
pub mod registry;
pub mod resolver;

mod core;
mod handle;
mod instance;
mod settings;

use std::sync::Arc;

use crate::util::any::AsAny;

pub use handle::Kernel;
pub use instance::{Instance, InstanceReference};
pub use settings::KernelSettings;

pub(crate) use self::core::KernelCore;

/// Anything the kernel can construct, hold and hand out.
pub trait Managed: AsAny + Send + Sync + 'static {}

impl<T> Managed for T where T: AsAny + Send + Sync + 'static {}

/// A [`Managed`] object whose ownership can be shared, which in practice
/// means an [`Arc`] of some possibly unsized service type.
pub trait SharedManaged: Managed {
    fn dyn_clone(&self) -> Box<dyn SharedManaged>;

    /// The address of the shared allocation, used as the object's identity.
    fn address(&self) -> usize;
}

impl<T> SharedManaged for Arc<T>
where
    T: Send + Sync + ?Sized + 'static,
{
    fn dyn_clone(&self) -> Box<dyn SharedManaged> {
        Box::new(Arc::clone(self))
    }

    fn address(&self) -> usize {
        Arc::as_ptr(self) as *const () as usize
    }
}
