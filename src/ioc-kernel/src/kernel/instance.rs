use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::kernel::{Managed, SharedManaged};
use crate::service::ServiceType;
use crate::util::any::DowncastRef;

/// A type-erased handle to an activated object.
///
/// An [`Instance`] wraps an `Arc<S>` where `S` is the service type it was
/// created for. Cloning an [`Instance`] clones the [`Arc`], so two clones are
/// the same object and have the same [`Instance::address`].
pub struct Instance {
    handle: Box<dyn SharedManaged>,
    service: ServiceType,
}

impl Instance {
    pub fn new<S>(object: Arc<S>) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        Self {
            handle: Box::new(object),
            service: ServiceType::of::<S>(),
        }
    }

    /// Wraps a plain value, typically a transient parameter or an inline
    /// argument.
    pub fn from_value<T>(value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::new(Arc::new(value))
    }

    pub fn service_type(&self) -> ServiceType {
        self.service
    }

    pub fn address(&self) -> usize {
        self.handle.address()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }

    pub fn is<S>(&self) -> bool
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.handle.is::<Arc<S>>()
    }

    pub fn downcast<S>(&self) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.handle.downcast_ref::<Arc<S>>().cloned()
    }
}

impl Clone for Instance {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.dyn_clone(),
            service: self.service,
        }
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Instance")
            .field("service", &self.service.name())
            .field("address", &format_args!("{:#x}", self.address()))
            .finish()
    }
}

/// The activated object as it is stored in a context once initialization
/// finished.
///
/// `instance` is what callers receive and may be replaced by a proxy.
/// `concrete` is the implementation object before any upcast, used by
/// lifecycle hooks which need to see the concrete type.
#[derive(Clone)]
pub struct InstanceReference {
    instance: Instance,
    concrete: Option<Arc<dyn Managed>>,
}

impl InstanceReference {
    pub fn new(instance: Instance, concrete: Option<Arc<dyn Managed>>) -> Self {
        Self { instance, concrete }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn concrete(&self) -> Option<&dyn Managed> {
        self.concrete.as_deref()
    }

    pub fn replace_instance(&mut self, instance: Instance) -> Instance {
        std::mem::replace(&mut self.instance, instance)
    }
}

impl Debug for InstanceReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("InstanceReference")
            .field("instance", &self.instance)
            .field("concrete", &self.concrete.as_ref().map(|c| (**c).type_name()))
            .finish()
    }
}
