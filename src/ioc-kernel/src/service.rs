//! Type identifiers used as lookup keys throughout the kernel.
//!
//! A [`ServiceType`] is what callers ask for, usually a trait object such as
//! `dyn Logger`. An [`ImplementationType`] is the concrete type a binding
//! constructs and is the key of the activation plan cache.

use std::any::{self, TypeId};
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::hash::{Hash, Hasher};

macro_rules! define_type_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy)]
        pub struct $name {
            id: TypeId,
            name: &'static str,
        }

        impl $name {
            /// Returns the identifier of `T`, which may be unsized.
            pub fn of<T>() -> Self
            where
                T: ?Sized + 'static,
            {
                Self {
                    id: TypeId::of::<T>(),
                    name: any::type_name::<T>(),
                }
            }

            pub fn id(&self) -> TypeId {
                self.id
            }

            pub fn name(&self) -> &'static str {
                self.name
            }

            pub fn is<T>(&self) -> bool
            where
                T: ?Sized + 'static,
            {
                self.id == TypeId::of::<T>()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                write!(f, "{}({})", stringify!($name), self.name)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str(self.name)
            }
        }
    };
}

define_type_identifier!(
    /// The abstract type a caller requests from the kernel.
    ServiceType
);

define_type_identifier!(
    /// The concrete type a binding's provider produces.
    ImplementationType
);

impl From<ImplementationType> for ServiceType {
    fn from(implementation: ImplementationType) -> Self {
        Self {
            id: implementation.id,
            name: implementation.name,
        }
    }
}
