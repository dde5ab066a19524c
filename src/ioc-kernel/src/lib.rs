#![allow(clippy::new_without_default)]

extern crate self as ioc_kernel;

pub mod activation;
pub mod behavior;
pub mod coercion;
pub mod interception;
pub mod kernel;
pub mod module;
pub mod planning;
pub mod provider;
pub mod service;
mod util;

pub use ioc_kernel_derive::injectable;

pub mod prelude {
    pub use crate::injectable;
    pub use crate::interception::{
        Dispatch, InterceptionError, InterceptorSource, Invocation, MatchRule,
    };
    pub use crate::kernel::context::Parameters;
    pub use crate::kernel::registry::{Configurer, RegistryError, TypedConfigurer};
    pub use crate::kernel::resolver::{ActivationError, TypedResolver};
    pub use crate::kernel::{Kernel, KernelSettings};
    pub use crate::module::{bind, Configuration, Module};
    pub use crate::planning::{Injectable, TypeDescriptor};
}
