use std::any::{self, Any};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use snafu::prelude::*;

use crate::interception::{Interceptor, MethodId};
use crate::kernel::context::Context;
use crate::kernel::registry::BindingId;
use crate::kernel::Instance;
use crate::planning::BoxError;
use crate::service::ServiceType;

pub type ReturnValue = Box<dyn Any + Send>;

type TargetFn<'a> = Box<dyn FnOnce(&mut Request) -> Result<ReturnValue, BoxError> + 'a>;

/// One intercepted call.
pub struct Request {
    context: Option<Arc<Context>>,
    binding: Option<BindingId>,
    target: Instance,
    method: MethodId,
    arguments: Vec<Box<dyn Any + Send>>,
    generic_arguments: Vec<ServiceType>,
}

impl Request {
    pub fn new(
        context: Option<Arc<Context>>,
        target: Instance,
        method: MethodId,
        arguments: Vec<Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            context,
            binding: None,
            target,
            method,
            arguments,
            generic_arguments: Vec::new(),
        }
    }

    pub fn with_binding(mut self, binding: BindingId) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_generic_arguments(mut self, generic_arguments: Vec<ServiceType>) -> Self {
        self.generic_arguments = generic_arguments;
        self
    }

    /// The context the intercepted instance was activated in, if it is still
    /// alive.
    pub fn context(&self) -> Option<&Arc<Context>> {
        self.context.as_ref()
    }

    /// The binding the intercepted instance was activated through. Unlike
    /// the context, it is known for the whole life of the instance.
    pub fn binding(&self) -> Option<BindingId> {
        self.binding
    }

    pub fn target(&self) -> &Instance {
        &self.target
    }

    pub fn method(&self) -> &MethodId {
        &self.method
    }

    pub fn arguments_len(&self) -> usize {
        self.arguments.len()
    }

    pub fn argument<T>(&self, index: usize) -> Option<&T>
    where
        T: Any,
    {
        self.arguments.get(index)?.downcast_ref()
    }

    pub fn argument_mut<T>(&mut self, index: usize) -> Option<&mut T>
    where
        T: Any,
    {
        self.arguments.get_mut(index)?.downcast_mut()
    }

    /// Takes an argument out, typically in the target method. Returns `None`
    /// if the argument has another type or was taken already.
    pub fn take_argument<T>(&mut self, index: usize) -> Option<T>
    where
        T: Any + Send,
    {
        let slot = self.arguments.get_mut(index)?;
        if !slot.is::<T>() {
            return None;
        }
        let taken = std::mem::replace(slot, Box::new(()));
        taken.downcast::<T>().ok().map(|value| *value)
    }

    pub fn generic_arguments(&self) -> &[ServiceType] {
        &self.generic_arguments
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Request")
            .field("binding", &self.binding)
            .field("target", &self.target)
            .field("method", &self.method)
            .field("arguments", &self.arguments.len())
            .field("generic_arguments", &self.generic_arguments)
            .finish_non_exhaustive()
    }
}

/// The execution of one intercepted call.
///
/// Every [`Invocation::proceed`] runs the next interceptor, and once they are
/// exhausted the real target. The target runs at most once: an invocation
/// cannot be replayed.
pub struct Invocation<'a> {
    request: Request,
    interceptors: Vec<Arc<dyn Interceptor>>,
    cursor: usize,
    target: Option<TargetFn<'a>>,
    return_value: Option<ReturnValue>,
}

impl<'a> Invocation<'a> {
    pub fn new<F>(request: Request, interceptors: Vec<Arc<dyn Interceptor>>, target: F) -> Self
    where
        F: FnOnce(&mut Request) -> Result<ReturnValue, BoxError> + 'a,
    {
        Self {
            request,
            interceptors,
            cursor: 0,
            target: Some(Box::new(target)),
            return_value: None,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn method(&self) -> &MethodId {
        self.request.method()
    }

    pub fn interceptors_len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn return_value(&self) -> Option<&ReturnValue> {
        self.return_value.as_ref()
    }

    pub fn return_value_as<T>(&self) -> Option<&T>
    where
        T: Any,
    {
        self.return_value.as_ref()?.downcast_ref()
    }

    pub fn set_return_value<T>(&mut self, value: T)
    where
        T: Any + Send,
    {
        self.return_value = Some(Box::new(value));
    }

    pub fn take_return_value(&mut self) -> Option<ReturnValue> {
        self.return_value.take()
    }

    /// Runs the next interceptor, or the target once every interceptor ran.
    pub fn proceed(&mut self) -> Result<(), InterceptionError> {
        if let Some(interceptor) = self.interceptors.get(self.cursor).cloned() {
            self.cursor += 1;
            return interceptor.intercept(self);
        }

        let target = self.target.take().context(AlreadyConsumedSnafu {
            method: self.request.method.clone(),
        })?;
        let value = target(&mut self.request).context(TargetSnafu {
            method: self.request.method.clone(),
        })?;
        self.return_value = Some(value);
        Ok(())
    }

    /// Runs the whole chain and returns what ended up as the return value.
    pub fn run(mut self) -> Result<ReturnValue, InterceptionError> {
        self.proceed()?;
        self.return_value.context(MissingReturnValueSnafu {
            method: self.request.method,
        })
    }

    pub fn run_as<T>(self) -> Result<T, InterceptionError>
    where
        T: Any,
    {
        let method = self.request.method.clone();
        let value = self.run()?;
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| InterceptionError::ReturnTypeMismatch {
                method,
                expected: any::type_name::<T>(),
            })
    }
}

impl Debug for Invocation<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Invocation")
            .field("request", &self.request)
            .field("interceptors", &self.interceptors.len())
            .field("cursor", &self.cursor)
            .field("consumed", &self.target.is_none())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum InterceptionError {
    #[snafu(display("the invocation of {method} has already reached its target"))]
    #[non_exhaustive]
    AlreadyConsumed { method: MethodId },
    #[snafu(display("the target {method} failed"))]
    #[non_exhaustive]
    Target { method: MethodId, source: BoxError },
    #[snafu(display("an interceptor of {method} failed"))]
    #[non_exhaustive]
    Interceptor { method: MethodId, source: BoxError },
    #[snafu(display("the invocation of {method} finished without a return value"))]
    #[non_exhaustive]
    MissingReturnValue { method: MethodId },
    #[snafu(display("the invocation of {method} did not return a {expected}"))]
    #[non_exhaustive]
    ReturnTypeMismatch {
        method: MethodId,
        expected: &'static str,
    },
}

impl InterceptionError {
    /// Wraps an error raised by an interceptor.
    pub fn interceptor<E>(method: &MethodId, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Interceptor {
            method: method.clone(),
            source: err.into(),
        }
    }
}
