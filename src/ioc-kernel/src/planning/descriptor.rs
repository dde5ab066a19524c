//! Type metadata consumed by the planner.
//!
//! A [`TypeDescriptor`] lists the constructors and injectable members of an
//! implementation type together with the markers attached to them. It is
//! normally generated by `#[injectable]`, but can be written by hand with
//! [`TypeDescriptor::builder`].

use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use snafu::prelude::*;

use crate::behavior::LifecyclePolicy;
use crate::kernel::{Instance, Managed};
use crate::service::{ImplementationType, ServiceType};

pub type BoxError = Box<dyn Error + Send + Sync>;

pub(crate) type ConstructorFn =
    Arc<dyn Fn(ArgumentValues) -> Result<Box<dyn Managed>, BoxError> + Send + Sync>;

pub(crate) type MemberFn =
    Arc<dyn Fn(&mut dyn Any, ArgumentValues) -> Result<(), BoxError> + Send + Sync>;

pub(crate) type HookFn = Arc<dyn Fn(&dyn Any) -> Result<(), BoxError> + Send + Sync>;

/// A type whose metadata can be described to the planner.
pub trait Injectable: Managed + Sized {
    fn describe() -> TypeDescriptor;
}

/// Looks up the descriptor of an implementation type.
pub trait TypeInspector: Send + Sync + 'static {
    fn inspect(&self, implementation: ImplementationType) -> Option<Arc<TypeDescriptor>>;
}

/// A [`TypeInspector`] backed by descriptors registered up front.
#[derive(Debug, Default)]
pub struct DescriptorCatalog {
    descriptors: HashMap<ImplementationType, Arc<TypeDescriptor>>,
}

impl DescriptorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, keeping the first one registered for a type.
    pub fn insert(&mut self, descriptor: TypeDescriptor) -> bool {
        let implementation = descriptor.implementation();
        if self.descriptors.contains_key(&implementation) {
            false
        } else {
            self.descriptors
                .insert(implementation, Arc::new(descriptor));
            true
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl TypeInspector for DescriptorCatalog {
    fn inspect(&self, implementation: ImplementationType) -> Option<Arc<TypeDescriptor>> {
        self.descriptors.get(&implementation).cloned()
    }
}

/// A constructor or member parameter as declared on the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    name: &'static str,
    service: ServiceType,
    optional: bool,
}

impl TargetDescriptor {
    pub fn new(name: &'static str, service: ServiceType, optional: bool) -> Self {
        Self {
            name,
            service,
            optional,
        }
    }

    pub fn required<S>(name: &'static str) -> Self
    where
        S: ?Sized + 'static,
    {
        Self::new(name, ServiceType::of::<S>(), false)
    }

    pub fn optional<S>(name: &'static str) -> Self
    where
        S: ?Sized + 'static,
    {
        Self::new(name, ServiceType::of::<S>(), true)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

#[derive(Clone)]
pub struct ConstructorDescriptor {
    name: &'static str,
    targets: Vec<TargetDescriptor>,
    injection_marker: bool,
    invoke: ConstructorFn,
}

impl ConstructorDescriptor {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn targets(&self) -> &[TargetDescriptor] {
        &self.targets
    }

    /// Whether the constructor is marked as the one to inject through.
    pub fn has_injection_marker(&self) -> bool {
        self.injection_marker
    }

    pub(crate) fn invoker(&self) -> &ConstructorFn {
        &self.invoke
    }
}

impl Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConstructorDescriptor")
            .field("name", &self.name)
            .field("targets", &self.targets)
            .field("injection_marker", &self.injection_marker)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Property,
    Method,
    Field,
}

#[derive(Clone)]
pub struct MemberDescriptor {
    kind: MemberKind,
    name: &'static str,
    targets: Vec<TargetDescriptor>,
    injection_marker: bool,
    inject: MemberFn,
}

impl MemberDescriptor {
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn targets(&self) -> &[TargetDescriptor] {
        &self.targets
    }

    pub fn has_injection_marker(&self) -> bool {
        self.injection_marker
    }

    pub(crate) fn injector(&self) -> &MemberFn {
        &self.inject
    }
}

impl Debug for MemberDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MemberDescriptor")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("targets", &self.targets)
            .field("injection_marker", &self.injection_marker)
            .finish_non_exhaustive()
    }
}

/// Marks a method as intercepted by the interceptor registered under
/// `interceptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorMarker {
    method: &'static str,
    interceptor: &'static str,
    order: i32,
}

impl InterceptorMarker {
    pub fn new(method: &'static str, interceptor: &'static str, order: i32) -> Self {
        Self {
            method,
            interceptor,
            order,
        }
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn interceptor(&self) -> &'static str {
        self.interceptor
    }

    pub fn order(&self) -> i32 {
        self.order
    }
}

#[derive(Clone, Default)]
pub struct LifecycleHooks {
    start: Option<HookFn>,
    stop: Option<HookFn>,
    dispose: Option<HookFn>,
}

impl LifecycleHooks {
    pub(crate) fn start(&self) -> Option<&HookFn> {
        self.start.as_ref()
    }

    pub(crate) fn stop(&self) -> Option<&HookFn> {
        self.stop.as_ref()
    }

    pub(crate) fn dispose(&self) -> Option<&HookFn> {
        self.dispose.as_ref()
    }
}

impl Debug for LifecycleHooks {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("LifecycleHooks")
            .field("start", &self.start.is_some())
            .field("stop", &self.stop.is_some())
            .field("dispose", &self.dispose.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    implementation: ImplementationType,
    constructible: bool,
    constructors: Vec<ConstructorDescriptor>,
    members: Vec<MemberDescriptor>,
    interceptors: Vec<InterceptorMarker>,
    lifecycle: Option<LifecyclePolicy>,
    hooks: LifecycleHooks,
}

impl TypeDescriptor {
    pub fn builder<T>() -> DescriptorBuilder<T>
    where
        T: Managed,
    {
        DescriptorBuilder::new()
    }

    /// A descriptor for a type the kernel never constructs itself, such as a
    /// constant or the output of a factory method.
    pub fn opaque(implementation: ImplementationType) -> Self {
        Self {
            implementation,
            constructible: false,
            constructors: Vec::new(),
            members: Vec::new(),
            interceptors: Vec::new(),
            lifecycle: None,
            hooks: LifecycleHooks::default(),
        }
    }

    pub fn implementation(&self) -> ImplementationType {
        self.implementation
    }

    pub fn is_constructible(&self) -> bool {
        self.constructible
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    pub fn interceptors(&self) -> &[InterceptorMarker] {
        &self.interceptors
    }

    pub fn lifecycle(&self) -> Option<&LifecyclePolicy> {
        self.lifecycle.as_ref()
    }

    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }
}

/// Builds a [`TypeDescriptor`] for `T` from typed closures.
pub struct DescriptorBuilder<T>
where
    T: Managed,
{
    descriptor: TypeDescriptor,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> DescriptorBuilder<T>
where
    T: Managed,
{
    fn new() -> Self {
        let mut descriptor = TypeDescriptor::opaque(ImplementationType::of::<T>());
        descriptor.constructible = true;
        Self {
            descriptor,
            _marker: std::marker::PhantomData,
        }
    }

    /// Adds a constructor. `marked` sets the injection marker.
    pub fn constructor<F, E>(
        mut self,
        name: &'static str,
        targets: Vec<TargetDescriptor>,
        marked: bool,
        constructor: F,
    ) -> Self
    where
        F: Fn(ArgumentValues) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let invoke: ConstructorFn = Arc::new(move |arguments| {
            constructor(arguments)
                .map(|object| -> Box<dyn Managed> { Box::new(object) })
                .map_err(Into::into)
        });
        self.descriptor.constructors.push(ConstructorDescriptor {
            name,
            targets,
            injection_marker: marked,
            invoke,
        });
        self
    }

    pub fn property<F, E>(self, name: &'static str, target: TargetDescriptor, setter: F) -> Self
    where
        F: Fn(&mut T, ArgumentValues) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.member(MemberKind::Property, name, vec![target], true, setter)
    }

    pub fn method<F, E>(self, name: &'static str, targets: Vec<TargetDescriptor>, method: F) -> Self
    where
        F: Fn(&mut T, ArgumentValues) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.member(MemberKind::Method, name, targets, true, method)
    }

    pub fn field<F, E>(self, name: &'static str, target: TargetDescriptor, setter: F) -> Self
    where
        F: Fn(&mut T, ArgumentValues) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.member(MemberKind::Field, name, vec![target], true, setter)
    }

    /// Adds a member with an explicit injection marker. Members without the
    /// marker are described but never injected.
    pub fn member<F, E>(
        mut self,
        kind: MemberKind,
        name: &'static str,
        targets: Vec<TargetDescriptor>,
        marked: bool,
        inject: F,
    ) -> Self
    where
        F: Fn(&mut T, ArgumentValues) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let implementation = self.descriptor.implementation;
        let inject: MemberFn = Arc::new(move |object, arguments| {
            let object = object.downcast_mut::<T>().context(ObjectMismatchSnafu {
                member: name,
                expected: implementation,
            })?;
            inject(object, arguments).map_err(Into::into)
        });
        self.descriptor.members.push(MemberDescriptor {
            kind,
            name,
            targets,
            injection_marker: marked,
            inject,
        });
        self
    }

    pub fn intercept(mut self, method: &'static str, interceptor: &'static str, order: i32) -> Self {
        self.descriptor
            .interceptors
            .push(InterceptorMarker::new(method, interceptor, order));
        self
    }

    pub fn lifecycle(mut self, policy: LifecyclePolicy) -> Self {
        self.descriptor.lifecycle = Some(policy);
        self
    }

    pub fn on_start<F, E>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.descriptor.hooks.start = Some(Self::hook(hook));
        self
    }

    pub fn on_stop<F, E>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.descriptor.hooks.stop = Some(Self::hook(hook));
        self
    }

    pub fn on_dispose<F, E>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.descriptor.hooks.dispose = Some(Self::hook(hook));
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }

    fn hook<F, E>(hook: F) -> HookFn
    where
        F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let implementation = ImplementationType::of::<T>();
        Arc::new(move |object| {
            let object = object.downcast_ref::<T>().context(ObjectMismatchSnafu {
                member: "lifecycle hook",
                expected: implementation,
            })?;
            hook(object).map_err(Into::into)
        })
    }
}

/// The resolved values handed to a constructor or member, in declaration
/// order. `None` stands for an optional dependency that could not be
/// resolved.
#[derive(Debug, Clone, Default)]
pub struct ArgumentValues {
    values: Vec<(&'static str, Option<Instance>)>,
}

impl ArgumentValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, value: Option<Instance>) {
        self.values.push((name, value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The required dependency at `index` as an `Arc<S>`.
    pub fn arc<S>(&self, index: usize) -> Result<Arc<S>, ArgumentError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.optional_arc(index)?.context(MissingSnafu {
            name: self.name(index),
        })
    }

    pub fn optional_arc<S>(&self, index: usize) -> Result<Option<Arc<S>>, ArgumentError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let (name, value) = self.values.get(index).context(OutOfRangeSnafu {
            index,
            len: self.values.len(),
        })?;
        match value {
            Some(value) => value.downcast::<S>().map(Some).context(TypeMismatchSnafu {
                name: *name,
                expected: ServiceType::of::<S>(),
                actual: value.service_type(),
            }),
            None => Ok(None),
        }
    }

    /// The required dependency at `index`, cloned out of its [`Arc`].
    pub fn value<T>(&self, index: usize) -> Result<T, ArgumentError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.arc::<T>(index).map(|value| T::clone(&value))
    }

    pub fn optional_value<T>(&self, index: usize) -> Result<Option<T>, ArgumentError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.optional_arc::<T>(index)
            .map(|value| value.map(|value| T::clone(&value)))
    }

    fn name(&self, index: usize) -> &'static str {
        self.values.get(index).map_or("<unknown>", |(name, _)| name)
    }
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ArgumentError {
    #[snafu(display("argument #{index} requested but only {len} were resolved"))]
    #[non_exhaustive]
    OutOfRange { index: usize, len: usize },
    #[snafu(display("argument `{name}` is required but no value was resolved"))]
    #[non_exhaustive]
    Missing { name: &'static str },
    #[snafu(display("argument `{name}` should be {expected} but is {actual}"))]
    #[non_exhaustive]
    TypeMismatch {
        name: &'static str,
        expected: ServiceType,
        actual: ServiceType,
    },
    #[snafu(display("{member} expects an object of {expected}"))]
    #[non_exhaustive]
    ObjectMismatch {
        member: &'static str,
        expected: ImplementationType,
    },
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    #[derive(Debug, Default)]
    struct Server {
        port: u16,
        host: Option<String>,
    }

    fn describe_server() -> TypeDescriptor {
        TypeDescriptor::builder::<Server>()
            .constructor(
                "new",
                vec![TargetDescriptor::required::<u16>("port")],
                true,
                |args| {
                    Ok::<_, ArgumentError>(Server {
                        port: args.value(0)?,
                        host: None,
                    })
                },
            )
            .property(
                "host",
                TargetDescriptor::optional::<String>("host"),
                |server: &mut Server, args| {
                    server.host = args.optional_value(0)?;
                    Ok::<_, ArgumentError>(())
                },
            )
            .build()
    }

    #[test]
    fn descriptor_builder_constructor_succeeds() {
        let descriptor = describe_server();
        assert!(descriptor.is_constructible());
        assert_eq!(descriptor.implementation(), ImplementationType::of::<Server>());

        let constructor = &descriptor.constructors()[0];
        assert!(constructor.has_injection_marker());

        let mut args = ArgumentValues::new();
        args.push("port", Some(Instance::from_value(8080u16)));
        let object = (constructor.invoker())(args).unwrap();
        let server = (*object).as_any().downcast_ref::<Server>().unwrap();
        assert_eq!(server.port, 8080);
    }

    #[test]
    fn descriptor_builder_member_succeeds() {
        let descriptor = describe_server();
        let member = &descriptor.members()[0];
        assert_eq!(member.kind(), MemberKind::Property);

        let mut server = Server::default();
        let mut args = ArgumentValues::new();
        args.push("host", Some(Instance::from_value(String::from("localhost"))));
        (member.injector())(&mut server, args).unwrap();
        assert_eq!(server.host.as_deref(), Some("localhost"));

        let mut args = ArgumentValues::new();
        args.push("host", None);
        (member.injector())(&mut server, args).unwrap();
        assert!(server.host.is_none());
    }

    #[test]
    fn descriptor_member_fails_when_object_type_differs() {
        let descriptor = describe_server();
        let member = &descriptor.members()[0];
        let mut other = 0u8;
        assert!((member.injector())(&mut other, ArgumentValues::new()).is_err());
    }

    #[test]
    fn argument_values_fails_when_type_or_value_is_wrong() {
        let mut args = ArgumentValues::new();
        args.push("port", Some(Instance::from_value("80")));
        args.push("host", None);

        assert!(matches!(
            args.value::<u16>(0),
            Err(ArgumentError::TypeMismatch { .. })
        ));
        assert!(matches!(
            args.arc::<String>(1),
            Err(ArgumentError::Missing { .. })
        ));
        assert!(matches!(
            args.arc::<String>(2),
            Err(ArgumentError::OutOfRange { .. })
        ));
    }

    #[test]
    fn descriptor_catalog_keeps_first_registration() {
        let mut catalog = DescriptorCatalog::new();
        assert!(catalog.insert(describe_server()));
        assert!(!catalog.insert(TypeDescriptor::builder::<Server>().build()));

        let descriptor = catalog
            .inspect(ImplementationType::of::<Server>())
            .unwrap();
        assert_eq!(descriptor.constructors().len(), 1);
        assert!(catalog.inspect(ImplementationType::of::<u8>()).is_none());
    }

    #[test]
    fn descriptor_hooks_succeeds() {
        let descriptor = TypeDescriptor::builder::<Server>()
            .on_start(|server: &Server| {
                assert_eq!(server.port, 1);
                Ok::<_, Infallible>(())
            })
            .build();
        let server = Server {
            port: 1,
            host: None,
        };
        assert!((descriptor.hooks().start().unwrap())(&server).is_ok());
        assert!(descriptor.hooks().stop().is_none());
    }
}
