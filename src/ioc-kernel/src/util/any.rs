use std::any::{self, Any};
use std::ops::{Deref, DerefMut};

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    #[inline]
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    #[inline]
    fn type_name(&self) -> &'static str {
        any::type_name::<T>()
    }
}

pub trait DowncastRef {
    fn is<T: Any>(&self) -> bool;

    fn downcast_ref<T: Any>(&self) -> Option<&T>;
}

impl<S> DowncastRef for S
where
    S: Deref<Target: AsAny>,
{
    #[inline]
    fn is<T: Any>(&self) -> bool {
        (**self).as_any().is::<T>()
    }

    #[inline]
    fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (**self).as_any().downcast_ref::<T>()
    }
}

pub trait DowncastMut: DowncastRef {
    fn downcast_mut<T: Any>(&mut self) -> Option<&mut T>;
}

impl<S> DowncastMut for S
where
    S: DerefMut<Target: AsAny>,
{
    #[inline]
    fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        (**self).as_any_mut().downcast_mut::<T>()
    }
}

pub trait Downcast: DowncastMut + Sized {
    type Output<T>;

    fn downcast<T: Any>(self) -> Result<Self::Output<T>, Self>;
}

impl<S> Downcast for Box<S>
where
    S: AsAny + ?Sized,
{
    type Output<T> = Box<T>;

    fn downcast<T: Any>(self) -> Result<Self::Output<T>, Self> {
        if self.is::<T>() {
            let res = self
                .into_any()
                .downcast::<T>()
                .unwrap_or_else(|_| std::unreachable!("`self` should be `Box<T>`"));
            Ok(res)
        } else {
            Err(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::kernel::Managed;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Gauge {
        level: u8,
    }

    #[test]
    fn downcast_succeeds_on_borrowed_object() {
        let mut gauge = Gauge { level: 0 };
        let mut object: &mut dyn Managed = &mut gauge;

        assert_eq!(object.downcast_ref::<Gauge>(), Some(&Gauge { level: 0 }));
        object.downcast_mut::<Gauge>().unwrap().level = 3;
        assert_eq!(object.downcast_ref::<Gauge>().map(|g| g.level), Some(3));
        assert!((*object).type_name().ends_with("Gauge"));
    }

    #[test]
    fn downcast_succeeds_on_boxed_object() {
        let mut object: Box<dyn Managed> = Box::new(Gauge { level: 1 });
        object.downcast_mut::<Gauge>().unwrap().level = 2;

        let gauge = object.downcast::<Gauge>().map(|g| g.level);
        assert_eq!(gauge.ok(), Some(2));
    }

    #[test]
    fn downcast_fails_when_type_differs() {
        let object: Box<dyn Managed> = Box::new(Gauge { level: 0 });
        assert!(!object.is::<u8>());

        let object = object.downcast::<u8>().unwrap_err();
        assert!(object.is::<Gauge>());
    }
}
