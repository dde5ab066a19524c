//! Best-effort conversions applied to inline arguments whose type differs
//! from the injection target.

use std::fmt::Debug;
use std::sync::Arc;

use crate::kernel::Instance;
use crate::service::ServiceType;

pub trait Coercer: Debug + Send + Sync + 'static {
    /// Converts `value` into an instance of `target`. Returns `None` if no
    /// conversion exists or the value doesn't fit.
    fn coerce(&self, value: &Instance, target: ServiceType) -> Option<Instance>;
}

/// Converts between the primitive integer types, `f32`, `f64`, `bool` and
/// `String`.
///
/// Integers convert only when the value fits, floats convert to integers only
/// when they have no fraction, and strings are parsed.
#[derive(Debug, Default)]
pub struct StandardCoercer;

enum Scalar {
    Int(i128),
    Float(f64),
    Bool(bool),
    Text(Arc<String>),
}

macro_rules! read_scalar {
    ($value:expr, int: [$($int:ty),*], float: [$($float:ty),*]) => {{
        $(
            if let Some(v) = $value.downcast::<$int>() {
                return Some(Scalar::Int(*v as i128));
            }
        )*
        $(
            if let Some(v) = $value.downcast::<$float>() {
                return Some(Scalar::Float(f64::from(*v)));
            }
        )*
    }};
}

fn read(value: &Instance) -> Option<Scalar> {
    read_scalar!(
        value,
        int: [i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize],
        float: [f32, f64]
    );
    if let Some(v) = value.downcast::<bool>() {
        return Some(Scalar::Bool(*v));
    }
    value.downcast::<String>().map(Scalar::Text)
}

fn float_to_int(value: f64) -> Option<i128> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < 1e38).then_some(value as i128)
}

macro_rules! write_int {
    ($scalar:expr, $target:expr, [$($int:ty),*]) => {
        $(
            if $target.is::<$int>() {
                let value = match $scalar {
                    Scalar::Int(v) => <$int>::try_from(*v).ok(),
                    Scalar::Float(v) => float_to_int(*v).and_then(|v| <$int>::try_from(v).ok()),
                    Scalar::Bool(v) => Some(<$int>::from(*v)),
                    Scalar::Text(v) => v.trim().parse::<$int>().ok(),
                };
                return value.map(Instance::from_value);
            }
        )*
    };
}

macro_rules! write_float {
    ($scalar:expr, $target:expr, [$($float:ty),*]) => {
        $(
            if $target.is::<$float>() {
                let value = match $scalar {
                    Scalar::Int(v) => Some(*v as $float),
                    Scalar::Float(v) => Some(*v as $float),
                    Scalar::Bool(_) => None,
                    Scalar::Text(v) => v.trim().parse::<$float>().ok(),
                };
                return value.map(Instance::from_value);
            }
        )*
    };
}

fn write(scalar: &Scalar, target: ServiceType) -> Option<Instance> {
    write_int!(
        scalar,
        target,
        [i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize]
    );
    write_float!(scalar, target, [f32, f64]);

    if target.is::<bool>() {
        let value = match scalar {
            Scalar::Int(0) => Some(false),
            Scalar::Int(1) => Some(true),
            Scalar::Bool(v) => Some(*v),
            Scalar::Text(v) => v.trim().parse().ok(),
            _ => None,
        };
        return value.map(Instance::from_value);
    }

    if target.is::<String>() {
        let value = match scalar {
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Bool(v) => v.to_string(),
            Scalar::Text(v) => String::clone(v),
        };
        return Some(Instance::from_value(value));
    }

    None
}

impl Coercer for StandardCoercer {
    fn coerce(&self, value: &Instance, target: ServiceType) -> Option<Instance> {
        if value.service_type() == target {
            return Some(value.clone());
        }
        let coerced = write(&read(value)?, target);
        tracing::trace!(
            from = %value.service_type(),
            to = %target,
            coerced = coerced.is_some(),
            "coerced value",
        );
        coerced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coerce<T>(value: Instance) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        StandardCoercer
            .coerce(&value, ServiceType::of::<T>())
            .map(|instance| instance.downcast::<T>().unwrap())
    }

    #[test]
    fn standard_coercer_converts_between_numbers() {
        assert_eq!(*coerce::<u16>(Instance::from_value(8080i64)).unwrap(), 8080);
        assert_eq!(*coerce::<f64>(Instance::from_value(3u8)).unwrap(), 3.0);
        assert_eq!(*coerce::<i32>(Instance::from_value(2.0f32)).unwrap(), 2);
        assert!(coerce::<i32>(Instance::from_value(2.5f64)).is_none());
        assert!(coerce::<u8>(Instance::from_value(300u32)).is_none());
        assert!(coerce::<u32>(Instance::from_value(-1i32)).is_none());
    }

    #[test]
    fn standard_coercer_parses_and_formats_strings() {
        assert_eq!(
            *coerce::<u16>(Instance::from_value(String::from(" 443 "))).unwrap(),
            443
        );
        assert!(*coerce::<bool>(Instance::from_value(String::from("true"))).unwrap());
        assert_eq!(
            *coerce::<String>(Instance::from_value(42u8)).unwrap(),
            "42"
        );
        assert!(coerce::<u16>(Instance::from_value(String::from("port"))).is_none());
    }

    #[test]
    fn standard_coercer_converts_bool() {
        assert!(*coerce::<bool>(Instance::from_value(1u8)).unwrap());
        assert_eq!(*coerce::<u8>(Instance::from_value(true)).unwrap(), 1);
        assert!(coerce::<bool>(Instance::from_value(2u8)).is_none());
        assert!(coerce::<f32>(Instance::from_value(true)).is_none());
    }

    #[test]
    fn standard_coercer_fails_when_type_is_unknown() {
        struct Opaque;
        assert!(coerce::<u8>(Instance::from_value(Opaque)).is_none());
        assert!(coerce::<Opaque>(Instance::from_value(1u8)).is_none());
    }
}
