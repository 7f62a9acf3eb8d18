use std::any::Any;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ValueError;
use crate::fs::{File, FileSet};
use crate::mutable::Resource;

/// An argument to or a result of a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Value {
    /// The result of a target that returns nothing.
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Str(String),
    Path(PathBuf),
    List(Vec<Value>),
    /// A reference to external state.
    Resource(Resource),
    /// Anything else. Never persisted.
    Opaque(Opaque),
}

impl Value {
    /// Wrap an arbitrary value.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Opaque::new(value))
    }

    /// Whether the value can be written to the persisted cache.
    pub fn encodable(&self) -> bool {
        match self {
            Self::Opaque(_) => false,
            Self::Resource(resource) => resource.snapshot().is_some(),
            Self::List(items) => items.iter().all(Self::encodable),
            _ => true,
        }
    }

    /// The resource this value refers to, if it is one.
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Self::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    /// A short name for the kind of value.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Path(_) => "path",
            Self::List(_) => "list",
            Self::Resource(_) => "resource",
            Self::Opaque(_) => "opaque",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ValueError {
        ValueError { expected, found: self.kind() }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Unit => f.pad("()"),
            Self::Bool(v) => Display::fmt(v, f),
            Self::Int(v) => Display::fmt(v, f),
            Self::Str(v) => write!(f, "'{v}'"),
            Self::Path(v) => Display::fmt(&v.display(), f),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    Display::fmt(item, f)?;
                }
                f.write_str("]")
            }
            Self::Resource(v) => Display::fmt(v, f),
            Self::Opaque(v) => Debug::fmt(v, f),
        }
    }
}

/// A value that is only meaningful inside the current process.
///
/// Compared and hashed by identity.
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Access the wrapped value.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Opaque {}

impl Hash for Opaque {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl Debug for Opaque {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.pad("Opaque(..)")
    }
}

/// Implement conversions between a Rust type and a `Value` variant.
macro_rules! convert {
    ($ty:ty, $variant:ident, $expected:literal) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        }

        impl TryFrom<Value> for $ty {
            type Error = ValueError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(other.mismatch($expected)),
                }
            }
        }
    };
}

convert!(bool, Bool, "bool");
convert!(i64, Int, "int");
convert!(String, Str, "string");
convert!(PathBuf, Path, "path");
convert!(Resource, Resource, "resource");
convert!(Opaque, Opaque, "opaque");

/// Implement conversions for integers that fit into an `i64`.
macro_rules! narrow {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::Int(v.into())
            }
        }

        impl TryFrom<Value> for $ty {
            type Error = ValueError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    Value::Int(v) => v
                        .try_into()
                        .map_err(|_| ValueError { expected: stringify!($ty), found: "int" }),
                    other => Err(other.mismatch(stringify!($ty))),
                }
            }
        }
    )*};
}

narrow!(i32, u32);

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Unit
    }
}

impl TryFrom<Value> for () {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Unit => Ok(()),
            other => Err(other.mismatch("unit")),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.into())
    }
}

impl From<&Path> for Value {
    fn from(v: &Path) -> Self {
        Self::Path(v.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T> TryFrom<Value> for Vec<T>
where
    T: TryFrom<Value, Error = ValueError>,
{
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::List(items) => items.into_iter().map(T::try_from).collect(),
            other => Err(other.mismatch("list")),
        }
    }
}

/// Implement conversions for a durable resource type.
macro_rules! resource {
    ($ty:ty, $expected:literal) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::Resource(v.into())
            }
        }

        impl TryFrom<Value> for $ty {
            type Error = ValueError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                value
                    .as_resource()
                    .and_then(Resource::downcast_ref::<$ty>)
                    .cloned()
                    .ok_or_else(|| value.mismatch($expected))
            }
        }
    };
}

resource!(File, "file");
resource!(FileSet, "file set");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodable() {
        assert!(Value::Unit.encodable());
        assert!(Value::from(vec!["a", "b"]).encodable());
        assert!(!Value::opaque(3u8).encodable());
        assert!(!Value::List(vec![Value::Int(1), Value::opaque(())]).encodable());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(i64::try_from(Value::from(7)), Ok(7));
        assert_eq!(u32::try_from(Value::Int(-1)), Err(ValueError { expected: "u32", found: "int" }));
        assert_eq!(String::try_from(Value::Int(1)), Err(ValueError { expected: "string", found: "int" }));
        assert_eq!(Vec::<String>::try_from(Value::from(vec!["x"])), Ok(vec!["x".to_string()]));
        assert_eq!(<()>::try_from(Value::Unit), Ok(()));
    }

    #[test]
    fn test_opaque_identity() {
        let a = Opaque::new(vec![1, 2, 3]);
        assert_eq!(a, a.clone());
        assert_ne!(a, Opaque::new(vec![1, 2, 3]));
        assert_eq!(a.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn test_display() {
        let value = Value::List(vec![Value::from("a"), Value::Int(2), Value::Unit]);
        assert_eq!(value.to_string(), "['a', 2, ()]");
    }
}
