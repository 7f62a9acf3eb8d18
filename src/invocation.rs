use std::fmt::{self, Display, Formatter};

use crate::hash::hash;
use crate::value::Value;

/// The signature of a target.
///
/// Usually generated by [`#[target]`](macro@crate::target) as a `static` next
/// to the target's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    /// The name that identifies the target in the cache.
    pub name: &'static str,
    /// The number of declared parameters.
    pub params: usize,
    /// Whether the last parameter collects a variable number of arguments.
    pub variadic: bool,
}

impl Target {
    /// A target with a fixed number of parameters.
    pub const fn new(name: &'static str, params: usize) -> Self {
        Self { name, params, variadic: false }
    }

    /// Mark the last parameter as variadic.
    pub const fn variadic(self) -> Self {
        Self { variadic: true, ..self }
    }

    /// Whether a call inherits the dependencies its caller has seen so far.
    ///
    /// Targets with parameters start from a copy of the caller's frame, those
    /// without start empty.
    pub fn inherits(&self) -> bool {
        self.params > 0
    }
}

/// The identity of a single target call: its name and arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Invocation {
    name: String,
    args: Vec<Value>,
}

impl Invocation {
    /// The key of a call to `target`.
    ///
    /// For variadic targets the trailing list is flattened, so that
    /// `f(a, [b, c])` and `f([a, b, c])` produce the same key.
    pub fn new(target: &Target, mut args: Vec<Value>) -> Self {
        if target.variadic {
            if let Some(Value::List(_)) = args.last() {
                if let Some(Value::List(rest)) = args.pop() {
                    args.extend(rest);
                }
            }
        }
        Self::from_parts(target.name, args)
    }

    /// A key from an already normalized argument list.
    pub fn from_parts(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self { name: name.into(), args }
    }

    /// The name of the invoked target.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The arguments of the call.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Whether any argument is a resource that has been modified.
    pub fn modified(&self) -> bool {
        self.args
            .iter()
            .filter_map(Value::as_resource)
            .any(|resource| resource.modified())
    }

    /// Whether all arguments can be persisted.
    pub fn encodable(&self) -> bool {
        self.args.iter().all(Value::encodable)
    }

    /// A 128-bit hash of the key.
    pub fn fingerprint(&self) -> u128 {
        hash(self)
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
