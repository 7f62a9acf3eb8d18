use std::fmt::{self, Display, Formatter};

use crate::error::Error;
use crate::value::Value;

/// The cache status of a target call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    /// There is no cached result, the target must be executed.
    New,
    /// The cached result was invalidated, the target must be executed.
    Stale,
    /// The cached result is valid and is returned without executing the
    /// target.
    Current,
}

impl Status {
    /// The lowercase name of the status.
    pub fn name(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Stale => "stale",
            Self::Current => "current",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Gets notified about every target call.
///
/// `start` happens for every call, including ones served from the cache. It is
/// followed by `end` when the call produced a value and by `fail` when it
/// returned an error.
pub trait Observer {
    /// A target is about to run or be served from the cache.
    fn start(&self, status: Status, target: &str, args: &[Value]) {
        let _ = (status, target, args);
    }

    /// A target has produced `value`. The returned value is what the caller
    /// receives (and, for executed targets, what is cached).
    fn end(&self, status: Status, target: &str, args: &[Value], value: Value) -> Value {
        let _ = (status, target, args);
        value
    }

    /// A target has returned `error` instead of a value.
    fn fail(&self, status: Status, target: &str, args: &[Value], error: &Error) {
        let _ = (status, target, args, error);
    }
}

/// Observes nothing.
impl Observer for () {}
