/*!
Incremental builds through dependency-tracked memoization.

A build is a set of _targets_: functions that may call each other and may
declare dependencies on external state such as files. Every target call is
memoized by its name and arguments. When a target declares a dependency with
[`Memo::depends_on`], the dependency is attributed to the call and, when the
call returns, to every call it was nested in. On a later run a cached result is
reused as long as none of the resources it (transitively) depended on report a
modification.

```
use jam::{target, Memo, Result};

#[target]
fn fib(memo: &Memo, x: i64) -> Result<i64> {
    Ok(if x < 2 { x } else { fib(memo, x - 1)? + fib(memo, x - 2)? })
}

let memo = Memo::new();
assert_eq!(fib(&memo, 50).unwrap(), 12586269025);

// Every distinct call was executed exactly once.
assert_eq!(memo.cache().len(), 51);
```

# Dependencies
Inside a target, `memo.depends_on(resource)` records that the target's result
is only valid as long as `resource` is not modified. Dependencies bubble up:
the caller of a dependent target is dependent, too. Additionally, a target
with parameters inherits the dependencies its caller has accumulated up to the
point of the call, while a target without parameters starts with none. A
parameterless target can only vary with the state it declares itself, but a
target with parameters is often a helper threaded through dependent calls.

# Persistence
The [`codec`] module persists a cache between runs. Only records made of
encodable values, that is no [`Opaque`] values and only [`Durable`] resources,
are written. The [`BuildController`] drives all of this from the command line.
*/

mod cache;
pub mod codec;
mod controller;
mod error;
mod frame;
pub mod fs;
mod hash;
mod invocation;
pub mod logging;
mod memo;
mod mutable;
mod observer;
mod progress;
mod registry;
mod value;

pub use crate::cache::{Cache, Record};
pub use crate::controller::{BuildController, Cli, Failure, Outcome, Phase};
pub use crate::error::{Error, Result, ValueError};
pub use crate::frame::{Frame, Frames};
pub use crate::invocation::{Invocation, Target};
pub use crate::memo::Memo;
pub use crate::mutable::{Decoders, Durable, Mutable, Resource, Snapshot};
pub use crate::observer::{Observer, Status};
pub use crate::progress::{CACHE_FILE, Progress};
pub use crate::registry::Targets;
pub use crate::value::{Opaque, Value};

/// Turn a function into a memoized target.
///
/// The first parameter must be the `&Memo` the target runs in; all other
/// parameters are the target's arguments and must be `Clone + Into<Value>`.
/// The function must return a [`Result`] whose value converts to and from a
/// [`Value`].
///
/// ```
/// use jam::{target, Memo, Result};
///
/// #[target]
/// fn greeting(memo: &Memo, name: String) -> Result<String> {
///     Ok(format!("Hello, {name}!"))
/// }
/// ```
///
/// With `#[target(variadic)]`, the last parameter is a `Vec` whose elements
/// count as individual arguments: the call `join(memo, vec![a, b, c])` has the
/// same key as an untyped invocation of `join` with the arguments `a, b, c`.
#[cfg(feature = "macros")]
pub use jam_macros::target;

/// These are implementation details. Do not rely on them!
#[doc(hidden)]
pub mod internal {
    use crate::value::Value;

    /// Convert an argument for use in an invocation key.
    pub fn to_value<T: Clone + Into<Value>>(arg: &T) -> Value {
        arg.clone().into()
    }
}
