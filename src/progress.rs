use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rustc_hash::FxHashSet;
use tracing::info;

use crate::error::Error;
use crate::invocation::Invocation;
use crate::observer::{Observer, Status};
use crate::value::Value;

/// The placeholder a target returns to receive the path of the cache file.
pub const CACHE_FILE: &str = "*cache*";

/// Reports build progress and remembers which calls are in flight.
///
/// Each executed call is reported, and each cached call is reported the first
/// time it is seen. Nested calls are indented.
#[derive(Clone)]
pub struct Progress(Rc<State>);

struct State {
    /// Replaces the `CACHE_FILE` placeholder.
    cache_file: PathBuf,
    /// Calls that were already reported as current.
    shown: RefCell<FxHashSet<Invocation>>,
    /// The calls in flight, outermost first.
    stack: RefCell<Vec<Invocation>>,
    /// The calls the most recent error escaped through, innermost first.
    unwound: RefCell<Vec<Invocation>>,
    /// The depth and message of the most recent failure, while nothing else
    /// has happened since.
    last_failure: RefCell<Option<(usize, String)>>,
    /// How many calls were reported in total.
    reported: Cell<usize>,
}

impl Progress {
    /// Create a reporter for a build whose cache lives at `cache_file`.
    pub fn new(cache_file: impl Into<PathBuf>) -> Self {
        Self(Rc::new(State {
            cache_file: cache_file.into(),
            shown: RefCell::default(),
            stack: RefCell::default(),
            unwound: RefCell::default(),
            last_failure: RefCell::default(),
            reported: Cell::new(0),
        }))
    }

    /// The calls an error escaped through, outermost first, preceded by the
    /// calls that are still in flight.
    ///
    /// Failures that a caller recovered from are not part of the trace. The
    /// record is cleared.
    pub fn take_trace(&self) -> Vec<Invocation> {
        let mut unwound = std::mem::take(&mut *self.0.unwound.borrow_mut());
        unwound.reverse();
        self.0.last_failure.take();
        let stack = std::mem::take(&mut *self.0.stack.borrow_mut());
        stack.into_iter().chain(unwound).collect()
    }

    /// How many lines were reported.
    pub fn reported(&self) -> usize {
        self.0.reported.get()
    }

    /// The path that replaces the `CACHE_FILE` placeholder.
    pub fn cache_file(&self) -> &Path {
        &self.0.cache_file
    }

    /// Forget failures that cannot be part of an escaping error anymore.
    fn settle(&self) {
        self.0.last_failure.take();
        if self.0.stack.borrow().is_empty() {
            self.0.unwound.borrow_mut().clear();
        }
    }
}

impl Observer for Progress {
    fn start(&self, status: Status, target: &str, args: &[Value]) {
        self.settle();
        let call = Invocation::from_parts(target, args.to_vec());
        let fresh = status != Status::Current || self.0.shown.borrow_mut().insert(call.clone());
        if fresh {
            let indent = self.0.stack.borrow().len() * 2;
            info!("[{status:<7}]  {:indent$}{call}", "");
            self.0.reported.set(self.0.reported.get() + 1);
        }
        self.0.stack.borrow_mut().push(call);
    }

    fn end(&self, _: Status, _: &str, _: &[Value], value: Value) -> Value {
        self.0.stack.borrow_mut().pop();
        self.settle();
        match value {
            Value::Path(path) if path.as_os_str() == CACHE_FILE => {
                Value::Path(self.0.cache_file.clone())
            }
            value => value,
        }
    }

    fn fail(&self, _: Status, _: &str, _: &[Value], error: &Error) {
        let mut stack = self.0.stack.borrow_mut();
        let Some(call) = stack.pop() else { return };
        let depth = stack.len();
        let message = error.to_string();

        // The error escapes further only if it comes straight from the
        // callee that failed last.
        let mut last = self.0.last_failure.borrow_mut();
        let mut unwound = self.0.unwound.borrow_mut();
        let propagated = last.as_ref().is_some_and(|(d, m)| *d == depth + 1 && *m == message);
        if !propagated {
            unwound.clear();
        }
        unwound.push(call);
        *last = Some((depth, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_cache_file() {
        let progress = Progress::new("/tmp/.build.json");
        let value = progress.end(Status::New, "cache", &[], Value::Path(CACHE_FILE.into()));
        assert_eq!(value, Value::Path("/tmp/.build.json".into()));
        let value = progress.end(Status::New, "other", &[], Value::from("*cache*"));
        assert_eq!(value, Value::from("*cache*"));
    }

    #[test]
    fn test_reports_current_once() {
        let progress = Progress::new("c");
        for _ in 0..3 {
            progress.start(Status::Current, "a", &[]);
            progress.end(Status::Current, "a", &[], Value::Unit);
        }
        progress.start(Status::New, "b", &[]);
        progress.end(Status::New, "b", &[], Value::Unit);
        assert_eq!(progress.reported(), 2);
    }

    #[test]
    fn test_trace() {
        let progress = Progress::new("c");
        progress.start(Status::New, "outer", &[]);
        progress.start(Status::Stale, "inner", &[Value::Int(1)]);
        let trace = progress.take_trace();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[1].to_string(), "inner 1");
        assert!(progress.take_trace().is_empty());
    }

    #[test]
    fn test_recovered_failure_is_not_traced() {
        let progress = Progress::new("c");
        let failed = |n: i64| Error::UnknownTarget(n.to_string());
        let broken = |n: i64| [Value::Int(n)];

        progress.start(Status::New, "outer", &[]);
        progress.start(Status::New, "broken", &broken(1));
        progress.fail(Status::New, "broken", &broken(1), &failed(1));
        progress.start(Status::New, "broken", &broken(2));
        progress.fail(Status::New, "broken", &broken(2), &failed(2));
        progress.fail(Status::New, "outer", &[], &failed(2));
        assert!(progress.0.stack.borrow().is_empty());

        let trace: Vec<String> = progress.take_trace().iter().map(ToString::to_string).collect();
        assert_eq!(trace, ["outer", "broken 2"]);
    }

    #[test]
    fn test_failure_after_recovery_starts_a_new_trace() {
        let progress = Progress::new("c");
        progress.start(Status::New, "outer", &[]);
        progress.start(Status::New, "inner", &[]);
        progress.fail(Status::New, "inner", &[], &Error::UnknownTarget("x".into()));
        progress.fail(Status::New, "outer", &[], &Error::UnknownTarget("y".into()));

        let trace: Vec<String> = progress.take_trace().iter().map(ToString::to_string).collect();
        assert_eq!(trace, ["outer"]);
    }
}
