use std::cell::{Ref, RefCell};

use tracing::{debug, trace};

use crate::cache::{Cache, Record};
use crate::error::{Error, Result, ValueError};
use crate::frame::Frames;
use crate::invocation::{Invocation, Target};
use crate::mutable::Resource;
use crate::observer::{Observer, Status};
use crate::value::Value;

/// Memoizes target calls and tracks what they depend on.
///
/// Every target receives the `Memo` it runs in. Calls to other targets go
/// through it, which is how results are reused and how dependencies declared
/// with [`depends_on`](Self::depends_on) bubble up to every caller.
///
/// A `Memo` is strictly single-threaded: one call is in flight at a time and
/// nested calls simply block their caller.
pub struct Memo {
    /// The memoized results.
    cache: RefCell<Cache>,
    /// The dependency frames of the calls currently in flight.
    frames: RefCell<Frames>,
    /// Gets notified about every call.
    observer: Box<dyn Observer>,
}

impl Memo {
    /// An empty memo without an observer.
    pub fn new() -> Self {
        Self::with_cache(Cache::new(), ())
    }

    /// An empty memo that reports to `observer`.
    pub fn with_observer(observer: impl Observer + 'static) -> Self {
        Self::with_cache(Cache::new(), observer)
    }

    /// A memo that starts from an existing cache.
    pub fn with_cache(cache: Cache, observer: impl Observer + 'static) -> Self {
        Self {
            cache: RefCell::new(cache),
            frames: RefCell::new(Frames::new()),
            observer: Box::new(observer),
        }
    }

    /// Declare that the running target depends on `resource`.
    ///
    /// When the resource reports a modification, the results of the target
    /// and of every target that (transitively) called it are recomputed.
    /// Targets with parameters that are called after this by the same caller
    /// are considered dependent, too.
    pub fn depends_on(&self, resource: impl Into<Resource>) {
        self.frames.borrow_mut().record(resource.into());
    }

    /// Call a target with a typed result.
    ///
    /// A target returning `()` is not cached.
    pub fn call<T, F>(&self, target: &Target, args: Vec<Value>, body: F) -> Result<T>
    where
        T: Into<Value> + TryFrom<Value, Error = ValueError>,
        F: FnOnce(&Self) -> Result<T>,
    {
        let value = self.dispatch(target, args, Some(|memo: &Self| body(memo).map(Into::into)))?;
        T::try_from(value).map_err(|source| Error::Value { target: target.name.into(), source })
    }

    /// Call a target with an untyped result.
    ///
    /// A `body` of `None` denotes a target without implementation, which
    /// fails with [`Error::Unimplemented`]. A [`Value::Unit`] result is not
    /// cached.
    pub fn invoke<F>(&self, target: &Target, args: Vec<Value>, body: Option<F>) -> Result<Value>
    where
        F: FnOnce(&Self) -> Result<Value>,
    {
        self.dispatch(target, args, body)
    }

    /// Serve a call from the cache or execute it.
    fn dispatch<F>(&self, target: &Target, args: Vec<Value>, body: Option<F>) -> Result<Value>
    where
        F: FnOnce(&Self) -> Result<Value>,
    {
        let Some(body) = body else {
            return Err(Error::Unimplemented(target.name.into()));
        };

        let key = Invocation::new(target, args);

        // Check if there is a valid cached result.
        let mut status = Status::New;
        let mut cache = self.cache.borrow_mut();
        if let Some(record) = cache.get(&key) {
            if record.modified() {
                debug!(call = %key, "evicting stale result");
                cache.remove(&key);
                status = Status::Stale;
            } else {
                let value = record.value().clone();
                let sources = record.sources().to_vec();

                // Release the borrow so that the observer may inspect the
                // cache.
                drop(cache);

                trace!(call = %key, "current");
                self.observer.start(Status::Current, target.name, key.args());
                self.frames.borrow_mut().extend(sources);

                // A hit returns what is cached, whatever the observer says.
                self.observer.end(Status::Current, target.name, key.args(), value.clone());
                return Ok(value);
            }
        }

        // Release the borrow so that nested calls can access the cache.
        drop(cache);

        trace!(call = %key, %status, "executing");
        self.frames.borrow_mut().push(target.inherits());
        self.observer.start(status, target.name, key.args());

        let result = match body(self) {
            Ok(value) => {
                let value = self.observer.end(status, target.name, key.args(), value);
                if value != Value::Unit {
                    let sources = self.frames.borrow().top().resources().to_vec();
                    let record = Record::new(key, value.clone(), sources);
                    self.cache.borrow_mut().insert(record);
                }
                Ok(value)
            }
            Err(err) => {
                debug!(call = %key, "failed: {err}");
                self.observer.fail(status, target.name, key.args(), &err);
                Err(err)
            }
        };

        // Whatever happened, the caller depends on what this call saw.
        self.frames.borrow_mut().pop();
        result
    }

    /// The cached result for a call, if any.
    pub fn lookup(&self, key: &Invocation) -> Option<Record> {
        self.cache.borrow().get(key).cloned()
    }

    /// Read access to the cache.
    ///
    /// The borrow must be released before calling another target.
    pub fn cache(&self) -> Ref<'_, Cache> {
        self.cache.borrow()
    }

    /// Erase all cached results.
    pub fn forget(&self) {
        self.cache.borrow_mut().clear();
    }

    /// The number of target calls currently in flight.
    pub fn depth(&self) -> usize {
        self.frames.borrow().depth()
    }

    /// Take the cache out of the memo.
    pub fn into_cache(self) -> Cache {
        self.cache.into_inner()
    }
}

impl Default for Memo {
    fn default() -> Self {
        Self::new()
    }
}
