use std::any::type_name;

use crate::error::{Error, Result};
use crate::invocation::Target;
use crate::memo::Memo;
use crate::value::Value;

type Run = Box<dyn Fn(&Memo) -> Result<Value>>;

/// The zero-argument targets of a build, by name.
///
/// This is what the build controller runs from the command line and lists
/// with `--targets`.
#[derive(Default)]
pub struct Targets {
    entries: Vec<Entry>,
}

struct Entry {
    name: &'static str,
    output: &'static str,
    run: Option<Run>,
}

impl Targets {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target.
    ///
    /// `f` is expected to be memoized already, typically through
    /// [`#[target]`](macro@crate::target).
    pub fn add<T, F>(mut self, name: &'static str, f: F) -> Self
    where
        T: Into<Value>,
        F: Fn(&Memo) -> Result<T> + 'static,
    {
        let run: Run = Box::new(move |memo| f(memo).map(Into::into));
        self.entries.push(Entry { name, output: short_name::<T>(), run: Some(run) });
        self
    }

    /// Declare a target that has no implementation.
    ///
    /// Running it fails with [`Error::Unimplemented`].
    pub fn declare<T>(mut self, name: &'static str) -> Self {
        self.entries.push(Entry { name, output: short_name::<T>(), run: None });
        self
    }

    /// Run the target called `name`.
    pub fn run(&self, memo: &Memo, name: &str) -> Result<Value> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| Error::UnknownTarget(name.into()))?;

        match &entry.run {
            Some(run) => run(memo),
            None => {
                let target = Target::new(entry.name, 0);
                memo.invoke(&target, vec![], None::<fn(&Memo) -> Result<Value>>)
            }
        }
    }

    /// Whether a target with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    /// The names and output types of all targets, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries.iter().map(|entry| (entry.name, entry.output))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The name of a type without its module path.
fn short_name<T>() -> &'static str {
    let full = type_name::<T>();
    let generic = full.find('<').unwrap_or(full.len());
    match full[..generic].rfind("::") {
        Some(i) => &full[i + 2..],
        None => full,
    }
}
