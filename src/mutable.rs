use std::any::Any;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fs::{File, FileSet};

/// A reference to external state that might change between runs.
///
/// A mutable is a snapshot: it captures the state of something (a file, a set
/// of files, ...) when it is created and later reports whether that state has
/// changed since.
pub trait Mutable: Any + Debug + Send + Sync {
    /// Whether the referenced state has changed since the snapshot was taken.
    fn modified(&self) -> bool;
}

/// A mutable that can outlive the process.
///
/// Only durable resources are written to the persisted cache. A record whose
/// arguments, value or dependencies contain a non-durable resource is kept for
/// the current run and dropped on save.
pub trait Durable: Mutable + Serialize + DeserializeOwned {
    /// Identifies the resource type in the persisted cache.
    const KIND: &'static str;
}

/// The durable form of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snapshot {
    /// The `Durable::KIND` of the resource.
    pub kind: String,
    /// The resource's JSON encoding.
    pub state: String,
}

/// A shared, read-only handle to a mutable resource.
///
/// Cloning is cheap. Two handles are equal if they have equal snapshots, or,
/// for transient resources, if they point to the same resource.
#[derive(Clone)]
pub struct Resource {
    inner: Arc<dyn Mutable>,
    snapshot: Option<Arc<Snapshot>>,
}

impl Resource {
    /// Wrap a durable resource, capturing its snapshot.
    pub fn durable<T: Durable>(value: T) -> Self {
        let snapshot = serde_json::to_string(&value)
            .ok()
            .map(|state| Arc::new(Snapshot { kind: T::KIND.into(), state }));
        Self { inner: Arc::new(value), snapshot }
    }

    /// Wrap a resource that only lives as long as the process.
    pub fn transient<T: Mutable>(value: T) -> Self {
        Self { inner: Arc::new(value), snapshot: None }
    }

    /// Whether the referenced state has changed.
    pub fn modified(&self) -> bool {
        self.inner.modified()
    }

    /// The durable form of this resource, if it has one.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_deref()
    }

    /// Access the concrete resource.
    pub fn downcast_ref<T: Mutable>(&self) -> Option<&T> {
        let any: &dyn Any = &*self.inner;
        any.downcast_ref()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        match (&self.snapshot, &other.snapshot) {
            (Some(a), Some(b)) => a == b,
            (None, None) => Arc::ptr_eq(&self.inner, &other.inner),
            _ => false,
        }
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.snapshot {
            Some(snapshot) => snapshot.hash(state),
            None => (Arc::as_ptr(&self.inner) as *const () as usize).hash(state),
        }
    }
}

impl Debug for Resource {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Debug::fmt(&*self.inner, f)
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Debug::fmt(&*self.inner, f)
    }
}

impl From<File> for Resource {
    fn from(file: File) -> Self {
        Self::durable(file)
    }
}

impl From<FileSet> for Resource {
    fn from(files: FileSet) -> Self {
        Self::durable(files)
    }
}

/// Turns snapshots back into resources.
#[derive(Clone)]
pub struct Decoders(FxHashMap<&'static str, fn(&str) -> serde_json::Result<Resource>>);

impl Decoders {
    /// A registry that knows no resource kinds at all.
    pub fn empty() -> Self {
        Self(FxHashMap::default())
    }

    /// Make resources of type `T` decodable.
    pub fn register<T: Durable>(&mut self) -> &mut Self {
        self.0.insert(T::KIND, decode::<T>);
        self
    }

    /// Restore a resource from its snapshot.
    pub fn decode(&self, snapshot: &Snapshot) -> Result<Resource> {
        let decode = self
            .0
            .get(snapshot.kind.as_str())
            .ok_or_else(|| Error::UnknownResource(snapshot.kind.clone()))?;
        Ok(decode(&snapshot.state)?)
    }
}

impl Default for Decoders {
    fn default() -> Self {
        let mut decoders = Self::empty();
        decoders.register::<File>().register::<FileSet>();
        decoders
    }
}

fn decode<T: Durable>(state: &str) -> serde_json::Result<Resource> {
    serde_json::from_str::<T>(state).map(Resource::durable)
}
