//! Persisting the cache between runs.
//!
//! The cache is stored as a JSON document:
//!
//! ```json
//! { "version": 1, "records": [
//!     { "target": "fib", "args": [{ "type": "int", "value": 10 }],
//!       "value": { "type": "int", "value": 55 }, "sources": [] }
//! ] }
//! ```
//!
//! Only records whose arguments, value and sources are all encodable are
//! written. Everything else silently disappears from the next run.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::cache::{Cache, Record};
use crate::error::{Error, Result};
use crate::invocation::Invocation;
use crate::mutable::{Decoders, Snapshot};
use crate::value::Value;

/// The version of the persisted format.
pub const VERSION: u32 = 1;

/// The outcome of encoding a cache.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// The number of records written.
    pub kept: usize,
    /// The number of records that could not be encoded.
    pub dropped: usize,
}

#[derive(Serialize, Deserialize)]
struct Document {
    version: u32,
    records: Vec<Entry>,
}

/// Used to check the version before the records are looked at.
#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Serialize, Deserialize)]
struct Entry {
    target: String,
    args: Vec<Encoded>,
    value: Encoded,
    sources: Vec<Snapshot>,
}

/// The persisted form of a [`Value`].
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
enum Encoded {
    Unit,
    Bool(bool),
    Int(i64),
    Str(String),
    Path(PathBuf),
    List(Vec<Encoded>),
    Resource(Snapshot),
}

impl Encoded {
    /// Encode a value, if it is encodable.
    fn encode(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Unit => Self::Unit,
            Value::Bool(v) => Self::Bool(*v),
            Value::Int(v) => Self::Int(*v),
            Value::Str(v) => Self::Str(v.clone()),
            Value::Path(v) => Self::Path(v.clone()),
            Value::List(items) => {
                Self::List(items.iter().map(Self::encode).collect::<Option<_>>()?)
            }
            Value::Resource(resource) => Self::Resource(resource.snapshot()?.clone()),
            Value::Opaque(_) => return None,
        })
    }

    fn decode(self, decoders: &Decoders) -> Result<Value> {
        Ok(match self {
            Self::Unit => Value::Unit,
            Self::Bool(v) => Value::Bool(v),
            Self::Int(v) => Value::Int(v),
            Self::Str(v) => Value::Str(v),
            Self::Path(v) => Value::Path(v),
            Self::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| item.decode(decoders))
                    .collect::<Result<_>>()?,
            ),
            Self::Resource(snapshot) => Value::Resource(decoders.decode(&snapshot)?),
        })
    }
}

impl Entry {
    fn encode(record: &Record) -> Option<Self> {
        if !record.encodable() {
            return None;
        }

        Some(Self {
            target: record.key().name().into(),
            args: record.key().args().iter().map(Encoded::encode).collect::<Option<_>>()?,
            value: Encoded::encode(record.value())?,
            sources: record
                .sources()
                .iter()
                .map(|source| source.snapshot().cloned())
                .collect::<Option<_>>()?,
        })
    }

    fn decode(self, decoders: &Decoders) -> Result<Record> {
        let args = self
            .args
            .into_iter()
            .map(|arg| arg.decode(decoders))
            .collect::<Result<_>>()?;
        let value = self.value.decode(decoders)?;
        let sources = self
            .sources
            .iter()
            .map(|snapshot| decoders.decode(snapshot))
            .collect::<Result<_>>()?;
        Ok(Record::new(Invocation::from_parts(self.target, args), value, sources))
    }
}

/// Encode all encodable records of a cache.
pub fn encode(cache: &Cache) -> Result<(Vec<u8>, Summary)> {
    let records: Vec<Entry> = cache.iter().filter_map(Entry::encode).collect();
    let summary = Summary { kept: records.len(), dropped: cache.len() - records.len() };
    let bytes = serde_json::to_vec(&Document { version: VERSION, records })?;
    Ok((bytes, summary))
}

/// Decode the records of a persisted cache.
///
/// Either all records are decoded or none.
pub fn decode(bytes: &[u8], decoders: &Decoders) -> Result<Vec<Record>> {
    let Header { version } = serde_json::from_slice(bytes)?;
    if version != VERSION {
        return Err(Error::Version { found: version });
    }

    let document: Document = serde_json::from_slice(bytes)?;
    document
        .records
        .into_iter()
        .map(|entry| entry.decode(decoders))
        .collect()
}

/// Write the cache to `path`.
///
/// The file is replaced atomically so that an interrupted save never leaves a
/// half-written cache behind. On failure, the temporary file is removed.
pub fn save(cache: &Cache, path: &Path) -> Result<Summary> {
    let (bytes, summary) = encode(cache)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let write = || -> std::io::Result<()> {
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| err.error)?;
        Ok(())
    };
    write().map_err(|err| Error::file(path, err))?;
    debug!(path = %path.display(), kept = summary.kept, dropped = summary.dropped, "saved cache");
    Ok(summary)
}

/// Load the records persisted at `path` into `cache`.
///
/// Returns the number of records loaded. A missing file loads nothing.
pub fn load_into(cache: &mut Cache, path: &Path, decoders: &Decoders) -> Result<usize> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(Error::file(path, err)),
    };

    let records = decode(&bytes, decoders)?;
    let count = records.len();
    cache.extend(records);
    debug!(path = %path.display(), count, "loaded cache");
    Ok(count)
}
