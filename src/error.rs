use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::codec::VERSION;

/// A specialized result type for build operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while building.
#[derive(Debug, Error)]
pub enum Error {
    /// A target was declared without an implementation and then invoked.
    #[error("target `{0}` has no default implementation")]
    Unimplemented(String),

    /// No target with this name is registered.
    #[error("unknown target `{0}`")]
    UnknownTarget(String),

    /// A target produced a value of the wrong shape.
    #[error("target `{target}` returned an unexpected value: {source}")]
    Value {
        target: String,
        #[source]
        source: ValueError,
    },

    /// Reading or writing a specific file failed.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// The persisted cache could not be decoded.
    #[error("cache file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The persisted cache was written by an incompatible encoder.
    #[error("unsupported cache version {found} (expected {VERSION})")]
    Version { found: u32 },

    /// The persisted cache refers to a resource kind nobody can decode.
    #[error("unknown resource kind `{0}`")]
    UnknownResource(String),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// A target body failed for its own reasons.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File { path: path.into(), source }
    }
}

/// A value could not be converted into the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct ValueError {
    pub expected: &'static str,
    pub found: &'static str,
}
