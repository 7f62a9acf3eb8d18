//! Resources backed by the filesystem.

use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use globset::Glob;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::Result;
use crate::mutable::{Durable, Mutable};

/// A reference to a single file, stamped with its modification time.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct File {
    path: PathBuf,
    /// Nanoseconds since the epoch, `None` if the file did not exist.
    stamp: Option<u64>,
}

impl File {
    /// Reference a file in its current state.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stamp = stamp(&path);
        Self { path, stamp }
    }

    /// The path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file existed when it was referenced.
    pub fn existed(&self) -> bool {
        self.stamp.is_some()
    }
}

impl Mutable for File {
    fn modified(&self) -> bool {
        match self.stamp {
            Some(before) => stamp(&self.path) != Some(before),
            None => true,
        }
    }
}

impl Durable for File {
    const KIND: &'static str = "file";
}

impl Debug for File {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

fn stamp(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let nanos = modified.duration_since(UNIX_EPOCH).ok()?.as_nanos();
    Some(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// A set of files, optionally defined by a glob pattern.
///
/// A set found through a pattern is also modified when re-evaluating the
/// pattern yields different members, i.e. when matching files were added or
/// removed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileSet {
    base: PathBuf,
    pattern: Option<String>,
    files: Vec<File>,
}

impl FileSet {
    /// Find all files below `base` whose relative path matches `pattern`.
    pub fn find(base: impl Into<PathBuf>, pattern: &str) -> Result<Self> {
        let base = base.into();
        let files = matches(&base, pattern)?.into_iter().map(File::new).collect();
        Ok(Self { base, pattern: Some(pattern.into()), files })
    }

    /// A fixed set of files.
    pub fn of(files: impl IntoIterator<Item = File>) -> Self {
        let mut files: Vec<File> = files.into_iter().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup_by(|a, b| a.path == b.path);
        Self { base: PathBuf::new(), pattern: None, files }
    }

    /// The union of two sets. The result has no pattern.
    pub fn union(&self, other: &Self) -> Self {
        Self::of(self.files.iter().chain(&other.files).cloned())
    }

    /// The files in the set.
    pub fn iter(&self) -> std::slice::Iter<'_, File> {
        self.files.iter()
    }

    /// The paths of the files in the set.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(File::path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Mutable for FileSet {
    fn modified(&self) -> bool {
        if let Some(pattern) = &self.pattern {
            match matches(&self.base, pattern) {
                Ok(paths) => {
                    if !paths.iter().eq(self.paths()) {
                        return true;
                    }
                }
                Err(_) => return true,
            }
        }
        self.files.iter().any(File::modified)
    }
}

impl Durable for FileSet {
    const KIND: &'static str = "fileset";
}

impl Debug for FileSet {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.pattern {
            Some(pattern) => write!(f, "{}/{pattern}", self.base.display())?,
            None => f.write_str("files")?,
        }
        write!(f, " ({} files)", self.files.len())
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a File;
    type IntoIter = std::slice::Iter<'a, File>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The sorted paths of all files below `base` matching `pattern`.
fn matches(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = Glob::new(pattern)?.compile_matcher();
    let mut paths = vec![];
    if !base.exists() {
        return Ok(paths);
    }

    for entry in WalkDir::new(base).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(base).unwrap_or(path);
        if matcher.is_match(relative) {
            paths.push(path.to_path_buf());
        }
    }

    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn touch(path: &Path, offset: u64) {
        let file = std::fs::File::options().write(true).create(true).truncate(false).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(offset)).unwrap();
    }

    #[test]
    fn test_file_modified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");

        let missing = File::new(&path);
        assert!(!missing.existed());
        assert!(missing.modified());

        touch(&path, 0);
        let file = File::new(&path);
        assert!(file.existed());
        assert!(!file.modified());

        touch(&path, 60);
        assert!(file.modified());
    }

    #[test]
    fn test_file_set_membership() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        touch(&dir.path().join("src/a.rs"), 0);
        touch(&dir.path().join("src/b.txt"), 0);

        let set = FileSet::find(dir.path(), "src/*.rs").unwrap();
        assert_eq!(set.len(), 1);
        assert!(!set.modified());

        touch(&dir.path().join("src/b.txt"), 60);
        assert!(!set.modified());

        touch(&dir.path().join("src/c.rs"), 0);
        assert!(set.modified());
    }

    #[test]
    fn test_file_set_member_modified() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.rs"), 0);

        let set = FileSet::find(dir.path(), "*.rs").unwrap();
        assert!(!set.modified());

        touch(&dir.path().join("a.rs"), 60);
        assert!(set.modified());
    }

    #[test]
    fn test_union() {
        let a = FileSet::of([File::new("x"), File::new("y")]);
        let b = FileSet::of([File::new("y"), File::new("z")]);
        let paths: Vec<_> = a.union(&b).paths().map(Path::to_path_buf).collect();
        assert_eq!(paths, [PathBuf::from("x"), PathBuf::from("y"), PathBuf::from("z")]);
    }
}
