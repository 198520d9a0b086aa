//! The change-detection cache. Maps each source path to the hash of its raw
//! text as of the last successful write, so that a build only re-renders
//! documents whose content changed.
//!
//! The cache is persisted as a single JSON snapshot which is overwritten as a
//! whole by [`Cache::flush`]. A crash before the flush loses every update from
//! that build, which makes the next build re-render those documents again.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// The cached state of one source document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The BLAKE3 digest of the full raw text, front matter included.
    pub hash: String,

    /// The file the document was rendered to.
    pub output: PathBuf,

    /// The source file's modification time in seconds since the epoch. This
    /// is informational only; the hash decides whether to re-render.
    pub mtime: f64,
}

/// The on-disk shape of the cache file.
#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    posts: BTreeMap<PathBuf, CacheEntry>,
}

/// An in-memory view of the cache file. Only the build orchestrator touches
/// it, and only after all render work has been collected.
#[derive(Debug)]
pub struct Cache {
    path: PathBuf,
    entries: BTreeMap<PathBuf, CacheEntry>,
}

impl Cache {
    /// Creates an empty cache which will be flushed to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Cache {
        Cache {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Reads the snapshot at `path`. A missing or unreadable snapshot is an
    /// empty cache, which simply means everything gets rendered.
    pub fn load(path: impl Into<PathBuf>) -> Cache {
        let path = path.into();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "no cache snapshot; starting empty");
                return Cache::empty(path);
            }
        };
        match serde_json::from_str::<Snapshot>(&contents) {
            Ok(snapshot) => Cache {
                path,
                entries: snapshot.posts,
            },
            Err(err) => {
                debug!(path = %path.display(), error = %err, "corrupt cache snapshot; starting empty");
                Cache::empty(path)
            }
        }
    }

    /// Returns true when `force` is set, when there is no entry for `source`,
    /// or when the stored hash differs from the hash of `raw`.
    pub fn needs_render(&self, source: &Path, raw: &str, force: bool) -> bool {
        if force {
            return true;
        }
        match self.entries.get(source) {
            None => true,
            Some(entry) => entry.hash != content_hash(raw),
        }
    }

    /// Records that `source` was rendered from `raw` and written to
    /// `output`. Memory only; see [`Cache::flush`].
    pub fn record_success(&mut self, source: &Path, raw: &str, output: &Path) {
        let mtime = fs::metadata(source)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        self.entries.insert(
            source.to_owned(),
            CacheEntry {
                hash: content_hash(raw),
                output: output.to_owned(),
                mtime,
            },
        );
    }

    /// Drops the entry for `source`, returning it if there was one.
    pub fn forget(&mut self, source: &Path) -> Option<CacheEntry> {
        self.entries.remove(source)
    }

    pub fn get(&self, source: &Path) -> Option<&CacheEntry> {
        self.entries.get(source)
    }

    /// The source paths with an entry, in sorted order.
    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether some entry records `output` as its output page.
    pub fn owns_output(&self, output: &Path) -> bool {
        self.entries.values().any(|entry| entry.output == output)
    }

    /// Serializes the whole cache, overwriting any previous snapshot.
    pub fn flush(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| CacheError::Io {
                    path: self.path.clone(),
                    err,
                })?;
            }
        }
        let snapshot = SnapshotRef {
            posts: &self.entries,
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&self.path, json).map_err(|err| CacheError::Io {
            path: self.path.clone(),
            err,
        })?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "flushed cache");
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    posts: &'a BTreeMap<PathBuf, CacheEntry>,
}

/// The hex BLAKE3 digest of `raw`.
pub fn content_hash(raw: &str) -> String {
    blake3::hash(raw.as_bytes()).to_hex().to_string()
}

/// Represents an error persisting the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Returned when the snapshot can't be written.
    #[error("writing cache file `{}`: {err}", .path.display())]
    Io { path: PathBuf, err: io::Error },

    /// Returned when the cache can't be serialized.
    #[error("serializing cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_needs_render() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("post.md");
        fs::write(&source, "hello").unwrap();

        let mut cache = Cache::empty(dir.path().join("cache.json"));
        assert!(cache.needs_render(&source, "hello", false));

        cache.record_success(&source, "hello", &dir.path().join("out/post/index.html"));
        assert!(!cache.needs_render(&source, "hello", false));
        assert!(cache.needs_render(&source, "hello", true));
        assert!(cache.needs_render(&source, "hello, world", false));
    }

    #[test]
    fn test_flush_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache.json");
        let source = dir.path().join("post.md");

        let mut cache = Cache::empty(&path);
        cache.record_success(&source, "hello", Path::new("public/post/index.html"));
        cache.flush().unwrap();

        let loaded = Cache::load(&path);
        assert_eq!(1, loaded.len());
        let entry = loaded.get(&source).unwrap();
        assert_eq!(content_hash("hello"), entry.hash);
        assert_eq!(Path::new("public/post/index.html"), entry.output);
        assert!(!loaded.needs_render(&source, "hello", false));
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Cache::load(dir.path().join("missing.json")).is_empty());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{ not json").unwrap();
        assert!(Cache::load(&corrupt).is_empty());
    }

    #[test]
    fn test_flush_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let (a, b) = (dir.path().join("a.md"), dir.path().join("b.md"));

        let mut cache = Cache::empty(&path);
        cache.record_success(&a, "a", Path::new("a"));
        cache.record_success(&b, "b", Path::new("b"));
        cache.flush().unwrap();

        cache.forget(&a);
        cache.flush().unwrap();

        let loaded = Cache::load(&path);
        assert_eq!(vec![b.as_path()], loaded.sources().collect::<Vec<_>>());
    }
}
