use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the advisory lock marker file inside a repository. Its content is
/// irrelevant; only the OS-level lock on it matters.
pub const LOCK_FILE: &str = "lock";

/// Name of the persisted reference-count table inside a repository.
pub const REFCOUNT_FILE: &str = "refcounts";

/// A content-addressed blob repository: where blobs live and whether newly
/// stored blobs are gzip-compressed.
///
/// The compression flag is a storage-time policy, not an invariant: after a
/// toggle a repository holds a mix of compressed and uncompressed blobs, and
/// readers discover each blob's on-disk state by probing for a `.gz` suffix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub base_dir: PathBuf,
    pub compressed: bool,
}

impl Repository {
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>, compressed: bool) -> Self {
        Self {
            name: name.into(),
            base_dir: base_dir.into(),
            compressed,
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(LOCK_FILE)
    }

    pub fn refcount_path(&self) -> PathBuf {
        self.base_dir.join(REFCOUNT_FILE)
    }

    pub fn shard_dir(&self, prefix: &str) -> PathBuf {
        self.base_dir.join(prefix)
    }
}

/// A named set of include paths and exclude rules feeding one repository.
///
/// Sourced from configuration outside the engine; the engine only consumes
/// the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    pub name: String,
    pub repository: String,
    pub snapshot_dir: PathBuf,
    pub includes: Vec<PathBuf>,
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
    #[serde(default)]
    pub exclude_files: Vec<String>,
    #[serde(default)]
    pub skip_broken_symlinks: bool,
    #[serde(default)]
    pub compress_snapshots: bool,
}

impl Archive {
    pub fn new(
        name: impl Into<String>,
        repository: impl Into<String>,
        snapshot_dir: impl Into<PathBuf>,
        includes: Vec<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            snapshot_dir: snapshot_dir.into(),
            includes,
            exclude_dirs: Vec::new(),
            exclude_files: Vec::new(),
            skip_broken_symlinks: false,
            compress_snapshots: false,
        }
    }
}
