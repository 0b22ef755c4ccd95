use crate::archive::Repository;
use crate::digest::Digest;
use crate::lock::{LockMode, RepoLock, DEFAULT_LOCK_TIMEOUT};
use crate::tree::FileAttributes;
use crate::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Mode bits for stored blobs: read-only for owner and group.
const BLOB_MODE: u32 = 0o440;

/// Aggregate view of the reference-count table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    /// Digests with at least one reference.
    pub referenced: u64,
    /// Digests whose count has dropped to zero but are not yet pruned.
    pub unreferenced: u64,
    /// Sum of all reference counts.
    pub total_refs: u64,
}

/// Per-blob storage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobStats {
    pub stored_size: u64,
    pub ref_count: u64,
}

/// Repository-wide byte totals for the stats surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageTotals {
    /// Content bytes as seen by snapshots: stored size times reference count.
    pub gross_bytes: u64,
    /// Bytes physically on disk, each unique blob counted once.
    pub stored_bytes: u64,
    /// Stored bytes divided across the snapshots referencing each blob.
    pub shared_bytes: u64,
}

/// Persisted reference-count table: shard prefix to suffix to count.
///
/// Private on-disk format, bincode-encoded, rewritten as a whole when a
/// writeable session closes. The table is the unit of atomicity; individual
/// blobs are not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefCountTable {
    shards: HashMap<String, HashMap<String, u64>>,
}

impl RefCountTable {
    pub fn get(&self, digest: &Digest) -> Option<u64> {
        let (prefix, suffix) = digest.shard();
        self.shards.get(&prefix)?.get(&suffix).copied()
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.get(digest).is_some()
    }

    fn insert(&mut self, digest: &Digest, count: u64) {
        let (prefix, suffix) = digest.shard();
        self.shards.entry(prefix).or_default().insert(suffix, count);
    }

    fn increment(&mut self, digest: &Digest) -> u64 {
        let (prefix, suffix) = digest.shard();
        let count = self
            .shards
            .entry(prefix)
            .or_default()
            .entry(suffix)
            .or_insert(0);
        *count += 1;
        *count
    }

    fn decrement(&mut self, digest: &Digest) -> u64 {
        let (prefix, suffix) = digest.shard();
        match self.shards.get_mut(&prefix).and_then(|s| s.get_mut(&suffix)) {
            Some(count) if *count > 0 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                warn!(%digest, "release of digest whose count is already zero");
                0
            }
            None => {
                warn!(%digest, "release of digest unknown to the repository");
                0
            }
        }
    }

    fn remove(&mut self, digest: &Digest) {
        let (prefix, suffix) = digest.shard();
        if let Some(shard) = self.shards.get_mut(&prefix) {
            shard.remove(&suffix);
            if shard.is_empty() {
                self.shards.remove(&prefix);
            }
        }
    }

    pub fn counts(&self) -> StoreCounts {
        let mut counts = StoreCounts {
            referenced: 0,
            unreferenced: 0,
            total_refs: 0,
        };
        for shard in self.shards.values() {
            for &count in shard.values() {
                if count == 0 {
                    counts.unreferenced += 1;
                } else {
                    counts.referenced += 1;
                    counts.total_refs += count;
                }
            }
        }
        counts
    }

    fn entries(&self) -> impl Iterator<Item = (Digest, u64)> + '_ {
        self.shards.iter().flat_map(|(prefix, shard)| {
            shard.iter().filter_map(move |(suffix, &count)| {
                Digest::from_shard(prefix, suffix).ok().map(|d| (d, count))
            })
        })
    }
}

/// Scoped session against one repository: the repository lock plus the
/// in-memory reference-count table.
///
/// Writeable handles hold the exclusive lock and persist the table when they
/// close; read-only handles hold a shared lock and never write. Both release
/// the lock on every exit path -- `close()` reports persistence errors, and
/// `Drop` falls back to a best-effort flush.
#[derive(Debug)]
pub struct StoreHandle {
    repo: Repository,
    table: RefCountTable,
    writeable: bool,
    dirty: bool,
    _lock: RepoLock,
}

impl StoreHandle {
    pub fn open(repo: &Repository, writeable: bool) -> Result<Self> {
        Self::open_with_timeout(repo, writeable, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn open_with_timeout(
        repo: &Repository,
        writeable: bool,
        timeout: Duration,
    ) -> Result<Self> {
        if !repo.base_dir.is_dir() {
            return Err(Error::RepositoryNotFound {
                path: repo.base_dir.clone(),
            });
        }
        let mode = if writeable {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        };
        let lock = RepoLock::acquire(&repo.lock_path(), mode, timeout)?;
        let table = load_table(repo)?;
        debug!(repo = %repo.name, writeable, "opened blob store");
        Ok(Self {
            repo: repo.clone(),
            table,
            writeable,
            dirty: false,
            _lock: lock,
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn is_writeable(&self) -> bool {
        self.writeable
    }

    /// Stores the content of `path`, deduplicating by digest.
    ///
    /// The first sighting of a digest writes the blob (gzip-compressed when
    /// the repository policy says so) and sets its count to one; any repeat
    /// sighting only increments the count and performs no content I/O.
    pub fn store(&mut self, path: &Path) -> Result<Digest> {
        self.require_writeable()?;
        let bytes = fs::read(path).map_err(|source| Error::ContentReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        self.store_bytes(&bytes)
    }

    /// Same as [`store`](Self::store) for content already in memory.
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<Digest> {
        self.require_writeable()?;
        let digest = Digest::of_bytes(bytes);

        if self.table.contains(&digest) {
            let count = self.table.increment(&digest);
            self.dirty = true;
            debug!(%digest, count, "dedup hit, incremented reference");
            return Ok(digest);
        }

        let target = blob_path(&self.repo, &digest, self.repo.compressed);
        if let Some(shard_dir) = target.parent() {
            fs::create_dir_all(shard_dir)?;
        }
        write_blob(&target, bytes, self.repo.compressed)?;

        self.table.insert(&digest, 1);
        self.dirty = true;
        debug!(%digest, size = bytes.len(), "stored new blob");
        Ok(digest)
    }

    /// Opens a blob for reading. Immutable content needs no lock, so this
    /// only consults the table for existence.
    pub fn retrieve(&self, digest: &Digest) -> Result<Box<dyn Read>> {
        if !self.table.contains(digest) {
            return Err(Error::BlobNotFound {
                digest: digest.to_hex(),
            });
        }
        open_blob(&self.repo, digest)
    }

    /// Materializes a blob at `target_path` and applies `attrs` to it.
    ///
    /// Content and metadata failures are reported separately: when only the
    /// attribute restore fails, the content is already in place and callers
    /// may treat the error as a partial, non-fatal condition.
    pub fn copy_contents_to(
        &self,
        digest: &Digest,
        target_path: &Path,
        attrs: &FileAttributes,
    ) -> Result<()> {
        let mut reader = open_blob(&self.repo, digest)?;
        let mut copy = || -> std::io::Result<()> {
            let mut out = File::create(target_path)?;
            std::io::copy(&mut reader, &mut out)?;
            Ok(())
        };
        copy().map_err(|source| Error::CopyFailed {
            digest: digest.to_hex(),
            path: target_path.to_path_buf(),
            source,
        })?;
        attrs
            .apply_to(target_path)
            .map_err(|source| Error::SetAttributesFailed {
                path: target_path.to_path_buf(),
                source,
            })
    }

    /// Decrements a digest's reference count. Never deletes content; a count
    /// of zero marks the blob for a later prune.
    pub fn release(&mut self, digest: &Digest) -> Result<()> {
        self.require_writeable()?;
        let count = self.table.decrement(digest);
        self.dirty = true;
        debug!(%digest, count, "released reference");
        Ok(())
    }

    pub fn release_many<I>(&mut self, digests: I) -> Result<()>
    where
        I: IntoIterator<Item = Digest>,
    {
        for digest in digests {
            self.release(&digest)?;
        }
        Ok(())
    }

    pub fn get_counts(&self) -> StoreCounts {
        self.table.counts()
    }

    /// Current reference count for a digest, if the repository knows it.
    pub fn ref_count(&self, digest: &Digest) -> Option<u64> {
        self.table.get(digest)
    }

    pub fn get_storage_stats(&self, digest: &Digest) -> Result<BlobStats> {
        let ref_count = self.table.get(digest).ok_or_else(|| Error::BlobNotFound {
            digest: digest.to_hex(),
        })?;
        let stored_size = stored_blob_size(&self.repo, digest)?;
        Ok(BlobStats {
            stored_size,
            ref_count,
        })
    }

    /// Byte totals across the whole repository: gross (per reference),
    /// stored (per unique blob), and the per-snapshot share.
    pub fn get_storage_totals(&self) -> Result<StorageTotals> {
        let mut totals = StorageTotals::default();
        for (digest, count) in self.table.entries() {
            let size = stored_blob_size(&self.repo, &digest)?;
            totals.stored_bytes += size;
            totals.gross_bytes += size * count;
            if count > 0 {
                totals.shared_bytes += size / count;
            }
        }
        Ok(totals)
    }

    /// Physically deletes every blob whose reference count is exactly zero,
    /// removing its table entry. Returns the number of blobs removed and the
    /// bytes freed.
    pub fn prune_unreferenced(&mut self) -> Result<(u64, u64)> {
        self.require_writeable()?;
        let garbage: Vec<Digest> = self
            .table
            .entries()
            .filter(|(_, count)| *count == 0)
            .map(|(digest, _)| digest)
            .collect();

        let mut removed = 0u64;
        let mut freed = 0u64;
        for digest in garbage {
            match existing_blob_path(&self.repo, &digest) {
                Some(path) => {
                    let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    fs::remove_file(&path)?;
                    freed += size;
                }
                None => warn!(%digest, "unreferenced blob missing on disk"),
            }
            self.table.remove(&digest);
            self.dirty = true;
            removed += 1;
        }
        info!(removed, freed, repo = %self.repo.name, "pruned unreferenced blobs");
        Ok((removed, freed))
    }

    /// Persists the table (when writeable and dirty) and releases the lock.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.writeable && self.dirty {
            persist_table(&self.repo, &self.table)?;
            self.dirty = false;
        }
        Ok(())
    }

    fn require_writeable(&self) -> Result<()> {
        if self.writeable {
            Ok(())
        } else {
            Err(Error::ReadOnlyHandle)
        }
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(repo = %self.repo.name, %err, "failed to persist reference counts on drop");
        }
    }
}

/// Creates the repository layout: base directory, lock marker, empty table.
pub fn init_repository(repo: &Repository) -> Result<()> {
    if repo.refcount_path().exists() {
        return Err(Error::RepositoryExists {
            path: repo.base_dir.clone(),
        });
    }
    fs::create_dir_all(&repo.base_dir).map_err(|err| match err.kind() {
        std::io::ErrorKind::PermissionDenied => Error::PermissionDenied {
            path: repo.base_dir.clone(),
        },
        _ => Error::Io(err),
    })?;
    File::create(repo.lock_path())?;
    persist_table(repo, &RefCountTable::default())?;
    info!(repo = %repo.name, path = %repo.base_dir.display(), "initialized repository");
    Ok(())
}

/// Opens a stored blob for reading without any lock: blobs are immutable
/// once written. Probes the compressed and plain forms in the order the
/// repository policy makes likely, since on-disk state can lag the policy.
pub fn open_blob(repo: &Repository, digest: &Digest) -> Result<Box<dyn Read>> {
    let first = blob_path(repo, digest, repo.compressed);
    let second = blob_path(repo, digest, !repo.compressed);
    for path in [first, second] {
        if path.exists() {
            let file = File::open(&path)?;
            return Ok(if is_gz(&path) {
                Box::new(GzDecoder::new(file))
            } else {
                Box::new(file)
            });
        }
    }
    Err(Error::BlobNotFound {
        digest: digest.to_hex(),
    })
}

/// Rewrites every uncompressed blob into gzip form. The lock is taken per
/// shard directory, not for the whole pass, so readers and writers of other
/// shards are not starved for the repository's lifetime.
pub fn compress_repository(repo: &Repository) -> Result<u64> {
    transform_blobs(repo, true)
}

/// Rewrites every gzip blob back to plain form, shard by shard.
pub fn uncompress_repository(repo: &Repository) -> Result<u64> {
    transform_blobs(repo, false)
}

fn transform_blobs(repo: &Repository, to_compressed: bool) -> Result<u64> {
    if !repo.base_dir.is_dir() {
        return Err(Error::RepositoryNotFound {
            path: repo.base_dir.clone(),
        });
    }
    let mut rewritten = 0u64;
    for entry in fs::read_dir(&repo.base_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let shard_name = entry.file_name().to_string_lossy().to_string();
        if shard_name.len() != crate::digest::SHARD_PREFIX_LEN {
            continue;
        }
        let _lock = RepoLock::acquire(
            &repo.lock_path(),
            LockMode::Exclusive,
            DEFAULT_LOCK_TIMEOUT,
        )?;
        rewritten += transform_shard(&entry.path(), to_compressed)?;
    }
    info!(repo = %repo.name, rewritten, to_compressed, "rewrote blob compression state");
    Ok(rewritten)
}

fn transform_shard(shard_dir: &Path, to_compressed: bool) -> Result<u64> {
    let mut rewritten = 0u64;
    for entry in fs::read_dir(shard_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || is_gz(&path) == to_compressed {
            continue;
        }
        let mut bytes = Vec::new();
        if is_gz(&path) {
            GzDecoder::new(File::open(&path)?).read_to_end(&mut bytes)?;
        } else {
            File::open(&path)?.read_to_end(&mut bytes)?;
        }
        let target = if to_compressed {
            let mut name = path.as_os_str().to_os_string();
            name.push(".gz");
            PathBuf::from(name)
        } else {
            path.with_extension("")
        };
        write_blob(&target, &bytes, to_compressed)?;
        fs::remove_file(&path)?;
        rewritten += 1;
    }
    Ok(rewritten)
}

fn blob_path(repo: &Repository, digest: &Digest, compressed: bool) -> PathBuf {
    let (prefix, suffix) = digest.shard();
    let mut path = repo.shard_dir(&prefix).join(suffix);
    if compressed {
        let mut name = path.into_os_string();
        name.push(".gz");
        path = PathBuf::from(name);
    }
    path
}

fn existing_blob_path(repo: &Repository, digest: &Digest) -> Option<PathBuf> {
    [
        blob_path(repo, digest, repo.compressed),
        blob_path(repo, digest, !repo.compressed),
    ]
    .into_iter()
    .find(|p| p.exists())
}

fn stored_blob_size(repo: &Repository, digest: &Digest) -> Result<u64> {
    match existing_blob_path(repo, digest) {
        Some(path) => Ok(fs::metadata(&path)?.len()),
        None => Err(Error::BlobNotFound {
            digest: digest.to_hex(),
        }),
    }
}

fn is_gz(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

fn write_blob(target: &Path, bytes: &[u8], compressed: bool) -> Result<()> {
    // Blobs are created read-only; clear any leftover file so create() can
    // open it for writing.
    if target.exists() {
        fs::remove_file(target)?;
    }
    {
        let file = File::create(target)?;
        if compressed {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(bytes)?;
            encoder.finish()?;
        } else {
            let mut file = file;
            file.write_all(bytes)?;
        }
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(target, fs::Permissions::from_mode(BLOB_MODE))?;
    }
    Ok(())
}

fn load_table(repo: &Repository) -> Result<RefCountTable> {
    let path = repo.refcount_path();
    if !path.exists() {
        return Err(Error::RepositoryNotFound {
            path: repo.base_dir.clone(),
        });
    }
    let bytes = fs::read(&path)?;
    bincode::deserialize(&bytes).map_err(|err| Error::RepositoryCorrupt {
        path: path.clone(),
        reason: err.to_string(),
    })
}

fn persist_table(repo: &Repository, table: &RefCountTable) -> Result<()> {
    let path = repo.refcount_path();
    let tmp = path.with_extension("tmp");
    let bytes = bincode::serialize(table)?;
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_repo(dir: &TempDir, compressed: bool) -> Repository {
        let repo = Repository::new("test", dir.path().join("repo"), compressed);
        init_repository(&repo).unwrap();
        repo
    }

    fn write_source(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_store_deduplicates_by_content() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir, false);
        let f1 = write_source(&dir, "f1.txt", b"hello");
        let f2 = write_source(&dir, "f2.txt", b"hello");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let d1 = handle.store(&f1).unwrap();
        let d2 = handle.store(&f2).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(handle.table.get(&d1), Some(2));

        let d3 = handle.store(&f1).unwrap();
        assert_eq!(handle.table.get(&d3), Some(3));

        handle.release(&d1).unwrap();
        assert_eq!(handle.table.get(&d1), Some(2));

        let counts = handle.get_counts();
        assert_eq!(counts.referenced, 1);
        assert_eq!(counts.unreferenced, 0);
        assert_eq!(counts.total_refs, 2);
    }

    #[test]
    fn test_store_writes_content_once() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir, false);
        let f1 = write_source(&dir, "f1.txt", b"same bytes");
        let f2 = write_source(&dir, "f2.txt", b"same bytes");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let digest = handle.store(&f1).unwrap();
        handle.store(&f2).unwrap();
        drop(handle);

        let (prefix, _) = digest.shard();
        let shard_entries: Vec<_> = fs::read_dir(repo.shard_dir(&prefix))
            .unwrap()
            .collect::<std::io::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(shard_entries.len(), 1);
    }

    #[test]
    fn test_counts_persist_across_sessions() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir, false);
        let f1 = write_source(&dir, "f1.txt", b"persisted");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let digest = handle.store(&f1).unwrap();
        handle.close().unwrap();

        let handle = StoreHandle::open(&repo, false).unwrap();
        assert_eq!(handle.table.get(&digest), Some(1));
        let stats = handle.get_storage_stats(&digest).unwrap();
        assert_eq!(stats.ref_count, 1);
        assert!(stats.stored_size > 0);
    }

    #[test]
    fn test_retrieve_round_trip_compressed() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir, true);
        let f1 = write_source(&dir, "f1.txt", b"squeeze me");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let digest = handle.store(&f1).unwrap();

        let mut content = Vec::new();
        handle
            .retrieve(&digest)
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"squeeze me");
    }

    #[test]
    fn test_prune_removes_only_zero_referenced() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir, false);
        let keep = write_source(&dir, "keep.txt", b"keep");
        let drop_me = write_source(&dir, "drop.txt", b"drop");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let kept = handle.store(&keep).unwrap();
        let dropped = handle.store(&drop_me).unwrap();
        handle.release(&dropped).unwrap();

        let (removed, freed) = handle.prune_unreferenced().unwrap();
        assert_eq!(removed, 1);
        assert_eq!(freed, 4);
        assert!(handle.table.contains(&kept));
        assert!(!handle.table.contains(&dropped));
        assert!(handle.retrieve(&kept).is_ok());
    }

    #[test]
    fn test_release_on_read_only_handle_fails() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir, false);
        let f1 = write_source(&dir, "f1.txt", b"x");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let digest = handle.store(&f1).unwrap();
        handle.close().unwrap();

        let mut reader = StoreHandle::open(&repo, false).unwrap();
        assert!(matches!(
            reader.release(&digest),
            Err(Error::ReadOnlyHandle)
        ));
    }

    #[test]
    fn test_corrupt_table_surfaces_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir, false);
        fs::write(repo.refcount_path(), b"\xff\xff\xff\xff").unwrap();

        assert!(matches!(
            StoreHandle::open(&repo, false),
            Err(Error::RepositoryCorrupt { .. })
        ));
    }

    #[test]
    fn test_init_twice_already_exists() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir, false);
        assert!(matches!(
            init_repository(&repo),
            Err(Error::RepositoryExists { .. })
        ));
    }

    #[test]
    fn test_compress_repository_rewrites_blobs() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir, false);
        let f1 = write_source(&dir, "f1.txt", b"soon to be gzipped");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let digest = handle.store(&f1).unwrap();
        handle.close().unwrap();

        let rewritten = compress_repository(&repo).unwrap();
        assert_eq!(rewritten, 1);

        // Policy still says uncompressed; retrieval probes the .gz form.
        let mut content = Vec::new();
        open_blob(&repo, &digest)
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"soon to be gzipped");

        let restored = uncompress_repository(&repo).unwrap();
        assert_eq!(restored, 1);
        let mut content = Vec::new();
        open_blob(&repo, &digest)
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"soon to be gzipped");
    }

    #[test]
    fn test_storage_totals_account_for_sharing() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir, false);
        let f1 = write_source(&dir, "f1.txt", b"shared-content");
        let f2 = write_source(&dir, "f2.txt", b"shared-content");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        handle.store(&f1).unwrap();
        handle.store(&f2).unwrap();

        let totals = handle.get_storage_totals().unwrap();
        assert_eq!(totals.stored_bytes, 14);
        assert_eq!(totals.gross_bytes, 28);
        assert_eq!(totals.shared_bytes, 7);
    }
}
