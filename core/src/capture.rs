use crate::archive::Archive;
use crate::snapfile::{snapshot_name_now, SnapshotFile};
use crate::store::{StoreCounts, StoreHandle};
use crate::tree::{FileAttributes, FileEntry, LinkEntry, SnapshotTree};
use crate::{Digest, Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Statistics accumulated over one capture run and persisted inside the
/// snapshot file. `elapsed` is an opaque wall-clock record for callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// File entries recorded in the tree.
    pub files_total: u64,
    /// Files whose content was stored for the first time.
    pub files_new: u64,
    /// Content bytes across all recorded files.
    pub bytes_total: u64,
    /// Content bytes newly written to the repository.
    pub bytes_new: u64,
    pub file_links: u64,
    pub dir_links: u64,
    pub broken_links: u64,
    pub skipped_broken_links: u64,
    /// Unique content items this snapshot added to the repository.
    pub items_created: u64,
    /// References this snapshot added, including dedup hits.
    pub items_referenced: u64,
    /// Per-item failures that were skipped.
    pub errors: u64,
    pub elapsed: Duration,
}

/// Compiled exclude rules: directory globs and file globs, each tested
/// against both the bare name and the fully qualified path.
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    dirs: Vec<glob::Pattern>,
    files: Vec<glob::Pattern>,
}

impl ExcludeFilter {
    pub fn new(dir_globs: &[String], file_globs: &[String]) -> Result<Self> {
        Ok(Self {
            dirs: compile(dir_globs)?,
            files: compile(file_globs)?,
        })
    }

    pub fn excludes_dir(&self, path: &Path) -> bool {
        any_match(&self.dirs, path)
    }

    pub fn excludes_file(&self, path: &Path) -> bool {
        any_match(&self.files, path)
    }
}

fn compile(globs: &[String]) -> Result<Vec<glob::Pattern>> {
    globs
        .iter()
        .map(|g| {
            glob::Pattern::new(g).map_err(|source| Error::InvalidPattern {
                pattern: g.clone(),
                source,
            })
        })
        .collect()
}

fn any_match(patterns: &[glob::Pattern], path: &Path) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let name = path.file_name().map(|n| n.to_string_lossy().to_string());
    let full = path.to_string_lossy();
    patterns.iter().any(|pattern| {
        name.as_deref().map(|n| pattern.matches(n)).unwrap_or(false) || pattern.matches(&full)
    })
}

/// One capture run: walks the archive's include paths, stores file content
/// into the repository, and builds the snapshot tree.
///
/// Content references taken by the run are provisional until
/// [`write_snapshot`](Self::write_snapshot) succeeds; a capture dropped
/// before that point releases everything it stored, so an aborted run leaks
/// no reference counts.
pub struct SnapshotCapture<'a> {
    archive: &'a Archive,
    handle: &'a mut StoreHandle,
    excludes: ExcludeFilter,
    tree: SnapshotTree,
    stats: CaptureStats,
    stored: Vec<Digest>,
    deferred_dirs: Vec<PathBuf>,
    deferred_files: Vec<PathBuf>,
    counts_before: StoreCounts,
    started: Instant,
    written: bool,
}

impl<'a> SnapshotCapture<'a> {
    pub fn new(archive: &'a Archive, handle: &'a mut StoreHandle) -> Result<Self> {
        let excludes = ExcludeFilter::new(&archive.exclude_dirs, &archive.exclude_files)?;
        let counts_before = handle.get_counts();
        Ok(Self {
            archive,
            handle,
            excludes,
            tree: SnapshotTree::new_root(),
            stats: CaptureStats::default(),
            stored: Vec::new(),
            deferred_dirs: Vec::new(),
            deferred_files: Vec::new(),
            counts_before,
            started: Instant::now(),
            written: false,
        })
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    pub fn tree(&self) -> &SnapshotTree {
        &self.tree
    }

    /// Walks every include item and then the deferred symlink targets:
    /// directory targets first, file targets second, so file targets that
    /// live inside a directory target are already present and skipped.
    pub fn run(&mut self) -> Result<()> {
        let includes = self.archive.includes.clone();
        for include in &includes {
            self.add_include(include)?;
        }

        let dirs = std::mem::take(&mut self.deferred_dirs);
        for dir in dirs {
            self.walk_dir(&dir)?;
        }
        let files = std::mem::take(&mut self.deferred_files);
        for file in files {
            self.add_file(&file)?;
        }
        Ok(())
    }

    /// Finalizes the run: computes the created/referenced deltas, stamps the
    /// elapsed time, and writes the snapshot file named by the current local
    /// timestamp. After this the stored references are permanent.
    pub fn write_snapshot(&mut self) -> Result<PathBuf> {
        let after = self.handle.get_counts();
        self.stats.items_created = after.referenced.saturating_sub(self.counts_before.referenced);
        self.stats.items_referenced =
            after.total_refs.saturating_sub(self.counts_before.total_refs);
        self.stats.elapsed = self.started.elapsed();

        let snapshot = SnapshotFile {
            tree: std::mem::take(&mut self.tree),
            stats: self.stats.clone(),
            repository: self.archive.repository.clone(),
        };
        let name = snapshot_name_now();
        let path = snapshot.write(
            &self.archive.snapshot_dir,
            &name,
            self.archive.compress_snapshots,
        )?;
        self.written = true;
        Ok(path)
    }

    /// Explicit inclusion always wins over exclude globs, so include items
    /// are dispatched without consulting the filter.
    fn add_include(&mut self, path: &Path) -> Result<()> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %path.display(), %err, "include item unreadable, skipping");
                self.stats.errors += 1;
                return Ok(());
            }
        };
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            self.record_symlink(path, true)
        } else if file_type.is_dir() {
            self.walk_dir(path)
        } else {
            self.add_file(path)
        }
    }

    fn walk_dir(&mut self, root: &Path) -> Result<()> {
        let excludes = self.excludes.clone();
        let walker = WalkDir::new(root).follow_links(false).into_iter();
        // Excluded directories are pruned in place: the walker never
        // descends into them, so their size costs nothing.
        for entry in walker.filter_entry(move |e| {
            e.depth() == 0 || !(e.file_type().is_dir() && excludes.excludes_dir(e.path()))
        }) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err.io_error().map(is_vanished).unwrap_or(false) {
                        debug!(%err, "entry vanished during walk");
                        continue;
                    }
                    return Err(Error::Io(err.into_io_error().unwrap_or_else(|| {
                        std::io::Error::other("directory walk failed")
                    })));
                }
            };
            let path = entry.path();
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                self.record_symlink(path, false)?;
            } else if file_type.is_dir() {
                self.tree.find_or_create_subdir(path, lstat_attrs);
            } else if file_type.is_file() {
                if entry.depth() > 0 && self.excludes.excludes_file(path) {
                    debug!(path = %path.display(), "file excluded by glob");
                    continue;
                }
                self.add_file(path)?;
            }
        }
        Ok(())
    }

    fn add_file(&mut self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return Ok(()),
        };
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => return Ok(()),
        };

        let node = self.tree.find_or_create_subdir(&parent, lstat_attrs);
        if node.files.contains_key(&name) {
            // Already captured through another route (deferred link target
            // inside a walked directory); storing again would double-count.
            debug!(path = %path.display(), "file already present in tree");
            return Ok(());
        }

        let attrs = match fs::symlink_metadata(path) {
            Ok(metadata) => FileAttributes::from_metadata(&metadata),
            Err(err) if is_vanished(&err) => {
                debug!(path = %path.display(), "file vanished before capture");
                return Ok(());
            }
            Err(err) => return Err(Error::Io(err)),
        };

        let digest = match self.handle.store(path) {
            Ok(digest) => digest,
            Err(Error::ContentReadFailed { path, source }) => {
                warn!(path = %path.display(), %source, "failed to read file, skipping");
                self.stats.errors += 1;
                return Ok(());
            }
            Err(Error::Io(err)) => {
                warn!(path = %path.display(), %err, "failed to store file, skipping");
                self.stats.errors += 1;
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        self.stored.push(digest);

        let newly_stored = self.handle.ref_count(&digest) == Some(1);
        self.stats.files_total += 1;
        self.stats.bytes_total += attrs.size;
        if newly_stored {
            self.stats.files_new += 1;
            self.stats.bytes_new += attrs.size;
        }

        let node = self.tree.find_or_create_subdir(&parent, lstat_attrs);
        node.files.insert(name, FileEntry { attrs, digest });
        Ok(())
    }

    /// Records a symlink with its literal target. Explicitly included links
    /// are always recorded and, when their target resolves, queued for the
    /// deferred traversal passes; links met during a walk are recorded only,
    /// and broken ones honor the archive's skip policy.
    fn record_symlink(&mut self, path: &Path, explicit: bool) -> Result<()> {
        let target = match fs::read_link(path) {
            Ok(target) => target,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read symlink, skipping");
                self.stats.errors += 1;
                return Ok(());
            }
        };
        let attrs = lstat_attrs(path);
        let resolved = fs::metadata(path);
        let broken = resolved.is_err();

        if broken && self.archive.skip_broken_symlinks && !explicit {
            debug!(path = %path.display(), "skipping broken symlink per archive policy");
            self.stats.skipped_broken_links += 1;
            return Ok(());
        }

        let parent = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return Ok(()),
        };
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => return Ok(()),
        };
        let node = self.tree.find_or_create_subdir(&parent, lstat_attrs);

        match resolved {
            Ok(metadata) if metadata.is_dir() => {
                node.dir_links.insert(
                    name,
                    LinkEntry {
                        attrs,
                        target: target.clone(),
                        broken: false,
                    },
                );
                self.stats.dir_links += 1;
                if explicit {
                    self.deferred_dirs.push(resolve_target(path, &target));
                }
            }
            Ok(_) => {
                node.file_links.insert(
                    name,
                    LinkEntry {
                        attrs,
                        target: target.clone(),
                        broken: false,
                    },
                );
                self.stats.file_links += 1;
                if explicit {
                    self.deferred_files.push(resolve_target(path, &target));
                }
            }
            Err(_) => {
                // Target kind unknowable; recorded as a content-less file
                // link entry.
                node.file_links.insert(
                    name,
                    LinkEntry {
                        attrs,
                        target,
                        broken: true,
                    },
                );
                self.stats.broken_links += 1;
            }
        }
        Ok(())
    }
}

impl Drop for SnapshotCapture<'_> {
    fn drop(&mut self) {
        if self.written || self.stored.is_empty() {
            return;
        }
        let stored = std::mem::take(&mut self.stored);
        warn!(
            count = stored.len(),
            archive = %self.archive.name,
            "capture abandoned before write, rolling back references"
        );
        if let Err(err) = self.handle.release_many(stored) {
            warn!(%err, "failed to roll back provisional references");
        }
    }
}

fn lstat_attrs(path: &Path) -> FileAttributes {
    match fs::symlink_metadata(path) {
        Ok(metadata) => FileAttributes::from_metadata(&metadata),
        Err(err) => {
            debug!(path = %path.display(), %err, "failed to stat, recording default attributes");
            FileAttributes::default()
        }
    }
}

/// Absolute location of a symlink's target, for deferred traversal.
fn resolve_target(link: &Path, target: &Path) -> PathBuf {
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.parent()
            .map(|p| p.join(target))
            .unwrap_or_else(|| target.to_path_buf())
    };
    fs::canonicalize(&joined).unwrap_or(joined)
}

/// Race-with-the-filesystem errors that a walk simply rides over.
fn is_vanished(err: &std::io::Error) -> bool {
    const ENXIO: i32 = 6;
    err.kind() == std::io::ErrorKind::NotFound || err.raw_os_error() == Some(ENXIO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Repository;
    use crate::snapfile::{delete_snapshot, list_snapshots};
    use crate::store::init_repository;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Repository, Archive) {
        let repo = Repository::new("r", dir.path().join("repo"), false);
        init_repository(&repo).unwrap();
        let archive = Archive::new(
            "a",
            "r",
            dir.path().join("snapshots"),
            vec![dir.path().join("src")],
        );
        (repo, archive)
    }

    fn write_src(dir: &TempDir, rel: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join("src").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_duplicate_content_stored_once() {
        let dir = TempDir::new().unwrap();
        let (repo, archive) = setup(&dir);
        write_src(&dir, "file.txt", b"hello");
        write_src(&dir, "dup.txt", b"hello");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();
        capture.write_snapshot().unwrap();
        drop(capture);

        let counts = handle.get_counts();
        assert_eq!(counts.referenced, 1);
        assert_eq!(counts.total_refs, 2);
    }

    #[test]
    fn test_scenario_capture_delete_prune() {
        let dir = TempDir::new().unwrap();
        let (repo, archive) = setup(&dir);
        write_src(&dir, "file.txt", b"hello");
        write_src(&dir, "dup.txt", b"hello");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();
        capture.write_snapshot().unwrap();
        drop(capture);

        let names = list_snapshots(&archive.snapshot_dir).unwrap();
        assert_eq!(names.len(), 1);

        let snapshot = SnapshotFile::load(&archive.snapshot_dir, &names[0]).unwrap();
        let src_dir = snapshot
            .tree
            .find_dir(&dir.path().join("src"))
            .expect("src dir in tree");
        assert_eq!(src_dir.files.len(), 2);
        let digests: Vec<_> = src_dir.files.values().map(|f| f.digest).collect();
        assert_eq!(digests[0], digests[1]);

        delete_snapshot(&archive.snapshot_dir, &names[0], &mut handle, true).unwrap();
        let counts = handle.get_counts();
        assert_eq!(counts.referenced, 0);
        assert_eq!(counts.unreferenced, 1);

        let (removed, freed) = handle.prune_unreferenced().unwrap();
        assert_eq!(removed, 1);
        assert_eq!(freed, 5);
    }

    #[test]
    fn test_excluded_dir_absent_from_tree() {
        let dir = TempDir::new().unwrap();
        let (repo, mut archive) = setup(&dir);
        write_src(&dir, "keep/wanted.txt", b"wanted");
        write_src(&dir, "node_modules/dep/huge.js", b"var x;");
        archive.exclude_dirs = vec!["node_modules".to_string()];

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();

        let src = dir.path().join("src");
        assert!(capture.tree().find_dir(&src.join("keep")).is_some());
        assert!(capture.tree().find_dir(&src.join("node_modules")).is_none());
        assert_eq!(capture.tree().file_count(), 1);
    }

    #[test]
    fn test_exclude_file_glob() {
        let dir = TempDir::new().unwrap();
        let (repo, mut archive) = setup(&dir);
        write_src(&dir, "main.rs", b"fn main() {}");
        write_src(&dir, "core.bak", b"old");
        archive.exclude_files = vec!["*.bak".to_string()];

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();

        let src = dir.path().join("src");
        assert!(capture.tree().find_file(&src.join("main.rs")).is_some());
        assert!(capture.tree().find_file(&src.join("core.bak")).is_none());
    }

    #[test]
    fn test_broken_symlink_policy() {
        let dir = TempDir::new().unwrap();
        let (repo, mut archive) = setup(&dir);
        write_src(&dir, "real.txt", b"real");
        let src = dir.path().join("src");
        symlink(src.join("missing.txt"), src.join("dangling")).unwrap();

        // Skipped entirely when the policy says so.
        archive.skip_broken_symlinks = true;
        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();
        let node = capture.tree().find_dir(&src).unwrap();
        assert!(node.file_links.is_empty());
        assert_eq!(capture.stats().skipped_broken_links, 1);
        drop(capture);

        // Recorded as a content-less link entry otherwise.
        archive.skip_broken_symlinks = false;
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();
        let node = capture.tree().find_dir(&src).unwrap();
        let entry = node.file_links.get("dangling").expect("dangling recorded");
        assert!(entry.broken);
        assert_eq!(capture.stats().broken_links, 1);
    }

    #[test]
    fn test_valid_symlinks_recorded_with_targets() {
        let dir = TempDir::new().unwrap();
        let (repo, archive) = setup(&dir);
        write_src(&dir, "data/file.txt", b"content");
        let src = dir.path().join("src");
        symlink(src.join("data/file.txt"), src.join("file_link")).unwrap();
        symlink(src.join("data"), src.join("dir_link")).unwrap();

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();

        let node = capture.tree().find_dir(&src).unwrap();
        assert_eq!(
            node.file_links.get("file_link").unwrap().target,
            src.join("data/file.txt")
        );
        assert_eq!(
            node.dir_links.get("dir_link").unwrap().target,
            src.join("data")
        );
        assert_eq!(capture.stats().file_links, 1);
        assert_eq!(capture.stats().dir_links, 1);
    }

    #[test]
    fn test_abandoned_capture_rolls_back_references() {
        let dir = TempDir::new().unwrap();
        let (repo, archive) = setup(&dir);
        write_src(&dir, "file.txt", b"provisional");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();
        drop(capture); // no write_snapshot

        let counts = handle.get_counts();
        assert_eq!(counts.total_refs, 0);
        assert_eq!(counts.unreferenced, 1);
    }

    #[test]
    fn test_explicit_symlink_include_traverses_target_once() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::new("r", dir.path().join("repo"), false);
        init_repository(&repo).unwrap();

        // The real data lives outside the include set; only a symlink to it
        // is included explicitly.
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("inside.txt"), b"via link").unwrap();
        let link = dir.path().join("entry");
        symlink(&data, &link).unwrap();

        let archive = Archive::new("a", "r", dir.path().join("snapshots"), vec![link.clone()]);

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();

        let parent = capture.tree().find_dir(dir.path()).unwrap();
        assert!(parent.dir_links.contains_key("entry"));
        assert!(capture
            .tree()
            .find_file(&data.join("inside.txt"))
            .is_some());
        assert_eq!(capture.stats().files_total, 1);
    }

    #[test]
    fn test_unreadable_file_skipped_capture_continues() {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let dir = TempDir::new().unwrap();
        // Root reads through any permission bits; nothing to exercise then.
        if fs::metadata(dir.path()).unwrap().uid() == 0 {
            return;
        }
        let (repo, archive) = setup(&dir);
        write_src(&dir, "readable.txt", b"fine");
        let locked = write_src(&dir, "locked.txt", b"secret");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();

        let src = dir.path().join("src");
        assert_eq!(capture.stats().errors, 1);
        assert_eq!(capture.stats().files_total, 1);
        assert!(capture.tree().find_file(&src.join("readable.txt")).is_some());
        assert!(capture.tree().find_file(&src.join("locked.txt")).is_none());
    }

    #[test]
    fn test_stats_track_new_vs_referenced() {
        let dir = TempDir::new().unwrap();
        let (repo, archive) = setup(&dir);
        write_src(&dir, "a.txt", b"same");
        write_src(&dir, "b.txt", b"same");
        write_src(&dir, "c.txt", b"other");

        let mut handle = StoreHandle::open(&repo, true).unwrap();
        let mut capture = SnapshotCapture::new(&archive, &mut handle).unwrap();
        capture.run().unwrap();
        capture.write_snapshot().unwrap();
        let stats = capture.stats().clone();
        drop(capture);

        assert_eq!(stats.files_total, 3);
        assert_eq!(stats.files_new, 2);
        assert_eq!(stats.items_created, 2);
        assert_eq!(stats.items_referenced, 3);
    }
}
