use crate::snapfile::{SnapshotFile, SNAPSHOT_TIMESTAMP_FORMAT};
use crate::store::StoreHandle;
use crate::tree::{FileEntry, LinkEntry, SnapshotTree};
use crate::{Digest, Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Statistics for one restore run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub dirs_created: u64,
    pub files_restored: u64,
    /// Files left untouched because the content at the destination already
    /// matched the snapshot digest.
    pub files_unchanged: u64,
    /// Differing destination files renamed out of the way instead of
    /// overwritten.
    pub files_moved_aside: u64,
    pub hard_links: u64,
    pub symlinks: u64,
    /// Content bytes the restored entries represent, hard links included.
    pub bytes_gross: u64,
    /// Bytes actually copied out of the repository.
    pub bytes_written: u64,
    /// Per-item failures that were logged and skipped.
    pub errors: u64,
    pub elapsed: Duration,
}

/// Looks up a directory node by its capture-time path.
///
/// Rejects relative paths and any `..` component, and reports a name that
/// exists as a directory symlink separately from a plain miss: a link is not
/// the directory itself, and following it silently would escape the tree.
pub fn get_subdir<'t>(tree: &'t SnapshotTree, path: &Path) -> Result<&'t SnapshotTree> {
    validate_query_path(path)?;
    let mut node = tree;
    let mut walked = PathBuf::from("/");
    for component in path.components() {
        if let Component::Normal(name) = component {
            let name = name.to_string_lossy();
            walked.push(name.as_ref());
            node = match node.subdirs.get(name.as_ref()) {
                Some(child) => child,
                None if node.dir_links.contains_key(name.as_ref()) => {
                    return Err(Error::IsSymbolicLink { path: walked });
                }
                None => return Err(Error::DirNotFound { path: walked }),
            };
        }
    }
    Ok(node)
}

/// Looks up a regular file entry by its capture-time path, with the same
/// path validation and symlink distinction as [`get_subdir`].
pub fn get_file<'t>(tree: &'t SnapshotTree, path: &Path) -> Result<&'t FileEntry> {
    validate_query_path(path)?;
    let parent = path.parent().ok_or_else(|| Error::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let name = path
        .file_name()
        .ok_or_else(|| Error::FileNotFound {
            path: path.to_path_buf(),
        })?
        .to_string_lossy();
    let dir = get_subdir(tree, parent)?;
    if let Some(entry) = dir.files.get(name.as_ref()) {
        return Ok(entry);
    }
    if dir.file_links.contains_key(name.as_ref()) || dir.dir_links.contains_key(name.as_ref()) {
        return Err(Error::IsSymbolicLink {
            path: path.to_path_buf(),
        });
    }
    Err(Error::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn validate_query_path(path: &Path) -> Result<()> {
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir));
    if !path.is_absolute() || escapes {
        return Err(Error::OutsideSnapshot {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// One restore run: materializes directories, symlinks, and files from a
/// snapshot into a target directory, in that order, then applies directory
/// attributes deepest-first so writing children does not disturb restored
/// timestamps.
///
/// Source paths are re-rooted under the target, so `/home/alice/doc.txt`
/// restored into `/tmp/out` lands at `/tmp/out/home/alice/doc.txt`.
///
/// Files that shared an inode at capture time are recreated as hard links to
/// each other, but only among files restored by this same run; links to
/// paths outside the run cannot be known and are restored as plain copies.
pub struct SnapshotRestore<'a> {
    snapshot: &'a SnapshotFile,
    handle: &'a StoreHandle,
    target_dir: PathBuf,
    overwrite: bool,
    stats: RestoreStats,
    /// First restored destination per source inode, for hard-link recreation.
    inodes: HashMap<(u64, u64), PathBuf>,
    started: Instant,
}

impl<'a> SnapshotRestore<'a> {
    pub fn new(
        snapshot: &'a SnapshotFile,
        handle: &'a StoreHandle,
        target_dir: impl Into<PathBuf>,
        overwrite: bool,
    ) -> Self {
        Self {
            snapshot,
            handle,
            target_dir: target_dir.into(),
            overwrite,
            stats: RestoreStats::default(),
            inodes: HashMap::new(),
            started: Instant::now(),
        }
    }

    pub fn stats(&self) -> &RestoreStats {
        &self.stats
    }

    /// Restores the whole snapshot.
    pub fn restore_all(&mut self) -> Result<RestoreStats> {
        self.restore_dir(Path::new("/"))
    }

    /// Restores the subtree rooted at `source` (a capture-time path).
    pub fn restore_dir(&mut self, source: &Path) -> Result<RestoreStats> {
        let node = get_subdir(&self.snapshot.tree, source)?;
        let dirs: Vec<(PathBuf, &SnapshotTree)> = node
            .walk()
            .map(|(walked, subtree)| (rebase(source, &walked), subtree))
            .collect();

        for (path, _) in &dirs {
            let dest = self.destination(path);
            if !dest.is_dir() {
                fs::create_dir_all(&dest)?;
                self.stats.dirs_created += 1;
            }
        }
        for (path, subtree) in &dirs {
            for (name, entry) in &subtree.dir_links {
                self.place_symlink(&path.join(name), entry)?;
            }
        }
        for (path, subtree) in &dirs {
            for (name, entry) in &subtree.files {
                self.place_file(&path.join(name), entry)?;
            }
        }
        for (path, subtree) in &dirs {
            for (name, entry) in &subtree.file_links {
                self.place_symlink(&path.join(name), entry)?;
            }
        }
        for (path, subtree) in dirs.iter().rev() {
            let dest = self.destination(path);
            if let Err(err) = subtree.attrs.apply_to(&dest) {
                warn!(path = %dest.display(), %err, "failed to restore directory attributes");
                self.stats.errors += 1;
            }
        }

        self.stats.elapsed = self.started.elapsed();
        info!(
            source = %source.display(),
            target = %self.target_dir.display(),
            restored = self.stats.files_restored,
            unchanged = self.stats.files_unchanged,
            "restore finished"
        );
        Ok(self.stats.clone())
    }

    /// Restores one file by its capture-time path.
    pub fn restore_file(&mut self, source: &Path) -> Result<RestoreStats> {
        let entry = get_file(&self.snapshot.tree, source)?.clone();
        let dest = self.destination(source);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        self.place_file(source, &entry)?;
        self.stats.elapsed = self.started.elapsed();
        Ok(self.stats.clone())
    }

    fn destination(&self, source: &Path) -> PathBuf {
        let relative = source.strip_prefix("/").unwrap_or(source);
        self.target_dir.join(relative)
    }

    fn place_file(&mut self, source: &Path, entry: &FileEntry) -> Result<()> {
        let dest = self.destination(source);

        match fs::symlink_metadata(&dest) {
            Ok(existing) if existing.file_type().is_symlink() => {
                return Err(Error::IsSymbolicLink { path: dest });
            }
            Ok(existing) if existing.is_dir() => {
                return Err(Error::RestoreConflict { path: dest });
            }
            Ok(_) => {
                if digest_of(&dest).as_ref() == Some(&entry.digest) {
                    debug!(path = %dest.display(), "destination already current");
                    self.stats.files_unchanged += 1;
                    self.stats.bytes_gross += entry.attrs.size;
                    return Ok(());
                }
                if self.overwrite {
                    fs::remove_file(&dest)?;
                } else {
                    self.move_aside(&dest)?;
                }
            }
            Err(_) => {}
        }

        self.stats.bytes_gross += entry.attrs.size;

        let inode_key = (entry.attrs.dev, entry.attrs.ino);
        if entry.attrs.ino != 0 {
            if let Some(first) = self.inodes.get(&inode_key) {
                fs::hard_link(first, &dest)?;
                self.stats.hard_links += 1;
                debug!(path = %dest.display(), "restored as hard link");
                return Ok(());
            }
        }

        match self
            .handle
            .copy_contents_to(&entry.digest, &dest, &entry.attrs)
        {
            Ok(()) => {}
            Err(Error::SetAttributesFailed { path, source }) => {
                // Content landed; only metadata failed.
                warn!(path = %path.display(), %source, "failed to restore file attributes");
                self.stats.errors += 1;
            }
            Err(err) => return Err(err),
        }
        if entry.attrs.ino != 0 {
            self.inodes.insert(inode_key, dest);
        }
        self.stats.files_restored += 1;
        self.stats.bytes_written += entry.attrs.size;
        Ok(())
    }

    /// Renames a differing destination file to a timestamped sibling rather
    /// than destroying it.
    fn move_aside(&mut self, dest: &Path) -> Result<()> {
        let stamp = chrono::Local::now()
            .format(SNAPSHOT_TIMESTAMP_FORMAT)
            .to_string();
        let mut name = dest.as_os_str().to_os_string();
        name.push(".");
        name.push(&stamp);
        let aside = PathBuf::from(name);
        fs::rename(dest, &aside)?;
        info!(from = %dest.display(), to = %aside.display(), "moved differing file aside");
        self.stats.files_moved_aside += 1;
        Ok(())
    }

    fn place_symlink(&mut self, source: &Path, entry: &LinkEntry) -> Result<()> {
        let dest = self.destination(source);
        match fs::symlink_metadata(&dest) {
            Ok(existing) if existing.file_type().is_symlink() => {
                fs::remove_file(&dest)?;
            }
            Ok(existing) if existing.is_dir() => {
                return Err(Error::RestoreConflict { path: dest });
            }
            Ok(_) if self.overwrite => {
                fs::remove_file(&dest)?;
            }
            Ok(_) => {
                return Err(Error::RestoreConflict { path: dest });
            }
            Err(_) => {}
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&entry.target, &dest)?;
        if let Err(err) = entry.attrs.apply_to_symlink(&dest) {
            warn!(path = %dest.display(), %err, "failed to restore symlink ownership");
            self.stats.errors += 1;
        }
        self.stats.symlinks += 1;
        Ok(())
    }
}

/// Joins a walk-relative path back onto the restore source root.
fn rebase(source: &Path, walked: &Path) -> PathBuf {
    let mut full = source.to_path_buf();
    for component in walked.components().skip(1) {
        full.push(component);
    }
    full
}

fn digest_of(path: &Path) -> Option<Digest> {
    fs::read(path).ok().map(|bytes| Digest::of_bytes(&bytes))
}
