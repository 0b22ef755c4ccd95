use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Filesystem attributes captured per entry and applied back on restore.
///
/// `dev`/`ino` identify the source inode so that hard-link topology can be
/// recreated within a restore run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub size: u64,
    pub dev: u64,
    pub ino: u64,
}

impl FileAttributes {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            mode: metadata.mode(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            atime: metadata.atime(),
            mtime: metadata.mtime(),
            size: metadata.len(),
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Applies mode, ownership, and timestamps to an existing path.
    #[cfg(unix)]
    pub fn apply_to(&self, path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(self.mode);
        std::fs::set_permissions(path, permissions)?;
        std::os::unix::fs::chown(path, Some(self.uid), Some(self.gid))?;
        filetime::set_file_times(
            path,
            filetime::FileTime::from_unix_time(self.atime, 0),
            filetime::FileTime::from_unix_time(self.mtime, 0),
        )
    }

    /// Applies ownership to a symlink itself, without following it. Mode and
    /// timestamps are not meaningful on the link.
    #[cfg(unix)]
    pub fn apply_to_symlink(&self, path: &Path) -> std::io::Result<()> {
        std::os::unix::fs::lchown(path, Some(self.uid), Some(self.gid))
    }
}

/// A regular file inside a snapshot: attributes plus the digest of its
/// content. The bytes themselves live in the blob repository; the tree holds
/// only the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub attrs: FileAttributes,
    pub digest: Digest,
}

/// A symbolic link inside a snapshot, with its literal (unresolved) target
/// and whether that target resolved at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub attrs: FileAttributes,
    pub target: PathBuf,
    pub broken: bool,
}

/// One directory of a snapshot.
///
/// Each node stores its own name and four name-keyed child maps: owned
/// subdirectory nodes, regular files, symlinks to files, and symlinks to
/// directories. Names are unique within each map. Mutation happens only
/// while a capture is building the tree; deserialized trees are handed out
/// behind shared references and stay sealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTree {
    pub name: String,
    pub attrs: FileAttributes,
    pub subdirs: BTreeMap<String, SnapshotTree>,
    pub files: BTreeMap<String, FileEntry>,
    pub file_links: BTreeMap<String, LinkEntry>,
    pub dir_links: BTreeMap<String, LinkEntry>,
}

impl SnapshotTree {
    pub fn new(name: impl Into<String>, attrs: FileAttributes) -> Self {
        Self {
            name: name.into(),
            attrs,
            subdirs: BTreeMap::new(),
            files: BTreeMap::new(),
            file_links: BTreeMap::new(),
            dir_links: BTreeMap::new(),
        }
    }

    /// Root node representing `/`.
    pub fn new_root() -> Self {
        Self::new("/", FileAttributes::default())
    }

    /// Number of entries across all four child categories.
    pub fn child_count(&self) -> usize {
        self.subdirs.len() + self.files.len() + self.file_links.len() + self.dir_links.len()
    }

    /// Returns the node for `path`, creating the directory chain as needed.
    ///
    /// Idempotent: existing nodes are returned untouched. `attrs_for` is
    /// consulted once for each newly created ancestor, with the absolute
    /// path of that ancestor.
    pub fn find_or_create_subdir<F>(&mut self, path: &Path, mut attrs_for: F) -> &mut SnapshotTree
    where
        F: FnMut(&Path) -> FileAttributes,
    {
        let mut node = self;
        let mut current = PathBuf::from("/");
        for component in path.components() {
            if let Component::Normal(name) = component {
                let name = name.to_string_lossy().to_string();
                current.push(&name);
                node = node
                    .subdirs
                    .entry(name.clone())
                    .or_insert_with(|| SnapshotTree::new(name, attrs_for(&current)));
            }
        }
        node
    }

    pub fn find_dir(&self, path: &Path) -> Option<&SnapshotTree> {
        let mut node = self;
        for component in path.components() {
            if let Component::Normal(name) = component {
                node = node.subdirs.get(name.to_string_lossy().as_ref())?;
            }
        }
        Some(node)
    }

    pub fn find_file(&self, path: &Path) -> Option<&FileEntry> {
        let dir = self.find_dir(path.parent()?)?;
        let name = path.file_name()?.to_string_lossy();
        dir.files.get(name.as_ref())
    }

    /// Depth-first walk over this node and every subdirectory, yielding each
    /// directory with its full path. Lazy and restartable: each call returns
    /// a fresh iterator.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(PathBuf::from(&self.name), self)],
        }
    }

    /// All regular files in the tree with their full paths.
    pub fn files_recursive(&self) -> impl Iterator<Item = (PathBuf, &FileEntry)> + '_ {
        self.walk().flat_map(|(path, node)| {
            node.files
                .iter()
                .map(move |(name, entry)| (path.join(name), entry))
        })
    }

    /// All file symlinks in the tree with their full paths.
    pub fn file_links_recursive(&self) -> impl Iterator<Item = (PathBuf, &LinkEntry)> + '_ {
        self.walk().flat_map(|(path, node)| {
            node.file_links
                .iter()
                .map(move |(name, entry)| (path.join(name), entry))
        })
    }

    /// All directory symlinks in the tree with their full paths.
    pub fn dir_links_recursive(&self) -> impl Iterator<Item = (PathBuf, &LinkEntry)> + '_ {
        self.walk().flat_map(|(path, node)| {
            node.dir_links
                .iter()
                .map(move |(name, entry)| (path.join(name), entry))
        })
    }

    /// Digests of every file in the tree. Duplicates are yielded once per
    /// referencing entry, matching how reference counts were taken.
    pub fn digests(&self) -> impl Iterator<Item = Digest> + '_ {
        self.files_recursive().map(|(_, entry)| entry.digest)
    }

    pub fn file_count(&self) -> usize {
        self.files_recursive().count()
    }

    /// The canonical display root: the shallowest directory holding more
    /// than one child or any non-directory content. Skips the content-free
    /// path prefix a capture of a single deep directory would otherwise show.
    pub fn offset_base(&self) -> PathBuf {
        let mut node = self;
        let mut path = PathBuf::from("/");
        loop {
            let only_one_subdir = node.subdirs.len() == 1
                && node.files.is_empty()
                && node.file_links.is_empty()
                && node.dir_links.is_empty();
            if !only_one_subdir {
                return path;
            }
            match node.subdirs.iter().next() {
                Some((name, child)) => {
                    path.push(name);
                    node = child;
                }
                None => return path,
            }
        }
    }
}

impl Default for SnapshotTree {
    fn default() -> Self {
        Self::new_root()
    }
}

/// Explicit-stack iterator behind [`SnapshotTree::walk`]. Parents are always
/// yielded before their children.
pub struct Walk<'a> {
    stack: Vec<(PathBuf, &'a SnapshotTree)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (PathBuf, &'a SnapshotTree);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, node) = self.stack.pop()?;
        // Reverse so BTreeMap order is preserved on the stack.
        for (name, child) in node.subdirs.iter().rev() {
            self.stack.push((path.join(name), child));
        }
        Some((path, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> SnapshotTree {
        let mut tree = SnapshotTree::new_root();
        let node = tree.find_or_create_subdir(Path::new("/home/alice/project"), |_| {
            FileAttributes::default()
        });
        node.files.insert(
            "main.rs".to_string(),
            FileEntry {
                attrs: FileAttributes::default(),
                digest: Digest::of_bytes(b"fn main() {}"),
            },
        );
        node.files.insert(
            "lib.rs".to_string(),
            FileEntry {
                attrs: FileAttributes::default(),
                digest: Digest::of_bytes(b"pub fn lib() {}"),
            },
        );
        tree
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let mut tree = sample_tree();
        let before = tree.file_count();
        tree.find_or_create_subdir(Path::new("/home/alice/project"), |_| {
            panic!("existing chain must not be re-created")
        });
        assert_eq!(tree.file_count(), before);
    }

    #[test]
    fn test_find_dir_and_file() {
        let tree = sample_tree();
        assert!(tree.find_dir(Path::new("/home/alice/project")).is_some());
        assert!(tree.find_dir(Path::new("/home/bob")).is_none());
        assert!(tree
            .find_file(Path::new("/home/alice/project/main.rs"))
            .is_some());
        assert!(tree
            .find_file(Path::new("/home/alice/project/missing.rs"))
            .is_none());
    }

    #[test]
    fn test_walk_yields_parents_first() {
        let tree = sample_tree();
        let paths: Vec<PathBuf> = tree.walk().map(|(path, _)| path).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/"),
                PathBuf::from("/home"),
                PathBuf::from("/home/alice"),
                PathBuf::from("/home/alice/project"),
            ]
        );
    }

    #[test]
    fn test_files_recursive_full_paths() {
        let tree = sample_tree();
        let mut paths: Vec<PathBuf> = tree.files_recursive().map(|(path, _)| path).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/home/alice/project/lib.rs"),
                PathBuf::from("/home/alice/project/main.rs"),
            ]
        );
    }

    #[test]
    fn test_offset_base_skips_single_chain() {
        let tree = sample_tree();
        assert_eq!(tree.offset_base(), PathBuf::from("/home/alice/project"));
    }

    #[test]
    fn test_offset_base_stops_at_branch() {
        let mut tree = sample_tree();
        tree.find_or_create_subdir(Path::new("/home/bob"), |_| FileAttributes::default());
        assert_eq!(tree.offset_base(), PathBuf::from("/home"));
    }

    #[test]
    fn test_attributes_recorded_for_created_ancestors() {
        let mut tree = SnapshotTree::new_root();
        let mut seen = Vec::new();
        tree.find_or_create_subdir(Path::new("/a/b"), |path| {
            seen.push(path.to_path_buf());
            FileAttributes::default()
        });
        assert_eq!(seen, vec![PathBuf::from("/a"), PathBuf::from("/a/b")]);
    }

    #[test]
    fn test_serde_round_trip() {
        let tree = sample_tree();
        let encoded = bincode::serialize(&tree).unwrap();
        let decoded: SnapshotTree = bincode::deserialize(&encoded).unwrap();
        let a: Vec<_> = tree.files_recursive().map(|(p, e)| (p, e.clone())).collect();
        let b: Vec<_> = decoded
            .files_recursive()
            .map(|(p, e)| (p, e.clone()))
            .collect();
        assert_eq!(a, b);
    }
}
