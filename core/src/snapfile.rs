use crate::capture::CaptureStats;
use crate::store::StoreHandle;
use crate::tree::SnapshotTree;
use crate::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Snapshot file names are the capture timestamp at second resolution.
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

const SNAPSHOT_EXT: &str = "snap";
const SNAPSHOT_GZ_EXT: &str = "snap.gz";

/// Snapshot files are readable by their owner only.
const SNAPSHOT_MODE: u32 = 0o400;

/// One serialized capture: the directory tree, the statistics of the run
/// that produced it, and the name of the repository holding its content.
///
/// Written once, read-only afterward. The only in-place byte change ever
/// applied is the compress/uncompress transform, which preserves content.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub tree: SnapshotTree,
    pub stats: CaptureStats,
    pub repository: String,
}

impl SnapshotFile {
    /// Serializes to `<dir>/<name>.snap[.gz]` atomically (temp file plus
    /// rename) and drops write permission on the result.
    pub fn write(&self, snapshot_dir: &Path, name: &str, compress: bool) -> Result<PathBuf> {
        fs::create_dir_all(snapshot_dir)?;
        let ext = if compress {
            SNAPSHOT_GZ_EXT
        } else {
            SNAPSHOT_EXT
        };
        let target = snapshot_dir.join(format!("{}.{}", name, ext));
        let tmp = snapshot_dir.join(format!("{}.tmp", name));

        let encoded = bincode::serialize(self)?;
        {
            let file = File::create(&tmp)?;
            if compress {
                let mut encoder = GzEncoder::new(file, Compression::default());
                encoder.write_all(&encoded)?;
                encoder.finish()?;
            } else {
                let mut file = file;
                file.write_all(&encoded)?;
            }
        }
        fs::rename(&tmp, &target)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(SNAPSHOT_MODE))?;
        }
        info!(path = %target.display(), "wrote snapshot file");
        Ok(target)
    }

    /// Loads a snapshot by name, probing the plain and gzipped forms.
    pub fn load(snapshot_dir: &Path, name: &str) -> Result<Self> {
        let (path, compressed) = locate(snapshot_dir, name)?;
        let mut encoded = Vec::new();
        if compressed {
            GzDecoder::new(File::open(&path)?).read_to_end(&mut encoded)?;
        } else {
            File::open(&path)?.read_to_end(&mut encoded)?;
        }
        bincode::deserialize(&encoded).map_err(|err| Error::SnapshotCorrupt {
            name: name.to_string(),
            reason: err.to_string(),
        })
    }
}

/// Timestamp name for a capture finishing now, local time.
pub fn snapshot_name_now() -> String {
    chrono::Local::now()
        .format(SNAPSHOT_TIMESTAMP_FORMAT)
        .to_string()
}

/// Snapshot names in the directory, newest first. Timestamp names sort
/// chronologically as strings.
pub fn list_snapshots(snapshot_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !snapshot_dir.is_dir() {
        return Ok(names);
    }
    for entry in fs::read_dir(snapshot_dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        if let Some(name) = file_name
            .strip_suffix(&format!(".{}", SNAPSHOT_GZ_EXT))
            .or_else(|| file_name.strip_suffix(&format!(".{}", SNAPSHOT_EXT)))
        {
            names.push(name.to_string());
        }
    }
    names.sort_by(|a, b| b.cmp(a));
    Ok(names)
}

/// Gzips an existing snapshot file in place (logical name preserved, `.gz`
/// suffix added). `AlreadyCompressed` when there is nothing to do; callers
/// treat that as success.
pub fn compress_snapshot(snapshot_dir: &Path, name: &str) -> Result<()> {
    let (path, compressed) = locate(snapshot_dir, name)?;
    if compressed {
        return Err(Error::AlreadyCompressed {
            name: name.to_string(),
        });
    }
    let snapshot = SnapshotFile::load(snapshot_dir, name)?;
    snapshot.write(snapshot_dir, name, true)?;
    fs::remove_file(&path)?;
    debug!(name, "compressed snapshot file");
    Ok(())
}

/// Inverse of [`compress_snapshot`].
pub fn uncompress_snapshot(snapshot_dir: &Path, name: &str) -> Result<()> {
    let (path, compressed) = locate(snapshot_dir, name)?;
    if !compressed {
        return Err(Error::AlreadyUncompressed {
            name: name.to_string(),
        });
    }
    let snapshot = SnapshotFile::load(snapshot_dir, name)?;
    snapshot.write(snapshot_dir, name, false)?;
    fs::remove_file(&path)?;
    debug!(name, "uncompressed snapshot file");
    Ok(())
}

/// Deletes a snapshot and releases every digest it referenced, as one unit
/// under the write lock the handle already holds.
///
/// The last remaining snapshot of an archive is protected: deleting it
/// requires `force`.
pub fn delete_snapshot(
    snapshot_dir: &Path,
    name: &str,
    handle: &mut StoreHandle,
    force: bool,
) -> Result<()> {
    if !handle.is_writeable() {
        return Err(Error::ReadOnlyHandle);
    }
    let names = list_snapshots(snapshot_dir)?;
    if !force && names.len() == 1 && names[0] == name {
        return Err(Error::ProtectedSnapshot {
            name: name.to_string(),
        });
    }

    let snapshot = SnapshotFile::load(snapshot_dir, name)?;
    let (path, _) = locate(snapshot_dir, name)?;
    fs::remove_file(&path)?;
    let digests: Vec<_> = snapshot.tree.digests().collect();
    let released = digests.len();
    handle.release_many(digests)?;
    info!(name, released, "deleted snapshot and released its references");
    Ok(())
}

fn locate(snapshot_dir: &Path, name: &str) -> Result<(PathBuf, bool)> {
    let plain = snapshot_dir.join(format!("{}.{}", name, SNAPSHOT_EXT));
    if plain.exists() {
        return Ok((plain, false));
    }
    let gz = snapshot_dir.join(format!("{}.{}", name, SNAPSHOT_GZ_EXT));
    if gz.exists() {
        return Ok((gz, true));
    }
    Err(Error::SnapshotNotFound {
        name: name.to_string(),
    })
}
