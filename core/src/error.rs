use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Repository not found at {path}")]
    RepositoryNotFound { path: PathBuf },

    #[error("Repository already exists at {path}")]
    RepositoryExists { path: PathBuf },

    #[error("Permission denied creating {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Repository at {path} is corrupt: {reason}")]
    RepositoryCorrupt { path: PathBuf, reason: String },

    #[error("Snapshot not found: {name}")]
    SnapshotNotFound { name: String },

    #[error("Snapshot {name} is corrupt: {reason}")]
    SnapshotCorrupt { name: String, reason: String },

    #[error("Snapshot {name} is already compressed")]
    AlreadyCompressed { name: String },

    #[error("Snapshot {name} is already uncompressed")]
    AlreadyUncompressed { name: String },

    #[error("Refusing to delete the only remaining snapshot {name} without force")]
    ProtectedSnapshot { name: String },

    #[error("Blob not found in repository: {digest}")]
    BlobNotFound { digest: String },

    #[error("File not found in snapshot: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Directory not found in snapshot: {path}")]
    DirNotFound { path: PathBuf },

    #[error("{path} exists in the snapshot as a symbolic link")]
    IsSymbolicLink { path: PathBuf },

    #[error("Path {path} is outside the snapshot tree")]
    OutsideSnapshot { path: PathBuf },

    #[error("Failed to read content of {path}: {source}")]
    ContentReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy blob {digest} to {path}: {source}")]
    CopyFailed {
        digest: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to restore attributes on {path}: {source}")]
    SetAttributesFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Restore target {path} conflicts with an existing entry")]
    RestoreConflict { path: PathBuf },

    #[error("Timed out waiting for repository lock at {path}")]
    LockTimeout { path: PathBuf },

    #[error("Failed to acquire repository lock at {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation requires a writeable store handle")]
    ReadOnlyHandle,

    #[error("Invalid digest string: {0}")]
    InvalidDigest(String),

    #[error("Invalid exclude pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
