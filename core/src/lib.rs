pub mod archive;
pub mod capture;
pub mod digest;
pub mod error;
pub mod lock;
pub mod restore;
pub mod snapfile;
pub mod store;
pub mod tree;

pub use archive::{Archive, Repository};
pub use capture::{CaptureStats, SnapshotCapture};
pub use digest::Digest;
pub use error::{Error, Result};
pub use restore::{RestoreStats, SnapshotRestore};
pub use snapfile::SnapshotFile;
pub use store::StoreHandle;
pub use tree::SnapshotTree;
