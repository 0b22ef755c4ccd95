pub mod backup;
pub mod compress;
pub mod delete;
pub mod init;
pub mod ls;
pub mod prune;
pub mod restore;
pub mod snapshots;
pub mod stats;
