use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use snapvault_core::snapfile::{compress_snapshot, uncompress_snapshot};
use snapvault_core::store::{compress_repository, uncompress_repository};
use snapvault_core::Error;
use tracing::info;

#[derive(Args)]
pub struct CompressCommand {
    #[arg(help = "Configured repository whose blobs to compress")]
    repository: Option<String>,

    #[arg(long, help = "Compress one snapshot file of this archive instead")]
    archive: Option<String>,

    #[arg(long, requires = "archive", help = "Snapshot name")]
    snapshot: Option<String>,
}

impl CompressCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let config = Config::from_cli(cli)?;

        if let (Some(archive), Some(snapshot)) = (&self.archive, &self.snapshot) {
            let archive = config.archive(archive)?;
            match compress_snapshot(&archive.snapshot_dir, snapshot) {
                Ok(()) => println!("✅ Compressed snapshot '{}'", snapshot),
                Err(Error::AlreadyCompressed { .. }) => {
                    println!("Snapshot '{}' is already compressed", snapshot)
                }
                Err(err) => return Err(err.into()),
            }
            return Ok(());
        }

        let name = self
            .repository
            .as_ref()
            .ok_or_else(|| anyhow!("Give a repository name, or --archive with --snapshot"))?;
        let repo = config.repository(name)?;
        info!("Compressing blobs at: {}", repo.base_dir.display());
        let rewritten = compress_repository(repo)?;

        println!("✅ Compression pass completed");
        println!("🗜️  Blobs rewritten: {}", rewritten);
        Ok(())
    }
}

#[derive(Args)]
pub struct UncompressCommand {
    #[arg(help = "Configured repository whose blobs to uncompress")]
    repository: Option<String>,

    #[arg(long, help = "Uncompress one snapshot file of this archive instead")]
    archive: Option<String>,

    #[arg(long, requires = "archive", help = "Snapshot name")]
    snapshot: Option<String>,
}

impl UncompressCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let config = Config::from_cli(cli)?;

        if let (Some(archive), Some(snapshot)) = (&self.archive, &self.snapshot) {
            let archive = config.archive(archive)?;
            match uncompress_snapshot(&archive.snapshot_dir, snapshot) {
                Ok(()) => println!("✅ Uncompressed snapshot '{}'", snapshot),
                Err(Error::AlreadyUncompressed { .. }) => {
                    println!("Snapshot '{}' is already uncompressed", snapshot)
                }
                Err(err) => return Err(err.into()),
            }
            return Ok(());
        }

        let name = self
            .repository
            .as_ref()
            .ok_or_else(|| anyhow!("Give a repository name, or --archive with --snapshot"))?;
        let repo = config.repository(name)?;
        info!("Uncompressing blobs at: {}", repo.base_dir.display());
        let rewritten = uncompress_repository(repo)?;

        println!("✅ Uncompression pass completed");
        println!("🗜️  Blobs rewritten: {}", rewritten);
        Ok(())
    }
}
