use crate::config::Config;
use anyhow::Result;
use clap::Args;
use snapvault_core::snapfile::delete_snapshot;
use snapvault_core::StoreHandle;
use tracing::info;

#[derive(Args)]
pub struct DeleteCommand {
    #[arg(help = "Configured archive")]
    archive: String,

    #[arg(help = "Snapshot name to delete")]
    snapshot: String,

    #[arg(long, help = "Allow deleting the archive's last snapshot")]
    force: bool,
}

impl DeleteCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let config = Config::from_cli(cli)?;
        let archive = config.archive(&self.archive)?;
        let repo = config.repository_for(archive)?;

        info!("Opening repository at: {}", repo.base_dir.display());
        let mut handle = StoreHandle::open(repo, true)?;
        delete_snapshot(&archive.snapshot_dir, &self.snapshot, &mut handle, self.force)?;
        let counts = handle.get_counts();
        handle.close()?;

        println!("✅ Deleted snapshot '{}'", self.snapshot);
        println!(
            "🗑️  Unreferenced blobs awaiting prune: {}",
            counts.unreferenced
        );
        Ok(())
    }
}
