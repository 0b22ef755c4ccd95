use crate::config::Config;
use anyhow::Result;
use clap::Args;
use snapvault_core::StoreHandle;
use tracing::info;

#[derive(Args)]
pub struct PruneCommand {
    #[arg(help = "Configured repository")]
    repository: String,
}

impl PruneCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let config = Config::from_cli(cli)?;
        let repo = config.repository(&self.repository)?;

        info!("Opening repository at: {}", repo.base_dir.display());
        let mut handle = StoreHandle::open(repo, true)?;
        let (removed, freed) = handle.prune_unreferenced()?;
        handle.close()?;

        println!("✅ Prune completed");
        println!("🗑️  Blobs removed: {}", removed);
        println!("💾 Freed: {:.2} MB", freed as f64 / 1024.0 / 1024.0);
        Ok(())
    }
}
