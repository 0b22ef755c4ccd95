use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use snapvault_core::store::init_repository;
use snapvault_core::Repository;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct InitCommand {
    #[arg(help = "Configured repository name")]
    repository: Option<String>,

    #[arg(long, help = "Create an ad-hoc repository at this path instead")]
    path: Option<PathBuf>,

    #[arg(long, help = "Name for an ad-hoc repository", default_value = "default")]
    name: String,

    #[arg(long, help = "Gzip-compress stored blobs in an ad-hoc repository")]
    compressed: bool,
}

impl InitCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let repo = match (&self.repository, &self.path) {
            (Some(name), None) => Config::from_cli(cli)?.repository(name)?.clone(),
            (None, Some(path)) => Repository::new(self.name.clone(), path.clone(), self.compressed),
            _ => {
                return Err(anyhow!(
                    "Give either a configured repository name or --path, not both"
                ))
            }
        };

        info!("Initializing repository at: {}", repo.base_dir.display());
        init_repository(&repo)?;

        println!("✅ Initialized repository '{}'", repo.name);
        println!("📁 Path: {}", repo.base_dir.display());
        println!(
            "🗜️  Blob compression: {}",
            if repo.compressed { "on" } else { "off" }
        );
        Ok(())
    }
}
