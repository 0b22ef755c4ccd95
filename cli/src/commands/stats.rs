use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use snapvault_core::StoreHandle;
use tracing::info;

#[derive(Args)]
pub struct StatsCommand {
    #[arg(help = "Configured repository")]
    repository: String,

    #[arg(long, help = "Output format (table, json)")]
    format: Option<String>,
}

impl StatsCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let config = Config::from_cli(cli)?;
        let repo = config.repository(&self.repository)?;

        info!("Opening repository at: {}", repo.base_dir.display());
        let handle = StoreHandle::open(repo, false)?;
        let counts = handle.get_counts();
        let totals = handle.get_storage_totals()?;

        let format = self.format.as_deref().unwrap_or("table");
        match format {
            "table" => {
                println!("📊 Repository '{}'", repo.name);
                println!("📁 Path: {}", repo.base_dir.display());
                println!("🧩 Blobs: {} referenced, {} unreferenced", counts.referenced, counts.unreferenced);
                println!("🔗 References: {}", counts.total_refs);
                println!(
                    "💾 Stored: {:.2} MB (gross {:.2} MB, share {:.2} MB)",
                    totals.stored_bytes as f64 / 1024.0 / 1024.0,
                    totals.gross_bytes as f64 / 1024.0 / 1024.0,
                    totals.shared_bytes as f64 / 1024.0 / 1024.0
                );
            }
            "json" => {
                let json = serde_json::json!({
                    "repository": repo.name,
                    "base_dir": repo.base_dir,
                    "referenced": counts.referenced,
                    "unreferenced": counts.unreferenced,
                    "total_refs": counts.total_refs,
                    "gross_bytes": totals.gross_bytes,
                    "stored_bytes": totals.stored_bytes,
                    "shared_bytes": totals.shared_bytes,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            _ => return Err(anyhow!("Unsupported format: {}", format)),
        }
        Ok(())
    }
}
