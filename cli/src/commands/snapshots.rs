use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use snapvault_core::snapfile::list_snapshots;
use snapvault_core::SnapshotFile;
use tracing::warn;

#[derive(Args)]
pub struct SnapshotsCommand {
    #[arg(help = "Configured archive")]
    archive: String,

    #[arg(long, help = "Output format (table, json)")]
    format: Option<String>,

    #[arg(long, help = "Show latest N snapshots")]
    latest: Option<usize>,
}

impl SnapshotsCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let config = Config::from_cli(cli)?;
        let archive = config.archive(&self.archive)?;

        let mut names = list_snapshots(&archive.snapshot_dir)?;
        if let Some(latest) = self.latest {
            names.truncate(latest);
        }

        if names.is_empty() {
            println!("No snapshots found");
            return Ok(());
        }

        let mut snapshots = Vec::new();
        for name in names {
            match SnapshotFile::load(&archive.snapshot_dir, &name) {
                Ok(snapshot) => snapshots.push((name, snapshot)),
                Err(err) => warn!(%name, %err, "failed to load snapshot"),
            }
        }

        let format = self.format.as_deref().unwrap_or("table");
        match format {
            "table" => {
                println!(
                    "{:<22} {:>8} {:>8} {:>12} {:>8}",
                    "Snapshot", "Files", "New", "Size (MB)", "Links"
                );
                println!("{:-<64}", "");
                for (name, snapshot) in snapshots {
                    let stats = &snapshot.stats;
                    println!(
                        "{:<22} {:>8} {:>8} {:>12.2} {:>8}",
                        name,
                        stats.files_total,
                        stats.files_new,
                        stats.bytes_total as f64 / 1024.0 / 1024.0,
                        stats.file_links + stats.dir_links
                    );
                }
            }
            "json" => {
                let entries: Vec<_> = snapshots
                    .iter()
                    .map(|(name, snapshot)| {
                        serde_json::json!({
                            "name": name,
                            "repository": snapshot.repository,
                            "stats": snapshot.stats,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            _ => return Err(anyhow!("Unsupported format: {}", format)),
        }

        Ok(())
    }
}
