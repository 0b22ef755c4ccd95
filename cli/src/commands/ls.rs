use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use snapvault_core::restore::get_subdir;
use snapvault_core::snapfile::list_snapshots;
use snapvault_core::SnapshotFile;
use std::path::PathBuf;

#[derive(Args)]
pub struct LsCommand {
    #[arg(help = "Configured archive")]
    archive: String,

    #[arg(help = "Snapshot name (defaults to the newest)")]
    snapshot: Option<String>,

    #[arg(help = "Directory inside the snapshot (defaults to the content root)")]
    path: Option<PathBuf>,
}

impl LsCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let config = Config::from_cli(cli)?;
        let archive = config.archive(&self.archive)?;

        let name = match &self.snapshot {
            Some(name) => name.clone(),
            None => list_snapshots(&archive.snapshot_dir)?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("Archive '{}' has no snapshots", archive.name))?,
        };
        let snapshot = SnapshotFile::load(&archive.snapshot_dir, &name)?;

        let base = match &self.path {
            Some(path) => path.clone(),
            None => snapshot.tree.offset_base(),
        };
        let node = get_subdir(&snapshot.tree, &base)?;

        println!("📸 {} — {}", name, base.display());
        for (child_name, subdir) in &node.subdirs {
            println!("d {:<40} {} entries", format!("{}/", child_name), subdir.child_count());
        }
        for (child_name, entry) in &node.dir_links {
            println!("l {:<40} -> {}/", child_name, entry.target.display());
        }
        for (child_name, entry) in &node.files {
            println!(
                "f {:<40} {:>10} {}",
                child_name,
                entry.attrs.size,
                entry.digest.short_string()
            );
        }
        for (child_name, entry) in &node.file_links {
            let marker = if entry.broken { " (broken)" } else { "" };
            println!(
                "l {:<40} -> {}{}",
                child_name,
                entry.target.display(),
                marker
            );
        }
        Ok(())
    }
}
