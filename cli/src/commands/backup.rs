use crate::config::Config;
use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use snapvault_core::{SnapshotCapture, StoreHandle};
use tracing::info;

#[derive(Args)]
pub struct BackupCommand {
    #[arg(help = "Configured archive to capture")]
    archive: String,
}

impl BackupCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let config = Config::from_cli(cli)?;
        let archive = config.archive(&self.archive)?;
        let repo = config.repository_for(archive)?;

        info!("Opening repository at: {}", repo.base_dir.display());
        let mut handle = StoreHandle::open(repo, true)?;

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message(format!("Capturing archive '{}'...", archive.name));

        let mut capture = SnapshotCapture::new(archive, &mut handle)?;
        capture.run()?;
        let snapshot_path = capture.write_snapshot()?;
        let stats = capture.stats().clone();
        drop(capture);
        handle.close()?;

        pb.finish_with_message(format!(
            "Captured {} files ({:.2} MB)",
            stats.files_total,
            stats.bytes_total as f64 / 1024.0 / 1024.0
        ));

        println!("✅ Backup completed successfully!");
        println!("📸 Snapshot: {}", snapshot_path.display());
        println!(
            "📁 Files: {} ({} new)",
            stats.files_total, stats.files_new
        );
        println!(
            "💾 Size: {:.2} MB ({:.2} MB new)",
            stats.bytes_total as f64 / 1024.0 / 1024.0,
            stats.bytes_new as f64 / 1024.0 / 1024.0
        );
        println!(
            "🔗 Links: {} file, {} dir",
            stats.file_links, stats.dir_links
        );
        if stats.errors > 0 {
            println!("⚠️  Skipped items: {}", stats.errors);
        }
        println!("⏱️  Elapsed: {:.1}s", stats.elapsed.as_secs_f64());
        Ok(())
    }
}
