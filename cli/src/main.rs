mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::backup::BackupCommand;
use commands::compress::{CompressCommand, UncompressCommand};
use commands::delete::DeleteCommand;
use commands::init::InitCommand;
use commands::ls::LsCommand;
use commands::prune::PruneCommand;
use commands::restore::RestoreCommand;
use commands::snapshots::SnapshotsCommand;
use commands::stats::StatsCommand;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "snapvault",
    about = "A deduplicating file backup tool",
    long_about = "Snapvault backs up directory trees into a content-addressed \
                  blob repository, storing each unique file content exactly once"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, env = "SNAPVAULT_CONFIG", help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Initialize a new blob repository")]
    Init(InitCommand),

    #[command(about = "Capture a snapshot of an archive")]
    Backup(BackupCommand),

    #[command(about = "List snapshots of an archive")]
    Snapshots(SnapshotsCommand),

    #[command(about = "List the contents of a snapshot directory")]
    Ls(LsCommand),

    #[command(about = "Restore files from a snapshot")]
    Restore(RestoreCommand),

    #[command(about = "Delete a snapshot and release its content")]
    Delete(DeleteCommand),

    #[command(about = "Remove blobs no snapshot references")]
    Prune(PruneCommand),

    #[command(about = "Gzip-compress stored blobs or a snapshot file")]
    Compress(CompressCommand),

    #[command(about = "Undo blob or snapshot file compression")]
    Uncompress(UncompressCommand),

    #[command(about = "Show repository statistics")]
    Stats(StatsCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Init(ref cmd) => cmd.run(&cli),
        Commands::Backup(ref cmd) => cmd.run(&cli),
        Commands::Snapshots(ref cmd) => cmd.run(&cli),
        Commands::Ls(ref cmd) => cmd.run(&cli),
        Commands::Restore(ref cmd) => cmd.run(&cli),
        Commands::Delete(ref cmd) => cmd.run(&cli),
        Commands::Prune(ref cmd) => cmd.run(&cli),
        Commands::Compress(ref cmd) => cmd.run(&cli),
        Commands::Uncompress(ref cmd) => cmd.run(&cli),
        Commands::Stats(ref cmd) => cmd.run(&cli),
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "snapvault={},snapvault_core={}",
            level, level
        )))
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Setting default subscriber failed");
}
