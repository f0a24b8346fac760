use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML config file (default: $BOOKGRAB_CONFIG, else built-in defaults).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a storage directory from a TOC and capture every page.
    Download(DownloadArgs),
    /// Reconcile captured pages against the manifest and write the status report.
    Check(CheckArgs),
    /// Capture again the pages the status report lists as failed.
    Retry(RetryArgs),
    /// Group pages into chapters and write one PDF per chapter.
    Merge(MergeArgs),
    /// Remove files that neither the manifest nor the status report expects.
    Cleanup(CleanupArgs),
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// TOC produced by the extraction step (JSON array of `{id, title}`).
    #[arg(long)]
    pub toc: String,

    /// Book identifier on the reader site.
    #[arg(long)]
    pub book_id: String,

    /// Storage directory to create.
    #[arg(long)]
    pub out: String,

    /// Pages captured concurrently per batch.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Pause between batches.
    #[arg(long)]
    pub batch_delay_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Storage directory (contains `manifest.json`).
    #[arg(long)]
    pub dir: String,
}

#[derive(Debug, Args)]
pub struct RetryArgs {
    /// Storage directory (contains `manifest.json`).
    #[arg(long)]
    pub dir: String,

    /// Override the book identifier recorded in the status report.
    #[arg(long)]
    pub book_id: Option<String>,

    /// Pages captured concurrently per batch.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Pause between batches.
    #[arg(long)]
    pub batch_delay_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Storage directory (contains `manifest.json`).
    #[arg(long)]
    pub dir: String,
}

#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Storage directory (contains `manifest.json`).
    #[arg(long)]
    pub dir: String,

    /// Actually delete files (default is a dry run).
    #[arg(long, default_value_t = false)]
    pub live: bool,
}
