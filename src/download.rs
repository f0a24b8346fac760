use std::path::PathBuf;

use anyhow::Context as _;

use crate::batch::BatchReport;
use crate::capture::{Capturer, Navigator};
use crate::cli::DownloadArgs;
use crate::command_capture::CommandAdapter;
use crate::config::PipelineConfig;
use crate::formats::{Manifest, TocEntry};
use crate::layout::StorageLayout;

/// Captures every page of a freshly created manifest.
pub async fn capture_book(
    layout: &StorageLayout,
    manifest: &Manifest,
    navigator: &dyn Navigator,
    capturer: &dyn Capturer,
    config: &PipelineConfig,
) -> anyhow::Result<BatchReport> {
    crate::batch::capture_with_session(
        navigator,
        capturer,
        &manifest.book_id,
        layout.root(),
        &manifest.table_of_contents,
        config.batch_options(),
    )
    .await
}

pub async fn run(args: DownloadArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let config = config
        .clone()
        .with_batch_overrides(args.batch_size, args.batch_delay_ms);
    let out_dir = PathBuf::from(&args.out);
    if out_dir.exists() {
        anyhow::bail!("storage directory already exists: {}", out_dir.display());
    }

    let toc_path = PathBuf::from(&args.toc);
    let toc_json = std::fs::read_to_string(&toc_path)
        .with_context(|| format!("read toc: {}", toc_path.display()))?;
    let entries: Vec<TocEntry> = serde_json::from_str(&toc_json).context("parse toc json")?;
    if entries.is_empty() {
        anyhow::bail!("toc is empty: {}", toc_path.display());
    }
    let manifest = crate::manifest::from_toc(&args.book_id, entries).context("build manifest")?;

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create storage dir: {}", out_dir.display()))?;
    let layout = StorageLayout::new(&out_dir);
    crate::manifest::create(&layout, &manifest).context("write manifest")?;
    tracing::info!(
        book_id = %manifest.book_id,
        pages = manifest.total_pages,
        out = %out_dir.display(),
        "download: capture"
    );

    let adapter = CommandAdapter::new(config.capture.clone());
    let batch = capture_book(&layout, &manifest, &adapter, &adapter, &config).await?;
    crate::batch::print_summary("download", &batch);

    tracing::info!("download: check");
    let report = crate::reconcile::reconcile(&layout, config.min_valid_bytes)
        .await
        .context("reconcile")?;
    println!(
        "status: {}/{} pages ok, {} failed (report: {})",
        report.success_count,
        report.total_pages,
        report.failed_count,
        layout.report_path().display()
    );
    if report.failed_count > 0 {
        println!("run `retry --dir {}` to capture the missing pages", out_dir.display());
    }

    batch.ensure_progress()?;
    Ok(())
}
