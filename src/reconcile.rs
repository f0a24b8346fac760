use std::path::Path;

use anyhow::Context as _;

use crate::cli::CheckArgs;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::formats::{CaptureResult, CaptureStatus, Manifest, ReconciliationReport};
use crate::layout::StorageLayout;

/// A capture counts as successful when its artifact exists and is either of
/// unknown size or larger than `min_valid_bytes`.
pub fn classify(exists: bool, size_bytes: Option<u64>, min_valid_bytes: u64) -> CaptureStatus {
    let large_enough = size_bytes.is_none_or(|size| size > min_valid_bytes);
    if exists && large_enough {
        CaptureStatus::Success
    } else {
        CaptureStatus::Failed
    }
}

/// Compares the manifest against storage and persists the resulting report.
///
/// Only `status_report.json` is written; page artifacts are never touched, so
/// running this repeatedly against unchanged storage yields the same report.
pub async fn reconcile(
    layout: &StorageLayout,
    min_valid_bytes: u64,
) -> Result<ReconciliationReport, PipelineError> {
    layout.ensure_available()?;
    let manifest = crate::manifest::load(layout)?;

    let report = build_report(layout, &manifest, min_valid_bytes).await;

    crate::layout::write_json_atomic(&layout.report_path(), &report).map_err(|err| {
        PipelineError::StorageUnavailable {
            path: layout.report_path(),
            reason: format!("{err:#}"),
        }
    })?;

    tracing::info!(
        book_id = %report.book_id,
        total = report.total_pages,
        success = report.success_count,
        failed = report.failed_count,
        "reconciled storage against manifest"
    );
    Ok(report)
}

pub async fn build_report(
    layout: &StorageLayout,
    manifest: &Manifest,
    min_valid_bytes: u64,
) -> ReconciliationReport {
    let mut results = Vec::with_capacity(manifest.table_of_contents.len());
    let mut failed_pages = Vec::new();

    for page in &manifest.table_of_contents {
        let path = layout.artifact_path(page);
        let (exists, size_bytes) = stat_artifact(&path).await;
        let status = classify(exists, size_bytes, min_valid_bytes);
        if status == CaptureStatus::Failed {
            tracing::debug!(
                page_num = page.page_num,
                id = %page.id,
                exists,
                ?size_bytes,
                "page artifact missing or too small"
            );
            failed_pages.push(page.clone());
        }

        results.push(CaptureResult {
            id: page.id.clone(),
            title: page.title.clone(),
            page_num: page.page_num,
            status,
            artifact_path: exists.then(|| path.to_string_lossy().to_string()),
            exists,
            size_bytes,
        });
    }

    let failed_count = failed_pages.len();
    ReconciliationReport {
        book_id: manifest.book_id.clone(),
        checked_at: chrono::Utc::now(),
        total_pages: manifest.total_pages,
        success_count: results.len() - failed_count,
        failed_count,
        results,
        failed_pages,
    }
}

async fn stat_artifact(path: &Path) -> (bool, Option<u64>) {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => (true, Some(meta.len())),
        Ok(_) => (false, None),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => (false, None),
        Err(err) => {
            tracing::warn!(path = %path.display(), ?err, "stat artifact failed; size unknown");
            let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
            (exists, None)
        }
    }
}

/// Reads the last persisted report, if any.
pub fn load_report(layout: &StorageLayout) -> anyhow::Result<Option<ReconciliationReport>> {
    let path = layout.report_path();
    crate::layout::read_json(&path).with_context(|| format!("read report: {}", path.display()))
}

/// Like [`load_report`], but an unreadable report counts as absent.
///
/// The report can always be rebuilt from the manifest, so callers that only
/// use it as a shortcut fall back instead of failing.
pub fn load_cached_report(layout: &StorageLayout) -> Option<ReconciliationReport> {
    match load_report(layout) {
        Ok(report) => report,
        Err(err) => {
            tracing::warn!(err = format!("{err:#}"), "ignoring unreadable status report");
            None
        }
    }
}

pub async fn run(args: CheckArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let layout = StorageLayout::new(&args.dir);
    let report = reconcile(&layout, config.min_valid_bytes)
        .await
        .context("reconcile")?;

    println!(
        "{}: {}/{} pages ok, {} failed",
        report.book_id, report.success_count, report.total_pages, report.failed_count
    );
    for page in &report.failed_pages {
        println!("  missing page {:>3}: {} ({})", page.page_num, page.title, page.id);
    }
    println!("report written to {}", layout.report_path().display());

    Ok(())
}
