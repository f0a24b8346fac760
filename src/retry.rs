use std::collections::HashMap;

use anyhow::Context as _;

use crate::batch::{BatchOptions, BatchReport};
use crate::capture::{Capturer, Navigator};
use crate::cli::RetryArgs;
use crate::command_capture::CommandAdapter;
use crate::config::PipelineConfig;
use crate::formats::{Manifest, PageDescriptor, ReconciliationReport};
use crate::layout::StorageLayout;

#[derive(Debug)]
pub enum RetryOutcome {
    NothingToRetry,
    Retried(BatchReport),
}

pub struct RetryRequest<'a> {
    pub layout: &'a StorageLayout,
    pub book_id_override: Option<&'a str>,
    pub navigator: &'a dyn Navigator,
    pub capturer: &'a dyn Capturer,
    pub options: BatchOptions,
    pub min_valid_bytes: u64,
}

/// Re-captures the pages the last reconciliation marked as failed.
///
/// The report is not regenerated afterwards; run the reconciler again to see
/// whether the retry converged.
pub async fn retry(request: RetryRequest<'_>) -> anyhow::Result<RetryOutcome> {
    let layout = request.layout;
    let report = match crate::reconcile::load_cached_report(layout) {
        Some(report) => report,
        None => {
            tracing::info!("no usable status report; reconciling first");
            crate::reconcile::reconcile(layout, request.min_valid_bytes)
                .await
                .context("reconcile")?
        }
    };

    if report.failed_pages.is_empty() {
        tracing::info!(book_id = %report.book_id, "nothing to retry");
        return Ok(RetryOutcome::NothingToRetry);
    }

    let manifest = match crate::manifest::load(layout) {
        Ok(manifest) => Some(manifest),
        Err(err) => {
            tracing::warn!(%err, "manifest unavailable; relying on report for page details");
            None
        }
    };
    let pages = reconstruct_failed_pages(&report, manifest.as_ref());

    let book_id = request.book_id_override.unwrap_or(&report.book_id);
    tracing::info!(book_id, pages = pages.len(), "retrying failed pages");
    let batch = crate::batch::capture_with_session(
        request.navigator,
        request.capturer,
        book_id,
        layout.root(),
        &pages,
        request.options,
    )
    .await?;

    Ok(RetryOutcome::Retried(batch))
}

/// Resolves each failed id to a full descriptor.
///
/// Looks at the failed entry itself, then the report's per-page results, then
/// the manifest, and finally falls back to a placeholder with an unknown
/// position. Never fails.
pub fn reconstruct_failed_pages(
    report: &ReconciliationReport,
    manifest: Option<&Manifest>,
) -> Vec<PageDescriptor> {
    let from_results = report
        .results
        .iter()
        .map(|r| (r.id.as_str(), r.descriptor()))
        .collect::<HashMap<_, _>>();
    let from_manifest = manifest
        .map(|m| {
            m.table_of_contents
                .iter()
                .map(|p| (p.id.as_str(), p))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    report
        .failed_pages
        .iter()
        .map(|failed| {
            if failed.has_known_position() && !failed.title.is_empty() {
                return failed.clone();
            }
            if let Some(page) = from_results
                .get(failed.id.as_str())
                .filter(|p| p.has_known_position())
            {
                return page.clone();
            }
            if let Some(page) = from_manifest.get(failed.id.as_str()) {
                return (*page).clone();
            }
            tracing::warn!(id = %failed.id, "no record of failed page; using placeholder");
            PageDescriptor::placeholder(&failed.id)
        })
        .collect()
}

pub async fn run(args: RetryArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let config = config
        .clone()
        .with_batch_overrides(args.batch_size, args.batch_delay_ms);
    let layout = StorageLayout::new(&args.dir);
    layout.ensure_available()?;
    let adapter = CommandAdapter::new(config.capture.clone());

    let outcome = retry(RetryRequest {
        layout: &layout,
        book_id_override: args.book_id.as_deref(),
        navigator: &adapter,
        capturer: &adapter,
        options: config.batch_options(),
        min_valid_bytes: config.min_valid_bytes,
    })
    .await?;

    match outcome {
        RetryOutcome::NothingToRetry => {
            println!("nothing to retry: every page is present");
        }
        RetryOutcome::Retried(batch) => {
            crate::batch::print_summary("retry", &batch);
            println!("run `check` to refresh the status report");
            batch.ensure_progress()?;
        }
    }
    Ok(())
}
