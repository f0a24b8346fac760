//! Batched page capture.
//!
//! The first page is captured on its own so that a broken session shows up
//! before any concurrency is committed. The page list is then split into
//! fixed-size batches with the first page taken out of batch one; every
//! capture of a batch is polled concurrently and the whole batch settles
//! before the next one starts. Failures are recorded per page and never abort
//! siblings or later batches.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::capture::{Capturer, Navigator, Session};
use crate::error::{CaptureFailure, PipelineError};
use crate::formats::PageDescriptor;
use crate::layout::artifact_file_name;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub capture_timeout: Duration,
}

#[derive(Debug)]
pub struct PageOutcome {
    pub page: PageDescriptor,
    pub result: Result<PathBuf, CaptureFailure>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per input page, in input order.
    pub outcomes: Vec<PageOutcome>,
    /// Number of captures issued per round; the first round is the lone first page.
    pub rounds: Vec<usize>,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> Vec<&CaptureFailure> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err())
            .collect()
    }

    /// Fails only when pages were attempted and not a single one succeeded.
    pub fn ensure_progress(&self) -> Result<(), PipelineError> {
        if self.attempted() == 0 || self.succeeded() > 0 {
            return Ok(());
        }
        let mut failures = self.failures().into_iter().cloned().collect::<Vec<_>>();
        if failures.len() == 1 {
            return Err(PipelineError::CaptureFailed(failures.remove(0)));
        }
        Err(PipelineError::PartialBatchFailure(failures))
    }
}

pub struct BatchDownloader<'a> {
    capturer: &'a dyn Capturer,
    session: &'a Session,
    out_dir: &'a Path,
    options: BatchOptions,
}

impl<'a> BatchDownloader<'a> {
    pub fn new(
        capturer: &'a dyn Capturer,
        session: &'a Session,
        out_dir: &'a Path,
        options: BatchOptions,
    ) -> Self {
        Self {
            capturer,
            session,
            out_dir,
            options,
        }
    }

    pub async fn run(&self, pages: &[PageDescriptor]) -> BatchReport {
        let mut report = BatchReport::default();
        let Some(first) = pages.first() else {
            return report;
        };

        tracing::info!(
            total = pages.len(),
            batch_size = self.options.batch_size,
            "capturing first page"
        );
        let outcome = self.capture_one(first).await;
        if outcome.result.is_err() {
            tracing::warn!(
                page_num = first.page_num,
                "first page failed; session or reader may be broken"
            );
        }
        report.outcomes.push(outcome);
        report.rounds.push(1);

        let batch_size = self.options.batch_size.max(1);
        let batch_count = pages.len().div_ceil(batch_size);
        let mut launched = 0;
        for (idx, batch) in pages.chunks(batch_size).enumerate() {
            // The first page already ran on its own.
            let batch = if idx == 0 { &batch[1..] } else { batch };
            if batch.is_empty() {
                continue;
            }
            if launched > 0 && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }
            launched += 1;

            tracing::info!(
                batch = idx + 1,
                batches = batch_count,
                pages = batch.len(),
                "capturing batch"
            );
            let outcomes =
                futures::future::join_all(batch.iter().map(|page| self.capture_one(page))).await;
            let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
            tracing::info!(
                batch = idx + 1,
                succeeded = outcomes.len() - failed,
                failed,
                "batch settled"
            );

            report.rounds.push(batch.len());
            report.outcomes.extend(outcomes);
        }

        report
    }

    async fn capture_one(&self, page: &PageDescriptor) -> PageOutcome {
        let target = self
            .out_dir
            .join(artifact_file_name(page.page_num, &page.id));
        let capture = self.capturer.capture(self.session, page, &target);

        let result = match tokio::time::timeout(self.options.capture_timeout, capture).await {
            Ok(Ok(path)) => {
                tracing::debug!(page_num = page.page_num, path = %path.display(), "page captured");
                Ok(path)
            }
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(_) => Err(format!(
                "timed out after {:?}",
                self.options.capture_timeout
            )),
        };

        let result = result.map_err(|reason| {
            tracing::warn!(page_num = page.page_num, id = %page.id, %reason, "page capture failed");
            CaptureFailure {
                page: page.clone(),
                reason,
            }
        });

        PageOutcome {
            page: page.clone(),
            result,
        }
    }
}

/// Opens a session, captures `pages` into `out_dir` and closes the session.
pub async fn capture_with_session(
    navigator: &dyn Navigator,
    capturer: &dyn Capturer,
    book_id: &str,
    out_dir: &Path,
    pages: &[PageDescriptor],
    options: BatchOptions,
) -> anyhow::Result<BatchReport> {
    let session = navigator
        .open_session(book_id)
        .await
        .context("open reader session")?;

    let report = BatchDownloader::new(capturer, &session, out_dir, options)
        .run(pages)
        .await;

    if let Err(err) = session.close() {
        tracing::warn!(?err, "closing session failed");
    }
    Ok(report)
}

pub fn print_summary(label: &str, report: &BatchReport) {
    println!(
        "{label}: {}/{} pages captured, {} failed",
        report.succeeded(),
        report.attempted(),
        report.attempted() - report.succeeded()
    );
    for failure in report.failures() {
        println!(
            "  page {:>3} ({}): {}",
            failure.page.page_num, failure.page.id, failure.reason
        );
    }
}
