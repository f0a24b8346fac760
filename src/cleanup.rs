use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context as _;

use crate::cli::CleanupArgs;
use crate::error::PipelineError;
use crate::layout::{MANIFEST_FILE, REPORT_FILE, StorageLayout, artifact_file_name};

#[derive(Debug)]
pub struct CleanupSummary {
    pub kept: usize,
    pub stray: Vec<PathBuf>,
    pub removed: usize,
    pub dry_run: bool,
}

/// File names that belong in the storage directory.
///
/// Derived from the status report when there is a readable one, else from the
/// manifest.
pub fn expected_files(layout: &StorageLayout) -> anyhow::Result<BTreeSet<String>> {
    let mut expected = BTreeSet::from([MANIFEST_FILE.to_owned(), REPORT_FILE.to_owned()]);

    match crate::reconcile::load_cached_report(layout) {
        Some(report) => {
            expected.extend(
                report
                    .results
                    .iter()
                    .map(|r| artifact_file_name(r.page_num, &r.id)),
            );
        }
        None => {
            let manifest = crate::manifest::load(layout)?;
            expected.extend(
                manifest
                    .table_of_contents
                    .iter()
                    .map(|p| artifact_file_name(p.page_num, &p.id)),
            );
        }
    }

    Ok(expected)
}

/// Lists (and with `live`, deletes) top-level files outside the expected set.
///
/// Subdirectories such as `processed/` are left alone.
pub fn cleanup(layout: &StorageLayout, live: bool) -> anyhow::Result<CleanupSummary> {
    layout.ensure_available()?;
    let expected = expected_files(layout)?;

    let mut kept = 0;
    let mut stray = Vec::new();
    let entries = std::fs::read_dir(layout.root()).map_err(|err| {
        PipelineError::StorageUnavailable {
            path: layout.root().to_path_buf(),
            reason: err.to_string(),
        }
    })?;
    for entry in entries {
        let entry = entry.context("read storage dir entry")?;
        if !entry.file_type().context("read file type")?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if expected.contains(&name) {
            kept += 1;
        } else {
            stray.push(entry.path());
        }
    }
    stray.sort();

    let mut removed = 0;
    if live {
        for path in &stray {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "removed stray file");
                    removed += 1;
                }
                Err(err) => tracing::warn!(path = %path.display(), ?err, "remove failed"),
            }
        }
    }

    Ok(CleanupSummary {
        kept,
        stray,
        removed,
        dry_run: !live,
    })
}

pub fn run(args: CleanupArgs) -> anyhow::Result<()> {
    let layout = StorageLayout::new(&args.dir);
    let summary = cleanup(&layout, args.live)?;

    let verb = if summary.dry_run { "would remove" } else { "removed" };
    for path in &summary.stray {
        println!("  {verb} {}", path.display());
    }
    println!(
        "{} expected file(s) kept, {} stray file(s) {verb}",
        summary.kept,
        if summary.dry_run {
            summary.stray.len()
        } else {
            summary.removed
        }
    );
    if summary.dry_run && !summary.stray.is_empty() {
        println!("dry run: pass --live to delete");
    }
    Ok(())
}
