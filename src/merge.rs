use std::path::PathBuf;

use anyhow::Context as _;
use unicode_normalization::UnicodeNormalization as _;
use unicode_normalization::char::is_combining_mark;

use crate::cli::MergeArgs;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::formats::ChapterGroup;
use crate::layout::{ARTIFACT_EXTENSION, StorageLayout};

pub const CHAPTERS_FILE: &str = "chapters.json";
const PREFACE_STEM: &str = "preface";

#[derive(Debug)]
pub struct MergedChapter {
    pub chapter_number: u32,
    pub output: PathBuf,
    pub merged_pages: usize,
    pub missing_pages: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct MergeSummary {
    pub merged: Vec<MergedChapter>,
    pub failed: Vec<PipelineError>,
}

/// Merges every chapter's page artifacts into `<dir>/processed/`.
///
/// Missing pages are skipped and a chapter that cannot be merged is recorded
/// in [`MergeSummary::failed`]; neither stops the remaining chapters.
pub fn merge_chapters(
    groups: &[ChapterGroup],
    layout: &StorageLayout,
    max_title_len: usize,
) -> anyhow::Result<MergeSummary> {
    let out_dir = layout.processed_dir();
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create processed dir: {}", out_dir.display()))?;

    let mut summary = MergeSummary::default();
    let mut prefaces = 0;
    for group in groups {
        if group.is_preface() {
            prefaces += 1;
        }
        let file_name = chapter_file_name(group, prefaces, max_title_len);
        match merge_chapter(group, layout, &file_name) {
            Ok(merged) => {
                tracing::info!(
                    chapter = group.chapter_number,
                    pages = merged.merged_pages,
                    missing = merged.missing_pages.len(),
                    output = %merged.output.display(),
                    "chapter merged"
                );
                summary.merged.push(merged);
            }
            Err(err) => {
                tracing::error!(chapter = group.chapter_number, %err, "chapter merge failed");
                summary.failed.push(err);
            }
        }
    }
    Ok(summary)
}

fn merge_chapter(
    group: &ChapterGroup,
    layout: &StorageLayout,
    file_name: &str,
) -> Result<MergedChapter, PipelineError> {
    let mut inputs = Vec::with_capacity(group.pages.len());
    let mut missing_pages = Vec::new();
    for page in &group.pages {
        let path = layout.artifact_path(page);
        if path.is_file() {
            inputs.push(path);
        } else {
            tracing::warn!(
                chapter = group.chapter_number,
                page_num = page.page_num,
                path = %path.display(),
                "page artifact missing; skipping"
            );
            missing_pages.push(page.page_num);
        }
    }

    let output = layout.processed_dir().join(file_name);
    let merged_pages =
        crate::pdf::concat_pdfs(&inputs, &output).map_err(|err| PipelineError::ChapterMergeFailed {
            chapter_number: group.chapter_number,
            reason: format!("{err:#}"),
        })?;

    Ok(MergedChapter {
        chapter_number: group.chapter_number,
        output,
        merged_pages,
        missing_pages,
    })
}

/// Output file name of a chapter.
///
/// `preface_seq` is the 1-based position of a preface group among the
/// prefaces of the book; later prefaces get a numeric suffix so none of them
/// overwrites another. Ignored for numbered chapters.
pub fn chapter_file_name(
    group: &ChapterGroup,
    preface_seq: usize,
    max_title_len: usize,
) -> String {
    if group.is_preface() {
        return match preface_seq {
            0 | 1 => format!("{PREFACE_STEM}.{ARTIFACT_EXTENSION}"),
            n => format!("{PREFACE_STEM}_{n}.{ARTIFACT_EXTENSION}"),
        };
    }
    let title = sanitize_title(&group.title, max_title_len);
    let title = if title.is_empty() {
        "chapter".to_owned()
    } else {
        title
    };
    format!("{:02}_{title}.{ARTIFACT_EXTENSION}", group.chapter_number)
}

/// Portable file-name fragment for a chapter title.
pub fn sanitize_title(title: &str, max_len: usize) -> String {
    let ascii = title
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !is_quote(*c))
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-'))
        .collect::<String>();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let lowered = joined.trim_matches('_').to_ascii_lowercase();
    let truncated = lowered.chars().take(max_len).collect::<String>();
    truncated.trim_end_matches('_').to_owned()
}

fn is_quote(c: char) -> bool {
    matches!(
        c,
        '\''
            | '"'
            | '`'
            | '\u{00B4}'
            | '\u{2018}'
            | '\u{2019}'
            | '\u{201C}'
            | '\u{201D}'
            | '\u{00AB}'
            | '\u{00BB}'
    )
}

pub fn run(args: MergeArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let layout = StorageLayout::new(&args.dir);
    layout.ensure_available()?;
    let manifest = crate::manifest::load(&layout).context("load manifest")?;

    let mut toc = manifest.table_of_contents.clone();
    toc.sort_by_key(|p| p.page_num);
    let groups = config.segmenter()?.segment(&toc);
    if groups.is_empty() {
        anyhow::bail!("no chapter markers found in {} pages", toc.len());
    }

    let summary = merge_chapters(&groups, &layout, config.max_title_len)?;
    let chapters_path = layout.processed_dir().join(CHAPTERS_FILE);
    crate::layout::write_json_atomic(&chapters_path, &groups).context("write chapters.json")?;

    println!(
        "{}: {} chapter(s) merged, {} failed",
        manifest.book_id,
        summary.merged.len(),
        summary.failed.len()
    );
    for merged in &summary.merged {
        if merged.missing_pages.is_empty() {
            println!("  {} ({} pages)", merged.output.display(), merged.merged_pages);
        } else {
            println!(
                "  {} ({} pages, missing {:?})",
                merged.output.display(),
                merged.merged_pages,
                merged.missing_pages
            );
        }
    }
    for err in &summary.failed {
        println!("  {err}");
    }

    if summary.merged.is_empty() {
        anyhow::bail!("no chapter could be merged");
    }
    Ok(())
}
