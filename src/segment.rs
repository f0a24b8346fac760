use anyhow::Context as _;
use regex::{Regex, RegexBuilder};

use crate::formats::{ChapterGroup, PageDescriptor};

/// Groups pages into chapters using title patterns.
///
/// A title matching the preface pattern becomes a standalone chapter 0. A title
/// matching the chapter pattern opens the next numbered chapter, and every
/// other page joins the open chapter. Pages before the first marker belong to
/// no chapter and are dropped.
#[derive(Debug, Clone)]
pub struct ChapterSegmenter {
    preface: Regex,
    chapter: Regex,
}

impl ChapterSegmenter {
    pub fn new(preface_pattern: &str, chapter_pattern: &str) -> anyhow::Result<Self> {
        Ok(Self {
            preface: compile(preface_pattern).context("compile preface pattern")?,
            chapter: compile(chapter_pattern).context("compile chapter pattern")?,
        })
    }

    pub fn segment(&self, toc: &[PageDescriptor]) -> Vec<ChapterGroup> {
        let mut groups = Vec::new();
        let mut current: Option<ChapterGroup> = None;
        let mut next_chapter_number = 1;
        let last_page_num = toc.last().map(|p| p.page_num).unwrap_or_default();

        for page in toc {
            if self.preface.is_match(&page.title) {
                if let Some(mut open) = current.take() {
                    open.end_page = page.page_num.saturating_sub(1);
                    groups.push(open);
                }
                groups.push(ChapterGroup {
                    chapter_number: 0,
                    title: page.title.clone(),
                    start_page: page.page_num,
                    end_page: page.page_num,
                    pages: vec![page.clone()],
                });
            } else if self.chapter.is_match(&page.title) {
                if let Some(mut open) = current.take() {
                    open.end_page = page.page_num.saturating_sub(1);
                    groups.push(open);
                }
                current = Some(ChapterGroup {
                    chapter_number: next_chapter_number,
                    title: page.title.clone(),
                    start_page: page.page_num,
                    end_page: last_page_num,
                    pages: vec![page.clone()],
                });
                next_chapter_number += 1;
            } else if let Some(open) = current.as_mut() {
                open.pages.push(page.clone());
            } else {
                tracing::warn!(
                    page_num = page.page_num,
                    title = %page.title,
                    "page precedes the first chapter marker; not assigned to any chapter"
                );
            }
        }

        if let Some(mut open) = current {
            open.end_page = last_page_num;
            groups.push(open);
        }

        groups
    }
}

fn compile(pattern: &str) -> anyhow::Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid pattern: {pattern}"))
}
