use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write as _;

use anyhow::Context as _;

use crate::error::PipelineError;
use crate::formats::{Manifest, PageDescriptor, TocEntry};
use crate::layout::StorageLayout;

/// Loads and validates `manifest.json` from the storage directory.
pub fn load(layout: &StorageLayout) -> Result<Manifest, PipelineError> {
    let path = layout.manifest_path();
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::ManifestMissing { path });
        }
        Err(err) => {
            return Err(PipelineError::ManifestInvalid {
                path,
                reason: err.to_string(),
            });
        }
    };

    let manifest: Manifest =
        serde_json::from_slice(&bytes).map_err(|err| PipelineError::ManifestInvalid {
            path: path.clone(),
            reason: err.to_string(),
        })?;
    validate(&manifest).map_err(|reason| PipelineError::ManifestInvalid { path, reason })?;
    Ok(manifest)
}

pub fn validate(manifest: &Manifest) -> Result<(), String> {
    if manifest.book_id.trim().is_empty() {
        return Err("book_id is empty".to_owned());
    }
    if manifest.total_pages != manifest.table_of_contents.len() {
        return Err(format!(
            "total_pages is {} but table_of_contents has {} entries",
            manifest.total_pages,
            manifest.table_of_contents.len()
        ));
    }

    let mut ids = HashSet::new();
    let mut page_nums = HashSet::new();
    for page in &manifest.table_of_contents {
        if page.id.is_empty() {
            return Err(format!("page {} has an empty id", page.page_num));
        }
        if !ids.insert(page.id.as_str()) {
            return Err(format!("duplicate page id: {}", page.id));
        }
        if page.page_num == 0 || page.page_num as usize > manifest.total_pages {
            return Err(format!(
                "page {} has page_num {} outside 1..={}",
                page.id, page.page_num, manifest.total_pages
            ));
        }
        if !page_nums.insert(page.page_num) {
            return Err(format!("duplicate page_num: {}", page.page_num));
        }
    }

    Ok(())
}

/// Builds a manifest from the extraction step's TOC, numbering pages in order.
pub fn from_toc(book_id: &str, entries: Vec<TocEntry>) -> anyhow::Result<Manifest> {
    let table_of_contents = entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            let page_num = u32::try_from(idx + 1).context("too many pages")?;
            Ok(PageDescriptor::new(entry.id, entry.title, page_num))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let manifest = Manifest {
        book_id: book_id.to_owned(),
        extracted_at: chrono::Utc::now(),
        total_pages: table_of_contents.len(),
        table_of_contents,
    };
    validate(&manifest).map_err(|reason| anyhow::anyhow!("invalid toc: {reason}"))?;
    Ok(manifest)
}

/// Writes the manifest once; an existing manifest is never overwritten.
pub fn create(layout: &StorageLayout, manifest: &Manifest) -> anyhow::Result<()> {
    let path = layout.manifest_path();
    let mut out = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("create manifest: {}", path.display()))?;
    serde_json::to_writer_pretty(&mut out, manifest).context("serialize manifest")?;
    out.write_all(b"\n").context("write manifest newline")?;
    out.flush().context("flush manifest")?;
    Ok(())
}
