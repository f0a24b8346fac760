//! On-disk layout of a book's storage directory.
//!
//! ```text
//! <dir>/manifest.json
//! <dir>/status_report.json
//! <dir>/page_001_<id>.pdf
//! <dir>/processed/<NN>_<title>.pdf
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::error::PipelineError;
use crate::formats::PageDescriptor;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const REPORT_FILE: &str = "status_report.json";
pub const PROCESSED_DIR: &str = "processed";
pub const ARTIFACT_EXTENSION: &str = "pdf";

/// Name of the single-page artifact for `(page_num, id)`.
///
/// Capture, reconciliation, merge and cleanup all resolve pages through this
/// function, so it must stay a pure function of its inputs.
pub fn artifact_file_name(page_num: u32, id: &str) -> String {
    format!(
        "page_{page_num:03}_{}.{ARTIFACT_EXTENSION}",
        sanitize_page_id(id)
    )
}

fn sanitize_page_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join(REPORT_FILE)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join(PROCESSED_DIR)
    }

    pub fn artifact_path(&self, page: &PageDescriptor) -> PathBuf {
        self.root.join(artifact_file_name(page.page_num, &page.id))
    }

    pub fn ensure_available(&self) -> Result<(), PipelineError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(PipelineError::StorageUnavailable {
                path: self.root.clone(),
                reason: "not a directory".to_owned(),
            }),
            Err(err) => Err(PipelineError::StorageUnavailable {
                path: self.root.clone(),
                reason: err.to_string(),
            }),
        }
    }
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

/// Replaces `path` as a whole: the value is written next to it and renamed.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data).with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
