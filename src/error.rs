use std::path::PathBuf;

use crate::formats::PageDescriptor;

/// A single page that could not be captured.
#[derive(Debug, Clone, thiserror::Error)]
#[error("capture failed for page {} ({}): {reason}", .page.page_num, .page.id)]
pub struct CaptureFailure {
    pub page: PageDescriptor,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("manifest not found: {}", .path.display())]
    ManifestMissing { path: PathBuf },

    #[error("manifest is invalid: {}: {reason}", .path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error(transparent)]
    CaptureFailed(#[from] CaptureFailure),

    #[error("{} page capture(s) failed and none succeeded", .0.len())]
    PartialBatchFailure(Vec<CaptureFailure>),

    #[error("merging chapter {chapter_number} failed: {reason}")]
    ChapterMergeFailed { chapter_number: u32, reason: String },

    #[error("storage location unavailable: {}: {reason}", .path.display())]
    StorageUnavailable { path: PathBuf, reason: String },
}
