use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of the book as listed in the reader's table of contents.
///
/// `page_num` is 1-based and defines document order. Zero is reserved for
/// pages whose position is unknown (see [`PageDescriptor::placeholder`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub page_num: u32,
}

impl PageDescriptor {
    pub fn new(id: impl Into<String>, title: impl Into<String>, page_num: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            page_num,
        }
    }

    /// Stand-in for a page nothing else knows about.
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            title: format!("Page {id}"),
            page_num: 0,
        }
    }

    pub fn has_known_position(&self) -> bool {
        self.page_num > 0
    }
}

/// Entry of the TOC file handed over by the extraction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocEntry {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub book_id: String,
    pub extracted_at: DateTime<Utc>,
    pub total_pages: usize,
    pub table_of_contents: Vec<PageDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResult {
    pub id: String,
    pub title: String,
    pub page_num: u32,
    pub status: CaptureStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl CaptureResult {
    pub fn descriptor(&self) -> PageDescriptor {
        PageDescriptor::new(self.id.clone(), self.title.clone(), self.page_num)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub book_id: String,
    pub checked_at: DateTime<Utc>,
    pub total_pages: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub results: Vec<CaptureResult>,
    pub failed_pages: Vec<PageDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterGroup {
    pub chapter_number: u32,
    pub title: String,
    pub start_page: u32,
    pub end_page: u32,
    pub pages: Vec<PageDescriptor>,
}

impl ChapterGroup {
    pub fn is_preface(&self) -> bool {
        self.chapter_number == 0
    }
}
