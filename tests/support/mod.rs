#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use bookgrab::capture::{Capturer, Navigator, Session};
use bookgrab::formats::{Manifest, PageDescriptor, TocEntry};
use bookgrab::layout::StorageLayout;

/// In-memory stand-in for the reader: records every request and writes
/// artifacts of a fixed size unless told to fail or hang for a page id.
pub struct FakeReader {
    artifact_size: usize,
    fail_ids: HashSet<String>,
    hang_ids: HashSet<String>,
    state: Mutex<FakeState>,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub sessions: Vec<String>,
    pub captured: Vec<String>,
    /// Captures in flight right after each capture started.
    pub in_flight_at_start: Vec<usize>,
    in_flight: usize,
}

impl FakeReader {
    pub fn new(artifact_size: usize) -> Self {
        Self {
            artifact_size,
            fail_ids: HashSet::new(),
            hang_ids: HashSet::new(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.fail_ids.extend(ids.iter().map(|id| (*id).to_owned()));
        self
    }

    pub fn hanging(mut self, ids: &[&str]) -> Self {
        self.hang_ids.extend(ids.iter().map(|id| (*id).to_owned()));
        self
    }

    pub fn sessions(&self) -> Vec<String> {
        self.state.lock().expect("fake state").sessions.clone()
    }

    pub fn captured(&self) -> Vec<String> {
        self.state.lock().expect("fake state").captured.clone()
    }

    pub fn in_flight_at_start(&self) -> Vec<usize> {
        self.state.lock().expect("fake state").in_flight_at_start.clone()
    }

    fn begin(&self, id: &str) {
        let mut state = self.state.lock().expect("fake state");
        state.captured.push(id.to_owned());
        state.in_flight += 1;
        let in_flight = state.in_flight;
        state.in_flight_at_start.push(in_flight);
    }

    fn end(&self) {
        let mut state = self.state.lock().expect("fake state");
        state.in_flight -= 1;
    }
}

#[async_trait]
impl Navigator for FakeReader {
    async fn open_session(&self, book_id: &str) -> anyhow::Result<Session> {
        self.state
            .lock()
            .expect("fake state")
            .sessions
            .push(book_id.to_owned());
        Session::new(book_id)
    }
}

#[async_trait]
impl Capturer for FakeReader {
    async fn capture(
        &self,
        _session: &Session,
        page: &PageDescriptor,
        target: &Path,
    ) -> anyhow::Result<PathBuf> {
        self.begin(&page.id);
        tokio::task::yield_now().await;

        let result = if self.hang_ids.contains(&page.id) {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(anyhow::anyhow!("unreachable"))
        } else if self.fail_ids.contains(&page.id) {
            Err(anyhow::anyhow!("blank render for {}", page.id))
        } else {
            tokio::fs::write(target, vec![b'%'; self.artifact_size])
                .await
                .with_context(|| format!("write {}", target.display()))
                .map(|()| target.to_path_buf())
        };

        self.end();
        result
    }
}

pub fn pages(count: u32) -> Vec<PageDescriptor> {
    (1..=count)
        .map(|n| PageDescriptor::new(format!("p{n}"), format!("Section {n}"), n))
        .collect()
}

/// Creates a storage directory holding a manifest with the given titles.
pub fn storage_with_manifest(
    titles: &[&str],
) -> anyhow::Result<(tempfile::TempDir, StorageLayout, Manifest)> {
    let temp = tempfile::TempDir::new()?;
    let layout = StorageLayout::new(temp.path());
    let entries = titles
        .iter()
        .enumerate()
        .map(|(idx, title)| TocEntry {
            id: format!("p{}", idx + 1),
            title: (*title).to_owned(),
        })
        .collect();
    let manifest = bookgrab::manifest::from_toc("book-1", entries)?;
    bookgrab::manifest::create(&layout, &manifest)?;
    Ok((temp, layout, manifest))
}
