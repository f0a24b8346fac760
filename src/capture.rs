use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;

use crate::formats::PageDescriptor;

/// An authenticated reader session for one book.
///
/// Created once per run by [`Navigator::open_session`] and passed by
/// reference into every capture. The scratch directory (cookie jars, browser
/// profiles, ...) is removed by [`Session::close`] or, at the latest, on drop.
#[derive(Debug)]
pub struct Session {
    book_id: String,
    env: Vec<(String, String)>,
    scratch: tempfile::TempDir,
}

impl Session {
    pub fn new(book_id: impl Into<String>) -> anyhow::Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("bookgrab-session-")
            .tempdir()
            .context("create session dir")?;
        Ok(Self {
            book_id: book_id.into(),
            env: Vec::new(),
            scratch,
        })
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Credentials exported to every capture of this session.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.env.push((key, value)),
        }
    }

    pub fn close(self) -> anyhow::Result<()> {
        let dir = self.scratch.path().to_path_buf();
        self.scratch
            .close()
            .with_context(|| format!("remove session dir: {}", dir.display()))
    }
}

/// Establishes sessions against the reader (login lives behind this).
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn open_session(&self, book_id: &str) -> anyhow::Result<Session>;
}

/// Renders one reader page into a single-page PDF at `target`.
#[async_trait]
pub trait Capturer: Send + Sync {
    async fn capture(
        &self,
        session: &Session,
        page: &PageDescriptor,
        target: &Path,
    ) -> anyhow::Result<PathBuf>;
}
