use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::batch::BatchOptions;
use crate::segment::ChapterSegmenter;

pub const CONFIG_ENV: &str = "BOOKGRAB_CONFIG";

/// Tunables for the whole pipeline, read from a YAML file.
///
/// Every field has a default so an empty (or absent) file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pages captured concurrently per batch.
    pub batch_size: usize,
    /// Pause between two batches.
    pub batch_delay_ms: u64,
    /// Upper bound for a single page capture.
    pub capture_timeout_secs: u64,
    /// Artifacts at or below this size are treated as broken captures.
    pub min_valid_bytes: u64,
    pub preface_pattern: String,
    pub chapter_pattern: String,
    /// Maximum length of the title part of a chapter file name.
    pub max_title_len: usize,
    pub capture: CaptureCommandConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay_ms: 1000,
            capture_timeout_secs: 120,
            min_valid_bytes: 1000,
            preface_pattern: r"^\s*(?:premessa|prefazione)\b".to_owned(),
            chapter_pattern: r"^\s*(?:capitolo\s+\d+|\d+\.?(?:\s|$))".to_owned(),
            max_title_len: 80,
            capture: CaptureCommandConfig::default(),
        }
    }
}

/// External program that renders one reader page into a PDF.
///
/// `args` and `reader_url` may contain `{url}`, `{out}`, `{book_id}`,
/// `{page_id}`, `{page_num}` and `{title}` placeholders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureCommandConfig {
    pub reader_url: String,
    pub command: CommandSpec,
    pub login: Option<CommandSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl PipelineConfig {
    /// Loads the config from `path`, falling back to `$BOOKGRAB_CONFIG` and
    /// then to the built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        };
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let yaml = std::fs::read_to_string(&path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_yaml_str(&yaml).with_context(|| format!("parse config: {}", path.display()))
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml).context("deserialize config yaml")?;
        if config.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        Ok(config)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size.max(1),
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            capture_timeout: Duration::from_secs(self.capture_timeout_secs),
        }
    }

    pub fn segmenter(&self) -> anyhow::Result<ChapterSegmenter> {
        ChapterSegmenter::new(&self.preface_pattern, &self.chapter_pattern)
    }

    /// Applies `--batch-size` / `--batch-delay-ms` style overrides.
    pub fn with_batch_overrides(mut self, size: Option<usize>, delay_ms: Option<u64>) -> Self {
        if let Some(size) = size {
            self.batch_size = size.max(1);
        }
        if let Some(delay_ms) = delay_ms {
            self.batch_delay_ms = delay_ms;
        }
        self
    }
}
