pub mod error;
pub mod loader;
pub mod splitter;
pub mod types;

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use error::DocumentError;
pub use loader::{BiocLoader, TextLoader};
pub use splitter::{SplitterConfig, TextSplitter};
pub use types::{Chunk, Document};

#[cfg(feature = "pdf")]
pub use loader::PdfLoader;

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Why a file contributed no text. Loaders never fail; they skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Content did not parse as the expected format.
    InvalidFormat(String),
    /// Parsed, but the passage hierarchy was missing or malformed.
    InvalidStructure(String),
    /// The file could not be read at all.
    Unreadable(String),
    TooLarge(u64),
    /// No non-whitespace text was extracted.
    Empty,
}

impl SkipReason {
    /// Read failures are errors; malformed or empty content only warrants a warning.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Unreadable(_))
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat(e) => write!(f, "invalid format: {e}"),
            Self::InvalidStructure(e) => write!(f, "invalid structure: {e}"),
            Self::Unreadable(e) => write!(f, "unreadable: {e}"),
            Self::TooLarge(size) => write!(f, "file too large: {size} bytes"),
            Self::Empty => f.write_str("no text extracted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(Document),
    Skipped { file: String, reason: SkipReason },
}

impl LoadOutcome {
    /// Build a skip outcome and log it at the level its reason calls for.
    pub fn skipped(path: &Path, reason: SkipReason) -> Self {
        let file = path.display().to_string();
        if reason.is_error() {
            tracing::error!(file = %file, %reason, "failed to load document");
        } else {
            tracing::warn!(file = %file, %reason, "skipping document");
        }
        Self::Skipped { file, reason }
    }

    /// Wrap extracted text, skipping it when blank.
    pub fn from_text(path: &Path, text: String) -> Self {
        if text.trim().is_empty() {
            return Self::skipped(path, SkipReason::Empty);
        }
        Self::Loaded(Document {
            text,
            source: path.display().to_string(),
        })
    }
}

pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Pin<Box<dyn Future<Output = LoadOutcome> + Send + '_>>;
}

/// Kind of corpus being ingested; selects both the loader and the separator set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    /// `BioC` JSON articles.
    #[default]
    Json,
    #[serde(alias = "markdown")]
    Md,
    #[serde(alias = "text")]
    Txt,
    #[cfg(feature = "pdf")]
    Pdf,
}

impl InputType {
    /// File extensions collected for this input type during discovery.
    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Json => &["json"],
            Self::Md => &["md", "markdown"],
            Self::Txt => &["txt"],
            #[cfg(feature = "pdf")]
            Self::Pdf => &["pdf"],
        }
    }

    #[must_use]
    pub fn loader(self) -> Box<dyn DocumentLoader> {
        match self {
            Self::Json => Box::new(BiocLoader::default()),
            Self::Md | Self::Txt => Box::new(TextLoader::default()),
            #[cfg(feature = "pdf")]
            Self::Pdf => Box::new(PdfLoader::default()),
        }
    }

    /// Splitter settings for this corpus: structured text favours sentence and
    /// token boundaries, free text favours markdown structure.
    #[must_use]
    pub fn splitter_config(self, chunk_size: usize, chunk_overlap: usize) -> SplitterConfig {
        match self {
            Self::Json => SplitterConfig::structured(chunk_size, chunk_overlap),
            Self::Md | Self::Txt => SplitterConfig::markdown(chunk_size, chunk_overlap),
            #[cfg(feature = "pdf")]
            Self::Pdf => SplitterConfig::markdown(chunk_size, chunk_overlap),
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Md => "md",
            Self::Txt => "txt",
            #[cfg(feature = "pdf")]
            Self::Pdf => "pdf",
        })
    }
}

impl FromStr for InputType {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "md" | "markdown" => Ok(Self::Md),
            "txt" | "text" => Ok(Self::Txt),
            #[cfg(feature = "pdf")]
            "pdf" => Ok(Self::Pdf),
            other => Err(DocumentError::UnsupportedInputType(other.to_owned())),
        }
    }
}
