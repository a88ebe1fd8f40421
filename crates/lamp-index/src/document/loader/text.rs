use std::path::Path;
use std::pin::Pin;

use super::super::{DEFAULT_MAX_FILE_SIZE, DocumentLoader, LoadOutcome, SkipReason};
use super::check_size;

/// Loads plain text and markdown files verbatim.
pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Pin<Box<dyn Future<Output = LoadOutcome> + Send + '_>> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            if let Err(skip) = check_size(&path, max_size).await {
                return skip;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => LoadOutcome::from_text(&path, text),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    LoadOutcome::skipped(&path, SkipReason::InvalidFormat("not valid UTF-8".into()))
                }
                Err(e) => LoadOutcome::skipped(&path, SkipReason::Unreadable(e.to_string())),
            }
        })
    }
}
