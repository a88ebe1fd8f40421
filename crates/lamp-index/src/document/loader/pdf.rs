use std::path::Path;
use std::pin::Pin;

use super::super::{DEFAULT_MAX_FILE_SIZE, DocumentLoader, LoadOutcome, SkipReason};
use super::check_size;

pub struct PdfLoader {
    pub max_file_size: u64,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Pin<Box<dyn Future<Output = LoadOutcome> + Send + '_>> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            if let Err(skip) = check_size(&path, max_size).await {
                return skip;
            }
            let path_buf = path.clone();
            let extracted =
                tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path_buf)).await;
            match extracted {
                Ok(Ok(text)) => LoadOutcome::from_text(&path, text),
                Ok(Err(e)) => LoadOutcome::skipped(&path, SkipReason::InvalidFormat(e.to_string())),
                Err(e) => LoadOutcome::skipped(&path, SkipReason::Unreadable(e.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_pdf_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.pdf");
        std::fs::write(&file, b"not a pdf").unwrap();

        let outcome = PdfLoader::default().load(&file).await;
        assert!(matches!(outcome, LoadOutcome::Skipped { .. }));
    }
}
