use std::path::Path;
use std::pin::Pin;

use serde::Deserialize;
use serde_json::Value;

use super::super::{DEFAULT_MAX_FILE_SIZE, DocumentLoader, LoadOutcome, SkipReason};
use super::check_size;

/// Loads `BioC` JSON articles: collection → documents → passages → text.
///
/// Some exports wrap the collection in a single-element array; the first
/// element is taken as the root in that case.
pub struct BiocLoader {
    pub max_file_size: u64,
}

impl Default for BiocLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Deserialize)]
struct Collection {
    documents: Vec<BiocDocument>,
}

#[derive(Deserialize)]
struct BiocDocument {
    #[serde(default)]
    passages: Vec<Passage>,
}

#[derive(Deserialize)]
struct Passage {
    #[serde(default)]
    text: Option<String>,
}

/// Extract passage text joined by newlines, in document order.
fn extract_text(raw: &[u8]) -> Result<String, SkipReason> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| SkipReason::InvalidFormat(e.to_string()))?;
    let root = match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| SkipReason::InvalidStructure("empty top-level array".into()))?,
        other => other,
    };
    let collection: Collection =
        serde_json::from_value(root).map_err(|e| SkipReason::InvalidStructure(e.to_string()))?;

    let texts: Vec<String> = collection
        .documents
        .into_iter()
        .flat_map(|doc| doc.passages)
        .filter_map(|passage| passage.text)
        .collect();
    Ok(texts.join("\n"))
}

impl DocumentLoader for BiocLoader {
    fn load(&self, path: &Path) -> Pin<Box<dyn Future<Output = LoadOutcome> + Send + '_>> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            if let Err(skip) = check_size(&path, max_size).await {
                return skip;
            }
            let raw = match tokio::fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) => return LoadOutcome::skipped(&path, SkipReason::Unreadable(e.to_string())),
            };
            match extract_text(&raw) {
                Ok(text) => LoadOutcome::from_text(&path, text),
                Err(reason) => LoadOutcome::skipped(&path, reason),
            }
        })
    }
}
