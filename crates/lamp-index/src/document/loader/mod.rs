mod bioc;
#[cfg(feature = "pdf")]
mod pdf;
mod text;

pub use bioc::BiocLoader;
#[cfg(feature = "pdf")]
pub use pdf::PdfLoader;
pub use text::TextLoader;

use std::path::Path;

use super::{LoadOutcome, SkipReason};

/// Shared size gate run before any loader reads a file.
async fn check_size(path: &Path, max_size: u64) -> Result<(), LoadOutcome> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > max_size => Err(LoadOutcome::skipped(
            path,
            SkipReason::TooLarge(meta.len()),
        )),
        Ok(_) => Ok(()),
        Err(e) => Err(LoadOutcome::skipped(
            path,
            SkipReason::Unreadable(e.to_string()),
        )),
    }
}
