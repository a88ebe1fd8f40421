//! Mapping from ingested file names back to PubMed Central articles.
//!
//! Corpus files are named `<PMCID>-<anything>.<ext>`, e.g. `PMC1234567-article.json`.

use std::path::Path;

const PMC_ARTICLE_BASE: &str = "https://www.ncbi.nlm.nih.gov/pmc/articles/";

/// Extract the PMCID from a chunk source, if the file name carries one.
#[must_use]
pub fn pmcid_from_source(source: &str) -> Option<&str> {
    let stem = Path::new(source).file_stem()?.to_str()?;
    let id = stem.split('-').next()?;
    let digits = id.strip_prefix("PMC")?;
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(id)
}

#[must_use]
pub fn pmc_article_url(pmcid: &str) -> String {
    format!("{PMC_ARTICLE_BASE}{pmcid}/")
}

/// Article URL for a chunk source, if it names a PMC article.
#[must_use]
pub fn article_url_for_source(source: &str) -> Option<String> {
    pmcid_from_source(source).map(pmc_article_url)
}
