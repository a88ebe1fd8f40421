use lamp_index::SearchHit;
use serde::{Deserialize, Serialize};

/// A chunk selected for the prompt, with the score of whichever stage last
/// ranked it.
///
/// Serialized as a `[content, source, score]` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, String, f32)", into = "(String, String, f32)")]
pub struct RetrievedCandidate {
    pub content: String,
    pub source: String,
    pub score: f32,
}

impl From<(String, String, f32)> for RetrievedCandidate {
    fn from((content, source, score): (String, String, f32)) -> Self {
        Self {
            content,
            source,
            score,
        }
    }
}

impl From<RetrievedCandidate> for (String, String, f32) {
    fn from(c: RetrievedCandidate) -> Self {
        (c.content, c.source, c.score)
    }
}

impl From<SearchHit> for RetrievedCandidate {
    fn from(hit: SearchHit) -> Self {
        Self {
            content: hit.text,
            source: hit.source,
            score: hit.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub query: String,
    pub answer: String,
    /// Candidates in prompt order; "Document i" in the answer is `references[i - 1]`.
    pub references: Vec<RetrievedCandidate>,
}
