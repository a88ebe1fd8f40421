//! Recursive separator-based text splitting.
//!
//! Text is cut at the first separator in the list that occurs in it. Pieces
//! keep their separator as a prefix, so concatenating consecutive pieces
//! reproduces the original text. Runs of small pieces are merged into chunks
//! of at most `chunk_size` characters, and each new chunk starts with up to
//! `chunk_overlap` characters carried over from the end of the previous one.
//! Pieces that are too large on their own are split again with the remaining,
//! finer separators.

use regex::Regex;

use super::error::DocumentError;
use super::types::{Chunk, Document};

/// Separators for structured article text: paragraph, line, sentence, clause, word, character.
pub const STRUCTURED_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", ", ", " ", ""];

/// Separators for free text, as regular expressions: headings, code fences,
/// horizontal rules, then paragraph, line, word, character.
pub const MARKDOWN_SEPARATORS: &[&str] = &[
    r"\n#{1,6} ",
    "```\n",
    r"\n\*\*\*+\n",
    r"\n---+\n",
    r"\n___+\n",
    r"\n\n",
    r"\n",
    " ",
    "",
];

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
    /// Treat `separators` as regular expressions rather than literals.
    pub separators_are_regex: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::structured(1000, 20)
    }
}

impl SplitterConfig {
    #[must_use]
    pub fn structured(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: STRUCTURED_SEPARATORS.iter().map(|s| (*s).to_owned()).collect(),
            separators_are_regex: false,
        }
    }

    #[must_use]
    pub fn markdown(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: MARKDOWN_SEPARATORS.iter().map(|s| (*s).to_owned()).collect(),
            separators_are_regex: true,
        }
    }
}

#[derive(Debug, Clone)]
enum Separator {
    Pattern(Regex),
    /// The empty separator: split into individual characters.
    Chars,
}

/// A slice of the document being split, tracked by byte range.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    chars: usize,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Separator>,
}

impl TextSplitter {
    /// Validate the configuration and compile the separators.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidChunkConfig`] when `chunk_overlap >= chunk_size`,
    /// [`DocumentError::NoSeparators`] for an empty separator list, and
    /// [`DocumentError::Separator`] for a pattern that does not compile.
    pub fn new(config: SplitterConfig) -> Result<Self, DocumentError> {
        if config.chunk_overlap >= config.chunk_size {
            return Err(DocumentError::InvalidChunkConfig {
                chunk_size: config.chunk_size,
                chunk_overlap: config.chunk_overlap,
            });
        }
        if config.separators.is_empty() {
            return Err(DocumentError::NoSeparators);
        }
        let separators = config
            .separators
            .iter()
            .map(|sep| {
                if sep.is_empty() {
                    Ok(Separator::Chars)
                } else if config.separators_are_regex {
                    Regex::new(sep).map(Separator::Pattern)
                } else {
                    Regex::new(&regex::escape(sep)).map(Separator::Pattern)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators,
        })
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split a document into trimmed, non-empty chunks carrying its source.
    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text.as_str();
        let mut spans = Vec::new();
        self.split_span(text, 0, text.len(), &self.separators, &mut spans);

        spans
            .into_iter()
            .enumerate()
            .map(|(chunk_index, span)| Chunk {
                text: text[span.start..span.end].to_owned(),
                source: document.source.clone(),
                start_offset: span.start,
                chunk_index,
            })
            .collect()
    }

    fn split_span(
        &self,
        text: &str,
        start: usize,
        end: usize,
        separators: &[Separator],
        out: &mut Vec<Span>,
    ) {
        let slice = &text[start..end];

        // First separator present in this slice; finer ones are kept for oversized pieces.
        let mut chosen = separators.last();
        let mut finer: &[Separator] = &[];
        for (i, sep) in separators.iter().enumerate() {
            match sep {
                Separator::Chars => {
                    chosen = Some(sep);
                    break;
                }
                Separator::Pattern(re) if re.is_match(slice) => {
                    chosen = Some(sep);
                    finer = &separators[i + 1..];
                    break;
                }
                Separator::Pattern(_) => {}
            }
        }

        let pieces = match chosen {
            Some(sep) => split_keeping_separator(slice, start, sep),
            None => vec![span(text, start, end)],
        };

        let mut pending: Vec<Span> = Vec::new();
        for piece in pieces {
            if piece.chars < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                self.merge(text, &pending, out);
                pending.clear();
            }
            if finer.is_empty() {
                push_trimmed(text, piece, out);
            } else {
                self.split_span(text, piece.start, piece.end, finer, out);
            }
        }
        if !pending.is_empty() {
            self.merge(text, &pending, out);
        }
    }

    /// Greedily pack adjacent pieces into chunks, carrying overlap forward.
    fn merge(&self, text: &str, pieces: &[Span], out: &mut Vec<Span>) {
        let mut window_start = 0;
        let mut total = 0;

        for (i, piece) in pieces.iter().enumerate() {
            if total + piece.chars > self.chunk_size && i > window_start {
                emit(text, &pieces[window_start..i], out);
                while total > self.chunk_overlap
                    || (total + piece.chars > self.chunk_size && total > 0)
                {
                    total -= pieces[window_start].chars;
                    window_start += 1;
                }
            }
            total += piece.chars;
        }
        if window_start < pieces.len() {
            emit(text, &pieces[window_start..], out);
        }
    }
}

fn span(text: &str, start: usize, end: usize) -> Span {
    Span {
        start,
        end,
        chars: text[start..end].chars().count(),
    }
}

/// Cut `slice` before every separator match so each piece after the first
/// begins with its separator. Empty pieces are dropped.
fn split_keeping_separator(slice: &str, base: usize, separator: &Separator) -> Vec<Span> {
    let full_end = base + slice.len();
    match separator {
        Separator::Chars => slice
            .char_indices()
            .map(|(i, c)| Span {
                start: base + i,
                end: base + i + c.len_utf8(),
                chars: 1,
            })
            .collect(),
        Separator::Pattern(re) => {
            let mut cuts: Vec<usize> = vec![base];
            cuts.extend(
                re.find_iter(slice)
                    .map(|m| base + m.start())
                    .filter(|&pos| pos > base),
            );
            cuts.push(full_end);
            cuts.dedup();
            cuts.windows(2)
                .filter(|w| w[0] < w[1])
                .map(|w| Span {
                    start: w[0],
                    end: w[1],
                    chars: slice[w[0] - base..w[1] - base].chars().count(),
                })
                .collect()
        }
    }
}

// Consecutive pieces are contiguous in the source text, so a chunk is one slice.
fn emit(text: &str, pieces: &[Span], out: &mut Vec<Span>) {
    if let (Some(first), Some(last)) = (pieces.first(), pieces.last()) {
        push_trimmed(text, span(text, first.start, last.end), out);
    }
}

fn push_trimmed(text: &str, span: Span, out: &mut Vec<Span>) {
    let raw = &text[span.start..span.end];
    let trimmed_start = raw.len() - raw.trim_start().len();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let start = span.start + trimmed_start;
    let end = start + trimmed.len();
    out.push(Span {
        start,
        end,
        chars: trimmed.chars().count(),
    });
}
