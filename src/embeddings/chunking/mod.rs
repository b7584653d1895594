
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::PageText;

/// Inserted between consecutive pages when they are concatenated for splitting
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Preferred cut points, strongest first: paragraph, line, word
const SEPARATORS: [&[char]; 3] = [&['\n', '\n'], &['\n'], &[' ']];

/// A contiguous piece of the source document, embedded and indexed as one retrieval unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// The chunk text, verbatim from the concatenated document
    pub text: String,
    /// Offset of the first character, counted in chars of the concatenated document
    pub source_offset: usize,
    /// 1-based page the chunk starts on
    pub page: usize,
    /// Position of this chunk in splitter output
    pub chunk_index: usize,
}

impl DocumentChunk {
    /// Length in characters
    #[inline]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Configuration for splitting document text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target characters per chunk
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

/// Concatenate pages and split the result into overlapping chunks.
///
/// Each chunk records the page its first character belongs to.
#[inline]
pub fn split_pages(pages: &[PageText], config: &ChunkingConfig) -> Vec<DocumentChunk> {
    let mut text = String::new();
    let mut page_starts: Vec<(usize, usize)> = Vec::with_capacity(pages.len());
    let mut offset = 0;

    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            text.push_str(PAGE_SEPARATOR);
            offset += PAGE_SEPARATOR.chars().count();
        }
        page_starts.push((offset, page.page_number));
        text.push_str(&page.text);
        offset += page.text.chars().count();
    }

    let mut chunks = split_text(&text, config);
    for chunk in &mut chunks {
        let idx = page_starts.partition_point(|(start, _)| *start <= chunk.source_offset);
        chunk.page = page_starts
            .get(idx.saturating_sub(1))
            .map_or(1, |(_, page_number)| *page_number);
    }

    debug!(
        "Split {} pages ({} chars) into {} chunks",
        pages.len(),
        offset,
        chunks.len()
    );

    chunks
}

/// Split text with a sliding window of `chunk_size` characters.
///
/// Windows advance by `chunk_size - chunk_overlap`. A cut lands just after the
/// strongest separator found in the last tenth of the window, or at the window
/// end when there is none. Whitespace-only input produces no chunks.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();

    if text.trim().is_empty() {
        return chunks;
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let chunk_size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(chunk_size - 1);

    let mut start = 0;
    loop {
        if total - start <= chunk_size {
            chunks.push(make_chunk(&chars, start, total, chunks.len()));
            break;
        }

        let end = find_cut(&chars, start, start + chunk_size, overlap, chunk_size);
        chunks.push(make_chunk(&chars, start, end, chunks.len()));

        // end > start + overlap, so the window always moves forward
        start = end - overlap;
    }

    chunks
}

/// Pick the end of the chunk starting at `start`
fn find_cut(
    chars: &[char],
    start: usize,
    window_end: usize,
    overlap: usize,
    chunk_size: usize,
) -> usize {
    let lookback = (chunk_size / 10).max(1);
    let min_end = (start + overlap + 1).max(window_end.saturating_sub(lookback));

    for separator in SEPARATORS {
        let len = separator.len();
        let mut cut = window_end;
        while cut >= min_end {
            if cut >= start + len && chars[cut - len..cut] == *separator {
                return cut;
            }
            cut -= 1;
        }
    }

    window_end
}

fn make_chunk(chars: &[char], start: usize, end: usize, chunk_index: usize) -> DocumentChunk {
    DocumentChunk {
        text: chars[start..end].iter().collect(),
        source_offset: start,
        page: 1,
        chunk_index,
    }
}
