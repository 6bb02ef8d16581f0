//! Overlapping window chunker with per-document deduplication.
//!
//! Splits sanitized document text into windows of at most `max_chars`
//! characters, with roughly `overlap` characters shared between consecutive
//! windows so that names and phrases straddling a boundary survive intact in
//! at least one chunk.
//!
//! # Algorithm
//!
//! 1. Sanitize: control characters (except newline and tab) become spaces,
//!    CRLF and lone CR become LF, each line is trimmed and its whitespace
//!    runs collapsed, blank lines are dropped.
//! 2. Cut a window of `max_chars` characters. If more text follows, pull
//!    the end back to the last whitespace in the window's back half.
//! 3. Start the next window `overlap` characters before the previous end,
//!    advanced to the next word start.
//! 4. Deduplicate across the whole ingestion batch by a SHA-256 key of the
//!    whitespace-normalized text; the earliest `(page, text)` wins.
//!
//! Zero surviving chunks is reported as [`ChunkOutcome::NoExtractableContent`],
//! not as an error.
//!
//! # Example
//!
//! ```rust
//! use notes_harness_core::chunk::{chunk_text, ChunkOutcome};
//!
//! let outcome = chunk_text("Hello world.\n\nSecond paragraph.", 360, 90);
//! let chunks = outcome.into_chunks();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].page, 1);
//! assert_eq!(chunks[0].text, "Hello world.\nSecond paragraph.");
//!
//! assert!(matches!(chunk_text(" \n\t\n", 360, 90), ChunkOutcome::NoExtractableContent));
//! ```

use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// Default window size in characters.
pub const DEFAULT_MAX_CHARS: usize = 360;
/// Default characters shared between consecutive windows.
pub const DEFAULT_OVERLAP: usize = 90;

/// A chunk produced by the chunker, before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunk {
    /// 1-based page number.
    pub page: u32,
    pub text: String,
    /// Dedup key: SHA-256 of the whitespace-normalized text.
    pub hash: String,
}

/// Result of chunking one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Chunks(Vec<PageChunk>),
    NoExtractableContent,
}

impl ChunkOutcome {
    pub fn len(&self) -> usize {
        match self {
            ChunkOutcome::Chunks(chunks) => chunks.len(),
            ChunkOutcome::NoExtractableContent => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_chunks(self) -> Vec<PageChunk> {
        match self {
            ChunkOutcome::Chunks(chunks) => chunks,
            ChunkOutcome::NoExtractableContent => Vec::new(),
        }
    }
}

/// Chunk non-paginated text. Every chunk is on page 1.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> ChunkOutcome {
    chunk_pages(&[text], max_chars, overlap)
}

/// Chunk paginated text; `pages[0]` is page 1.
///
/// Each page is windowed independently so no chunk spans a page break.
/// Deduplication runs across all pages.
pub fn chunk_pages<S: AsRef<str>>(pages: &[S], max_chars: usize, overlap: usize) -> ChunkOutcome {
    let mut pieces = Vec::new();

    for (i, page) in pages.iter().enumerate() {
        let clean = sanitize(page.as_ref());
        if clean.is_empty() {
            continue;
        }
        for segment in split_windows(&clean, max_chars, overlap) {
            pieces.push((i as u32 + 1, segment));
        }
    }

    let chunks = dedup(pieces);
    if chunks.is_empty() {
        ChunkOutcome::NoExtractableContent
    } else {
        ChunkOutcome::Chunks(chunks)
    }
}

/// Clean raw extracted text for storage and embedding.
pub fn sanitize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = Vec::new();

    for line in unified.split('\n') {
        let cleaned: String = line
            .chars()
            .map(|c| if c.is_control() && c != '\t' { ' ' } else { c })
            .collect();
        let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }

    lines.join("\n")
}

/// SHA-256 (hex) of the text with all whitespace runs collapsed to one space.
pub fn normalized_key(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cut sanitized text into overlapping windows of at most `max_chars` characters.
pub fn split_windows(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || max_chars == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(max_chars - 1);

    let mut windows = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + max_chars).min(chars.len());
        let end = if hard_end < chars.len() {
            soft_break(&chars, start, hard_end)
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            windows.push(piece.to_string());
        }

        if end >= chars.len() {
            break;
        }

        let next = end.saturating_sub(overlap).max(start + 1);
        start = align_to_word_start(&chars, next, end);
    }

    windows
}

/// Pull a window end back to whitespace in the back half of the window.
fn soft_break(chars: &[char], start: usize, hard_end: usize) -> usize {
    let floor = start + (hard_end - start) / 2;
    (floor + 1..=hard_end)
        .rev()
        .find(|&i| chars[i].is_whitespace())
        .unwrap_or(hard_end)
}

/// Move a window start out of the middle of a word, never past `limit`.
fn align_to_word_start(chars: &[char], index: usize, limit: usize) -> usize {
    if index == 0 || chars[index - 1].is_whitespace() || chars[index].is_whitespace() {
        return index;
    }
    (index..limit)
        .find(|&i| chars[i].is_whitespace())
        .map(|i| i + 1)
        .unwrap_or(index)
}

fn dedup(pieces: Vec<(u32, String)>) -> Vec<PageChunk> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(pieces.len());

    for (page, text) in pieces {
        if text.trim().is_empty() {
            continue;
        }
        let hash = normalized_key(&text);
        if !seen.insert(hash.clone()) {
            continue;
        }
        out.push(PageChunk { page, text, hash });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 360, 90).into_chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text_is_no_extractable_content() {
        assert_eq!(chunk_text("", 360, 90), ChunkOutcome::NoExtractableContent);
        assert_eq!(
            chunk_text("  \r\n\t \u{0}\n", 360, 90),
            ChunkOutcome::NoExtractableContent
        );
        assert!(chunk_text("", 360, 90).is_empty());
    }

    #[test]
    fn test_sanitize_strips_controls_and_blank_lines() {
        let raw = "  First\u{0}line \u{7}here  \r\n\r\n\tSecond   line\rThird";
        assert_eq!(sanitize(raw), "First line here\nSecond line\nThird");
    }

    #[test]
    fn test_windows_respect_max_chars() {
        let text = words(200);
        for w in split_windows(&text, 50, 10) {
            assert!(w.chars().count() <= 50, "window too long: {}", w);
            assert!(!w.is_empty());
        }
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let text = words(120);
        let windows = split_windows(&text, 60, 20);
        assert!(windows.len() > 2);
        for pair in windows.windows(2) {
            let first_word = pair[1].split_whitespace().next().unwrap();
            assert!(
                pair[0].split_whitespace().any(|w| w == first_word),
                "{:?} does not start inside {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn test_windows_cover_every_word() {
        let text = words(150);
        let windows = split_windows(&text, 45, 15);
        for i in 0..150 {
            let w = format!("word{}", i);
            assert!(
                windows.iter().any(|win| win.split_whitespace().any(|t| t == w)),
                "{} lost",
                w
            );
        }
    }

    #[test]
    fn test_windows_without_whitespace_hard_split() {
        let text = "x".repeat(25);
        let windows = split_windows(&text, 10, 3);
        assert!(windows.iter().all(|w| w.chars().count() <= 10));
        assert_eq!(windows.first().map(|w| w.len()), Some(10));
        assert!(windows.last().unwrap().ends_with('x'));
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_text(text, 12, 4).into_chunks();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.chars().count() <= 12);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = format!("{}\n\n{}", words(80), words(40));
        let a = chunk_text(&text, 70, 20);
        let b = chunk_text(&text, 70, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rechunking_sanitized_text_is_stable() {
        let raw = "Alpha  beta\r\n\r\ngamma\tdelta";
        let once = chunk_text(raw, 360, 90).into_chunks();
        let again = chunk_text(&sanitize(raw), 360, 90).into_chunks();
        assert_eq!(once, again);
    }

    #[test]
    fn test_duplicate_pages_collapse_to_earliest() {
        let pages = vec![
            "Repeated header text".to_string(),
            "Unique body".to_string(),
            "Repeated   header text".to_string(),
        ];
        let chunks = chunk_pages(&pages, 360, 90).into_chunks();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[0].text, "Repeated header text");
        assert_eq!(chunks[1].page, 2);
    }

    #[test]
    fn test_pages_are_one_based_and_skip_blank_pages() {
        let pages = vec!["".to_string(), "Page two text".to_string()];
        let chunks = chunk_pages(&pages, 360, 90).into_chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 2);
    }

    #[test]
    fn test_normalized_key_ignores_whitespace_layout() {
        assert_eq!(normalized_key("a  b\nc"), normalized_key("a b c"));
        assert_ne!(normalized_key("a b c"), normalized_key("A b c"));
    }
}
