//! Lexical tokenization and overlap scoring.
//!
//! Tokens are lowercase alphanumeric runs longer than two characters that
//! are not stopwords. Each token longer than three characters also
//! contributes a naive stem with a trailing `es` or `s` removed, so
//! `"capitals"` and `"capital"` meet in the middle.

use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "with", "from", "this", "your", "have", "about", "when", "what",
    "where", "which", "will", "would", "could", "should", "into", "such", "while", "been", "being",
    "make", "made", "also", "than", "then", "them",
];

/// Tokenize text into the lexical term set used for overlap scoring.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    let mut tokens = BTreeSet::new();

    for raw in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
        if raw.len() <= 2 || STOPWORDS.contains(&raw) {
            continue;
        }
        tokens.insert(raw.to_string());
        if raw.len() > 3 {
            if let Some(stem) = raw.strip_suffix("es") {
                tokens.insert(stem.to_string());
            } else if let Some(stem) = raw.strip_suffix('s') {
                tokens.insert(stem.to_string());
            }
        }
    }

    tokens
}

/// Count query terms shared with a chunk's text and filename.
///
/// When nothing overlaps but a query term appears verbatim inside the chunk
/// text (e.g. as part of a longer word), the overlap counts as `1`.
pub fn lexical_overlap(text: &str, filename: &str, query_terms: &BTreeSet<String>) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }

    let tokens = tokenize(&format!("{} {}", text, filename));
    let overlap = tokens.intersection(query_terms).count();
    if overlap > 0 {
        return overlap as f64;
    }

    let lowered = text.to_lowercase();
    if query_terms.iter().any(|term| lowered.contains(term.as_str())) {
        1.0
    } else {
        0.0
    }
}
