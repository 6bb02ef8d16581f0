//! Core data models shared by the ingestion and query paths.
//!
//! Chunks and documents are created once at ingestion time and never mutated;
//! re-ingesting a document replaces its whole chunk set. Candidates,
//! selections, and verdicts live for a single query.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::text;

/// Stable address of a chunk: its document plus 0-based position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub document_id: String,
    pub ordinal: u32,
}

impl ChunkId {
    pub fn new(document_id: impl Into<String>, ordinal: u32) -> Self {
        Self {
            document_id: document_id.into(),
            ordinal,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document_id, self.ordinal)
    }
}

/// A user-owned source document (one uploaded file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: String,
    /// Owning user; retrieval never crosses owners.
    pub owner: String,
    pub filename: String,
    /// Highest page that produced at least one chunk.
    pub pages: u32,
}

/// A bounded span of sanitized document text with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    /// 1-based page; non-paginated text is page 1.
    pub page: u32,
    pub text: String,
    /// SHA-256 of the normalized text, used as the dedup key.
    pub hash: String,
    /// L2-normalized embedding vector.
    pub embedding: Vec<f32>,
}

/// A chunk returned from nearest-neighbor search with its distance to the query.
///
/// Distances follow the canonical law: `[0, 2]`, `0` identical, `2` opposite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub chunk_id: ChunkId,
    pub distance: f64,
}

impl Candidate {
    pub fn new(chunk_id: ChunkId, distance: f64) -> Self {
        Self { chunk_id, distance }
    }
}

/// A question ready for retrieval.
#[derive(Debug, Clone)]
pub struct Query {
    pub raw_text: String,
    pub embedding: Vec<f32>,
    pub lexical_terms: BTreeSet<String>,
}

impl Query {
    /// Build a query, deriving its lexical terms from `raw_text`.
    pub fn new(raw_text: impl Into<String>, embedding: Vec<f32>) -> Self {
        let raw_text = raw_text.into();
        let lexical_terms = text::tokenize(&raw_text);
        Self {
            raw_text,
            embedding,
            lexical_terms,
        }
    }
}

/// One entry of a reranked selection.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedPassage {
    pub chunk_id: ChunkId,
    pub filename: String,
    pub page: u32,
    /// The chunk's own text.
    pub text: String,
    /// The chunk joined with its previous and next chunk of the same document.
    pub context_window_text: String,
    pub combined_score: f64,
    /// `None` when the reranker fell back to lexical-only ordering.
    pub mmr_score: Option<f64>,
    pub lexical_overlap: f64,
    pub distance: f64,
}

/// Ordered reranker output, length at most `k`.
pub type SelectionResult = Vec<SelectedPassage>;

/// Where a generated answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    NotesOnly,
    Mixed,
    ModelOnly,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::NotesOnly => "notes_only",
            AnswerMode::Mixed => "mixed",
            AnswerMode::ModelOnly => "model_only",
        }
    }

    pub fn cites_notes(&self) -> bool {
        !matches!(self, AnswerMode::ModelOnly)
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvenanceVerdict {
    pub mode: AnswerMode,
    pub notes_part: String,
    pub enrichment_part: String,
    pub citations: Vec<ChunkId>,
}

impl ProvenanceVerdict {
    /// Marker-free answer text for display.
    pub fn display_text(&self) -> String {
        match (self.notes_part.is_empty(), self.enrichment_part.is_empty()) {
            (false, false) => format!("{}\n\n{}", self.notes_part, self.enrichment_part),
            (false, true) => self.notes_part.clone(),
            (true, _) => self.enrichment_part.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_display() {
        assert_eq!(ChunkId::new("doc-1", 4).to_string(), "doc-1#4");
    }

    #[test]
    fn test_chunk_id_orders_by_document_then_ordinal() {
        let mut ids = vec![
            ChunkId::new("b", 0),
            ChunkId::new("a", 2),
            ChunkId::new("a", 1),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![ChunkId::new("a", 1), ChunkId::new("a", 2), ChunkId::new("b", 0)]
        );
    }

    #[test]
    fn test_query_derives_terms() {
        let q = Query::new("Capital of France", vec![1.0]);
        assert!(q.lexical_terms.contains("capital"));
        assert!(q.lexical_terms.contains("france"));
        assert!(!q.lexical_terms.contains("of"));
    }

    #[test]
    fn test_answer_mode_serializes_snake_case() {
        let json = serde_json::to_string(&AnswerMode::NotesOnly).unwrap();
        assert_eq!(json, "\"notes_only\"");
        assert_eq!(AnswerMode::ModelOnly.to_string(), "model_only");
        assert!(!AnswerMode::ModelOnly.cites_notes());
        assert!(AnswerMode::Mixed.cites_notes());
    }

    #[test]
    fn test_display_text_joins_parts() {
        let v = ProvenanceVerdict {
            mode: AnswerMode::Mixed,
            notes_part: "From notes.".to_string(),
            enrichment_part: "Extra.".to_string(),
            citations: vec![],
        };
        assert_eq!(v.display_text(), "From notes.\n\nExtra.");
    }
}
