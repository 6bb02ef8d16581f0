//! Answer provenance classification.
//!
//! Labels a generated answer as grounded in the user's notes, mixed with
//! general knowledge, or general knowledge only. First matching rule wins:
//!
//! 1. The answer says it could not find the answer in the notes → `model_only`.
//! 2. `min_distance > relevance_cutoff`: nothing retrieved was relevant → `model_only`.
//! 3. The answer contains the enrichment marker → `mixed`, split at the
//!    first marker; an empty enrichment part downgrades to `notes_only`.
//! 4. Otherwise → `notes_only`.

use tracing::debug;

use crate::generation::ENRICHMENT_MARKER;
use crate::models::{AnswerMode, ChunkId, ProvenanceVerdict};

/// Default distance above which retrieval is considered irrelevant.
pub const DEFAULT_RELEVANCE_CUTOFF: f64 = 0.5;

const NOT_FOUND_PHRASES: &[&str] = &[
    "couldn't find",
    "couldn\u{2019}t find",
    "could not find",
    "can't find",
    "can\u{2019}t find",
    "cannot find",
];

#[derive(Debug, Clone)]
pub struct ProvenanceClassifier {
    relevance_cutoff: f64,
    marker: String,
}

impl Default for ProvenanceClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RELEVANCE_CUTOFF)
    }
}

impl ProvenanceClassifier {
    pub fn new(relevance_cutoff: f64) -> Self {
        Self {
            relevance_cutoff,
            marker: ENRICHMENT_MARKER.to_string(),
        }
    }

    /// Use a different structural marker than [`ENRICHMENT_MARKER`].
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn relevance_cutoff(&self) -> f64 {
        self.relevance_cutoff
    }

    /// Classify `answer_text`.
    ///
    /// `selection` is the final reranked chunk order. `declared` is an
    /// optional subset the generator says it actually used; it is preferred
    /// when at least one of its ids is in the selection.
    pub fn classify(
        &self,
        answer_text: &str,
        min_distance: f64,
        selection: &[ChunkId],
        declared: Option<&[ChunkId]>,
    ) -> ProvenanceVerdict {
        let verdict = if is_not_found(answer_text) || min_distance > self.relevance_cutoff {
            ProvenanceVerdict {
                mode: AnswerMode::ModelOnly,
                notes_part: String::new(),
                enrichment_part: answer_text.replace(&self.marker, " ").trim().to_string(),
                citations: Vec::new(),
            }
        } else if let Some((before, after)) = answer_text.split_once(self.marker.as_str()) {
            let notes_part = before.trim().to_string();
            let enrichment_part = after.trim().to_string();
            let mode = if enrichment_part.is_empty() {
                AnswerMode::NotesOnly
            } else {
                AnswerMode::Mixed
            };
            ProvenanceVerdict {
                mode,
                notes_part,
                enrichment_part,
                citations: citations(selection, declared),
            }
        } else {
            ProvenanceVerdict {
                mode: AnswerMode::NotesOnly,
                notes_part: answer_text.trim().to_string(),
                enrichment_part: String::new(),
                citations: citations(selection, declared),
            }
        };

        debug!(
            mode = %verdict.mode,
            min_distance,
            relevance_cutoff = self.relevance_cutoff,
            citations = verdict.citations.len(),
            "answer provenance classified"
        );
        verdict
    }
}

/// True when the answer states that the notes did not contain the answer.
pub fn is_not_found(answer_text: &str) -> bool {
    let lowered = answer_text.to_lowercase();
    lowered.contains("notes") && NOT_FOUND_PHRASES.iter().any(|p| lowered.contains(p))
}

fn citations(selection: &[ChunkId], declared: Option<&[ChunkId]>) -> Vec<ChunkId> {
    if let Some(declared) = declared {
        let mut subset: Vec<ChunkId> = Vec::new();
        for id in declared {
            if selection.contains(id) && !subset.contains(id) {
                subset.push(id.clone());
            }
        }
        if !subset.is_empty() {
            return subset;
        }
    }
    selection.to_vec()
}
