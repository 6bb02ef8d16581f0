//! Text generation collaborator contract.
//!
//! The core never calls a language model. It hands the reranked passages to
//! a [`Generator`] and classifies whatever comes back.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkId, SelectedPassage};

/// Sentinel separating note-grounded text from general-knowledge additions.
pub const ENRICHMENT_MARKER: &str = "<<<ENRICHMENT_START>>>";

/// Canonical answer when the notes do not contain the answer and
/// enrichment is not possible.
pub const NOT_FOUND_ANSWER: &str =
    "I couldn't find an answer in your notes, and I cannot answer that with my own knowledge.";

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub question: String,
    /// Reranked passages, best first.
    pub passages: Vec<SelectedPassage>,
    /// Whether general knowledge may be added after [`ENRICHMENT_MARKER`].
    pub allow_enrichment: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    /// Chunks the generator says it relied on, when it can tell.
    pub declared_citations: Option<Vec<ChunkId>>,
}

impl GeneratedAnswer {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            declared_citations: None,
        }
    }
}

/// Trait for answer generators.
///
/// Failures are surfaced to the caller unchanged; no default answer is
/// synthesized once passages have been retrieved.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedAnswer>;
}
