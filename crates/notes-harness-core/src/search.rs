//! Query-time retrieval pipeline.
//!
//! Chains the ranking stages over a [`ChunkStore`] and a [`NeighborSearch`]
//! backend. The calling application embeds the query, builds
//! [`RetrievalParams`], and passes the backends in.
//!
//! # Stages
//!
//! 1. [`CandidateRetriever`]: pool of `clamp(max(k×5, k), 1, corpus)` nearest
//!    chunks, each hit carrying its text, vector, filename, and window.
//! 2. [`ThresholdFilter`]: similarity cutoff plus secondary tightening.
//! 3. [`DiversityReranker`]: MMR + lexical fusion down to `k` passages.
//! 4. Each passage gets its context window (previous, self, next chunk) from
//!    the hit it was ranked on.
//!
//! The store is only consulted for the corpus size, which sizes the pool.
//! Everything a passage shows comes from the one search call.
//!
//! Every stage is a pure function of its inputs, so a caller may drop the
//! future between stages without cleanup.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{ChunkId, Query, SelectionResult};
use crate::rerank::{
    DiversityReranker, RerankCandidate, DEFAULT_LAMBDA, DEFAULT_LEXICAL_WEIGHT,
    DEFAULT_RERANK_BUDGET,
};
use crate::retrieve::{CandidateRetriever, DEFAULT_POOL_MULTIPLIER};
use crate::store::{ChunkStore, NeighborSearch, SearchHit};
use crate::threshold::{ThresholdFilter, DEFAULT_SECONDARY_MARGIN, DEFAULT_SECONDARY_TRIGGER};

/// Joins a chunk with its ordinal neighbors in a context window.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

pub const DEFAULT_K: usize = 5;
pub const DEFAULT_MAX_K: usize = 20;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.60;

/// Pipeline tuning, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub pool_multiplier: usize,
    pub rerank_budget: usize,
    pub secondary_cutoff_trigger: usize,
    pub secondary_cutoff_margin: f64,
    pub lexical_weight: f64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            pool_multiplier: DEFAULT_POOL_MULTIPLIER,
            rerank_budget: DEFAULT_RERANK_BUDGET,
            secondary_cutoff_trigger: DEFAULT_SECONDARY_TRIGGER,
            secondary_cutoff_margin: DEFAULT_SECONDARY_MARGIN,
            lexical_weight: DEFAULT_LEXICAL_WEIGHT,
        }
    }
}

/// Per-request knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub k: usize,
    pub similarity_threshold: f64,
    /// MMR trade-off: `1.0` is pure relevance, `0.0` pure diversity.
    pub lambda: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            lambda: DEFAULT_LAMBDA,
        }
    }
}

impl RetrievalParams {
    pub fn validate(&self, max_k: usize) -> Result<()> {
        if self.k == 0 || self.k > max_k {
            return Err(Error::invalid(format!(
                "k must be between 1 and {}, got {}",
                max_k, self.k
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::invalid(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(Error::invalid(format!(
                "lambda must be within [0, 1], got {}",
                self.lambda
            )));
        }
        Ok(())
    }
}

/// Output of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub selection: SelectionResult,
    /// Minimum distance across the whole candidate pool, or `1.0` if empty.
    pub min_distance: f64,
    pub pool_size: usize,
    pub candidates: usize,
    pub survivors: usize,
}

#[derive(Debug, Clone)]
pub struct RetrievalPipeline {
    retriever: CandidateRetriever,
    filter: ThresholdFilter,
    reranker: DiversityReranker,
}

impl Default for RetrievalPipeline {
    fn default() -> Self {
        Self::new(&RetrievalSettings::default())
    }
}

impl RetrievalPipeline {
    pub fn new(settings: &RetrievalSettings) -> Self {
        Self {
            retriever: CandidateRetriever::new(settings.pool_multiplier),
            filter: ThresholdFilter::new(
                settings.secondary_cutoff_trigger,
                settings.secondary_cutoff_margin,
            ),
            reranker: DiversityReranker::new(
                DEFAULT_LAMBDA,
                settings.rerank_budget,
                settings.lexical_weight,
            ),
        }
    }

    pub async fn run(
        &self,
        store: &dyn ChunkStore,
        backend: &dyn NeighborSearch,
        owner: &str,
        query: &Query,
        params: &RetrievalParams,
    ) -> Result<Retrieval> {
        let corpus_size = store.corpus_size(owner).await?;
        let pool_size = self.retriever.pool_size(params.k, corpus_size);
        let hits = self
            .retriever
            .retrieve(backend, owner, &query.embedding, pool_size)
            .await?;
        let candidate_count = hits.len();

        let outcome = self.filter.filter(
            hits.iter().map(SearchHit::candidate).collect(),
            params.similarity_threshold,
            params.k,
        );
        let min_distance = outcome.effective_min_distance();
        let survivor_count = outcome.survivors.len();

        let mut by_id: HashMap<ChunkId, SearchHit> = hits
            .into_iter()
            .map(|hit| (hit.chunk.id.clone(), hit))
            .collect();
        let mut windows: HashMap<ChunkId, Vec<String>> = HashMap::new();
        let mut inputs: Vec<RerankCandidate> = Vec::with_capacity(survivor_count);
        for candidate in &outcome.survivors {
            let Some(hit) = by_id.remove(&candidate.chunk_id) else {
                debug!(chunk = %candidate.chunk_id, "duplicate candidate dropped");
                continue;
            };
            windows.insert(hit.chunk.id.clone(), hit.window);
            inputs.push(RerankCandidate {
                chunk: hit.chunk,
                filename: hit.filename,
                distance: hit.distance,
            });
        }

        let mut selection = self
            .reranker
            .with_lambda(params.lambda)
            .rerank(query, inputs, params.k);
        for passage in selection.iter_mut() {
            if let Some(window) = windows.get(&passage.chunk_id).filter(|w| !w.is_empty()) {
                passage.context_window_text = window.join(CONTEXT_SEPARATOR);
            }
        }

        info!(
            corpus_size,
            pool_size,
            candidates = candidate_count,
            survivors = survivor_count,
            selected = selection.len(),
            min_distance,
            "retrieval complete"
        );

        Ok(Retrieval {
            selection,
            min_distance,
            pool_size,
            candidates: candidate_count,
            survivors: survivor_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Document};
    use crate::store::memory::InMemoryStore;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        let texts = [
            ("Paris is the capital of France", vec![1.0f32, 0.0, 0.0]),
            ("France borders Spain and Italy", vec![0.8, 0.6, 0.0]),
            ("Unrelated biology note", vec![-0.4, 0.0, 0.9165]),
        ];
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, (text, emb))| Chunk {
                id: ChunkId::new("geo", i as u32),
                page: 1,
                text: text.to_string(),
                hash: crate::chunk::normalized_key(text),
                embedding: emb.clone(),
            })
            .collect();
        store
            .replace_document(
                Document {
                    id: "geo".into(),
                    owner: "u1".into(),
                    filename: "geo.md".into(),
                    pages: 1,
                },
                chunks,
            )
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_params_validation() {
        assert!(RetrievalParams::default().validate(20).is_ok());
        let mut p = RetrievalParams::default();
        p.k = 0;
        assert!(p.validate(20).is_err());
        p.k = 21;
        assert!(p.validate(20).is_err());
        p.k = 5;
        p.similarity_threshold = 1.5;
        assert!(p.validate(20).is_err());
        p.similarity_threshold = 0.6;
        p.lambda = -0.1;
        assert!(matches!(p.validate(20), Err(Error::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn test_pipeline_filters_and_windows() {
        let store = seeded().await;
        let query = Query::new("capital of France", vec![1.0, 0.0, 0.0]);
        let params = RetrievalParams {
            k: 1,
            ..RetrievalParams::default()
        };
        let out = RetrievalPipeline::default()
            .run(&store, &store, "u1", &query, &params)
            .await
            .unwrap();

        assert_eq!(out.pool_size, 3);
        assert_eq!(out.candidates, 3);
        assert_eq!(out.survivors, 2);
        assert!(out.min_distance.abs() < 1e-9);
        assert_eq!(out.selection.len(), 1);

        let top = &out.selection[0];
        assert_eq!(top.chunk_id, ChunkId::new("geo", 0));
        assert_eq!(top.filename, "geo.md");
        assert_eq!(
            top.context_window_text,
            "Paris is the capital of France\n---\nFrance borders Spain and Italy"
        );
    }

    #[tokio::test]
    async fn test_pipeline_empty_corpus() {
        let store = InMemoryStore::new();
        let query = Query::new("anything at all", vec![1.0, 0.0, 0.0]);
        let out = RetrievalPipeline::default()
            .run(&store, &store, "u1", &query, &RetrievalParams::default())
            .await
            .unwrap();
        assert!(out.selection.is_empty());
        assert_eq!(out.pool_size, 0);
        assert_eq!(out.min_distance, crate::threshold::NO_CANDIDATE_DISTANCE);
    }

    #[tokio::test]
    async fn test_middle_chunk_window_has_both_neighbors() {
        let store = seeded().await;
        let query = Query::new("France borders", vec![0.8, 0.6, 0.0]);
        let params = RetrievalParams {
            k: 1,
            ..RetrievalParams::default()
        };
        let out = RetrievalPipeline::default()
            .run(&store, &store, "u1", &query, &params)
            .await
            .unwrap();

        let top = &out.selection[0];
        assert_eq!(top.chunk_id, ChunkId::new("geo", 1));
        let parts: Vec<&str> = top.context_window_text.split(CONTEXT_SEPARATOR).collect();
        assert_eq!(
            parts,
            vec![
                "Paris is the capital of France",
                "France borders Spain and Italy",
                "Unrelated biology note"
            ]
        );
    }
}
