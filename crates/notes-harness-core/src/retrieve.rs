//! Candidate retrieval: pool-size policy over a [`NeighborSearch`] backend.
//!
//! The retriever does not search anything itself. It decides how many
//! candidates to ask the backend for and guarantees that whatever comes back
//! is in ascending-distance order and no longer than requested.

use tracing::debug;

use crate::error::Result;
use crate::models::Candidate;
use crate::store::{NeighborSearch, SearchHit};

/// Default candidate pool multiplier applied to `k`.
pub const DEFAULT_POOL_MULTIPLIER: usize = 5;

#[derive(Debug, Clone)]
pub struct CandidateRetriever {
    pool_multiplier: usize,
}

impl Default for CandidateRetriever {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_MULTIPLIER)
    }
}

impl CandidateRetriever {
    pub fn new(pool_multiplier: usize) -> Self {
        Self {
            pool_multiplier: pool_multiplier.max(1),
        }
    }

    /// `clamp(max(k × multiplier, k), 1, corpus_size)`, or `0` for an empty corpus.
    pub fn pool_size(&self, k: usize, corpus_size: usize) -> usize {
        if corpus_size == 0 {
            return 0;
        }
        k.saturating_mul(self.pool_multiplier)
            .max(k)
            .clamp(1, corpus_size)
    }

    /// Fetch up to `pool_size` hits for `query_embedding`, ascending by distance.
    pub async fn retrieve(
        &self,
        backend: &dyn NeighborSearch,
        owner: &str,
        query_embedding: &[f32],
        pool_size: usize,
    ) -> Result<Vec<SearchHit>> {
        if pool_size == 0 {
            return Ok(Vec::new());
        }

        let mut hits = backend.search(owner, query_embedding, pool_size).await?;
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(pool_size);

        debug!(pool_size, returned = hits.len(), "candidate pool retrieved");
        Ok(hits)
    }
}

/// Stable ascending sort by distance; equal distances keep backend order.
pub fn sort_ascending(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
}
