//! Maximal Marginal Relevance reranking fused with lexical overlap.
//!
//! # Algorithm
//!
//! 1. Cap the thresholded candidates to the first `budget` by ascending
//!    distance before any vector work.
//! 2. `rel(i)` = cosine similarity of candidate `i` to the query vector.
//! 3. Seed with the highest-`rel` candidate.
//! 4. Repeatedly add the candidate maximizing
//!    `λ·rel(i) − (1−λ)·max_{j∈selected} sim(i, j)` until `k` are picked.
//!    Ties go to the earliest index.
//! 5. Order the picks by `mmr_score + lexical_weight × lexical_overlap`,
//!    descending, with lexical overlap breaking remaining ties.
//!
//! If any capped candidate lacks a usable vector (missing, wrong dimension,
//! or zero), the reranker logs a warning and orders the whole thresholded
//! set by lexical overlap instead. It never fails.
//!
//! Context windows are attached afterwards by [`crate::search`], which has
//! access to the chunk store.

use tracing::{debug, warn};

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, Query, SelectedPassage, SelectionResult};
use crate::text::lexical_overlap;

pub const DEFAULT_LAMBDA: f64 = 0.7;
/// Maximum candidates considered for MMR, regardless of corpus size.
pub const DEFAULT_RERANK_BUDGET: usize = 15;
pub const DEFAULT_LEXICAL_WEIGHT: f64 = 0.1;

/// A thresholded candidate with the chunk and document data reranking needs.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub chunk: Chunk,
    pub filename: String,
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct DiversityReranker {
    lambda: f64,
    budget: usize,
    lexical_weight: f64,
}

impl Default for DiversityReranker {
    fn default() -> Self {
        Self::new(DEFAULT_LAMBDA, DEFAULT_RERANK_BUDGET, DEFAULT_LEXICAL_WEIGHT)
    }
}

#[derive(Clone, Copy)]
struct Pick {
    index: usize,
    mmr_score: f64,
}

impl Pick {
    fn better_than(self, other: &Self) -> bool {
        self.mmr_score > other.mmr_score
            || (self.mmr_score == other.mmr_score && self.index < other.index)
    }
}

impl DiversityReranker {
    pub fn new(lambda: f64, budget: usize, lexical_weight: f64) -> Self {
        Self {
            lambda: lambda.clamp(0.0, 1.0),
            budget: budget.max(1),
            lexical_weight,
        }
    }

    pub fn with_lambda(&self, lambda: f64) -> Self {
        Self::new(lambda, self.budget, self.lexical_weight)
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Select and order at most `k` passages from `candidates`.
    pub fn rerank(
        &self,
        query: &Query,
        mut candidates: Vec<RerankCandidate>,
        k: usize,
    ) -> SelectionResult {
        if candidates.is_empty() || k == 0 {
            return Vec::new();
        }
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let lexical: Vec<f64> = candidates
            .iter()
            .map(|c| lexical_overlap(&c.chunk.text, &c.filename, &query.lexical_terms))
            .collect();

        let capped = candidates.len().min(self.budget);
        let relevance: Option<Vec<f64>> = candidates[..capped]
            .iter()
            .map(|c| cosine_similarity(&query.embedding, &c.chunk.embedding))
            .collect();

        let Some(relevance) = relevance else {
            warn!(
                candidates = candidates.len(),
                "candidate vectors unusable for MMR, falling back to lexical ordering"
            );
            return self.lexical_fallback(candidates, &lexical, k);
        };

        let picks = self.select(&candidates[..capped], &relevance, k);
        debug!(
            capped,
            selected = picks.len(),
            lambda = self.lambda,
            "mmr selection complete"
        );

        let mut slots: Vec<Option<RerankCandidate>> = candidates.into_iter().map(Some).collect();
        let mut selection: SelectionResult = picks
            .into_iter()
            .filter_map(|pick| {
                let candidate = slots[pick.index].take()?;
                Some(self.passage(candidate, Some(pick.mmr_score), lexical[pick.index]))
            })
            .collect();

        selection.sort_by(|a, b| {
            b.combined_score
                .total_cmp(&a.combined_score)
                .then(b.lexical_overlap.total_cmp(&a.lexical_overlap))
        });
        selection
    }

    fn select(&self, pool: &[RerankCandidate], relevance: &[f64], k: usize) -> Vec<Pick> {
        let n = pool.len();
        let mut similarity = vec![vec![0.0f64; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let s = cosine_similarity(&pool[i].chunk.embedding, &pool[j].chunk.embedding)
                    .unwrap_or(0.0);
                similarity[i][j] = s;
                similarity[j][i] = s;
            }
        }

        let mut chosen = vec![false; n];
        let mut picks: Vec<Pick> = Vec::with_capacity(k.min(n));

        let mut seed = Pick {
            index: 0,
            mmr_score: relevance[0],
        };
        for (index, &rel) in relevance.iter().enumerate().skip(1) {
            let pick = Pick {
                index,
                mmr_score: rel,
            };
            if pick.better_than(&seed) {
                seed = pick;
            }
        }
        chosen[seed.index] = true;
        picks.push(seed);

        while picks.len() < k.min(n) {
            let mut best: Option<Pick> = None;
            for i in (0..n).filter(|&i| !chosen[i]) {
                let redundancy = picks
                    .iter()
                    .map(|p| similarity[i][p.index])
                    .fold(f64::NEG_INFINITY, f64::max);
                let pick = Pick {
                    index: i,
                    mmr_score: self.lambda * relevance[i] - (1.0 - self.lambda) * redundancy,
                };
                if best.map_or(true, |b| pick.better_than(&b)) {
                    best = Some(pick);
                }
            }
            let Some(pick) = best else { break };
            chosen[pick.index] = true;
            picks.push(pick);
        }

        picks
    }

    fn lexical_fallback(
        &self,
        candidates: Vec<RerankCandidate>,
        lexical: &[f64],
        k: usize,
    ) -> SelectionResult {
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| lexical[b].total_cmp(&lexical[a]));
        order.truncate(k);

        let mut slots: Vec<Option<RerankCandidate>> = candidates.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|i| {
                let candidate = slots[i].take()?;
                Some(self.passage(candidate, None, lexical[i]))
            })
            .collect()
    }

    fn passage(
        &self,
        candidate: RerankCandidate,
        mmr_score: Option<f64>,
        lexical_overlap: f64,
    ) -> SelectedPassage {
        let combined_score = mmr_score.unwrap_or(0.0) + self.lexical_weight * lexical_overlap;
        let RerankCandidate {
            chunk,
            filename,
            distance,
        } = candidate;
        SelectedPassage {
            chunk_id: chunk.id,
            filename,
            page: chunk.page,
            context_window_text: chunk.text.clone(),
            text: chunk.text,
            combined_score,
            mmr_score,
            lexical_overlap,
            distance,
        }
    }
}
