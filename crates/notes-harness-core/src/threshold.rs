//! Two-pass similarity threshold filter.
//!
//! # Passes
//!
//! 1. Keep every candidate with `distance ≤ 2 × (1 − similarity_threshold)`.
//!    The minimum distance over *all* input candidates is recorded, even if
//!    nothing survives.
//! 2. Only when more than `secondary_trigger` candidates survive pass 1,
//!    tighten to `min_distance + secondary_margin`, but never below
//!    `min(k, pass-1 survivors)` entries.
//!
//! An empty result is a normal outcome. It tells the caller that generation
//! has nothing from the notes to lean on.

use tracing::debug;

use crate::embedding::similarity_to_distance;
use crate::models::Candidate;
use crate::retrieve::sort_ascending;

/// Survivor count above which the secondary cutoff kicks in.
pub const DEFAULT_SECONDARY_TRIGGER: usize = 20;
/// Distance margin above `min_distance` kept by the secondary cutoff.
pub const DEFAULT_SECONDARY_MARGIN: f64 = 0.25;
/// Effective `min_distance` when retrieval produced no candidates at all.
pub const NO_CANDIDATE_DISTANCE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct ThresholdFilter {
    secondary_trigger: usize,
    secondary_margin: f64,
}

impl Default for ThresholdFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SECONDARY_TRIGGER, DEFAULT_SECONDARY_MARGIN)
    }
}

/// Result of filtering one candidate pool.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// Surviving candidates, ascending by distance.
    pub survivors: Vec<Candidate>,
    /// Minimum distance across every input candidate; `None` if there were none.
    pub min_distance: Option<f64>,
    /// Survivor count after pass 1.
    pub first_pass: usize,
    pub secondary_applied: bool,
}

impl FilterOutcome {
    /// `min_distance`, or [`NO_CANDIDATE_DISTANCE`] when nothing was retrieved.
    pub fn effective_min_distance(&self) -> f64 {
        self.min_distance.unwrap_or(NO_CANDIDATE_DISTANCE)
    }
}

impl ThresholdFilter {
    pub fn new(secondary_trigger: usize, secondary_margin: f64) -> Self {
        Self {
            secondary_trigger,
            secondary_margin,
        }
    }

    pub fn filter(
        &self,
        mut candidates: Vec<Candidate>,
        similarity_threshold: f64,
        k: usize,
    ) -> FilterOutcome {
        let max_distance = similarity_to_distance(similarity_threshold);
        sort_ascending(&mut candidates);

        let min_distance = candidates.first().map(|c| c.distance);
        let input = candidates.len();

        let mut survivors: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.distance <= max_distance)
            .collect();
        let first_pass = survivors.len();

        let mut secondary_applied = false;
        if let Some(min) = min_distance {
            if first_pass > self.secondary_trigger {
                let cutoff = min + self.secondary_margin;
                let within = survivors.iter().take_while(|c| c.distance <= cutoff).count();
                let floor = k.min(first_pass);
                survivors.truncate(within.max(floor));
                secondary_applied = true;
            }
        }

        debug!(
            input,
            max_distance,
            first_pass,
            survivors = survivors.len(),
            secondary_applied,
            min_distance = ?min_distance,
            "threshold filter applied"
        );

        FilterOutcome {
            survivors,
            min_distance,
            first_pass,
            secondary_applied,
        }
    }
}
