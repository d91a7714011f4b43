// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composite ranking over similarity-search candidates.
//!
//! Pure functions only: ranking never touches the store. The composite
//! score blends similarity, recency, access frequency, and an importance
//! flag read from memory metadata, each factor in [0, 1].

use chrono::{DateTime, Utc};
use engram_core::types::{importance_of, Memory, SimilarMemory};
use engram_core::EngramError;

/// Relative weights of the four ranking factors.
///
/// The weights need not sum to 1; they are normalized before use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingWeights {
    pub similarity: f64,
    pub recency: f64,
    pub frequency: f64,
    pub importance: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            similarity: 0.40,
            recency: 0.30,
            frequency: 0.20,
            importance: 0.10,
        }
    }
}

impl RankingWeights {
    /// Scale the weights to sum to 1.
    ///
    /// Negative weights and an all-zero set are rejected: an all-zero set
    /// would rank every candidate identically, which is never intended.
    pub fn normalized(&self) -> Result<RankingWeights, EngramError> {
        for (name, value) in [
            ("similarity", self.similarity),
            ("recency", self.recency),
            ("frequency", self.frequency),
            ("importance", self.importance),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(EngramError::Validation(format!(
                    "ranking weight '{name}' must be a non-negative number, got {value}"
                )));
            }
        }
        let sum = self.similarity + self.recency + self.frequency + self.importance;
        if sum <= 0.0 {
            return Err(EngramError::Validation(
                "ranking weights must not all be zero".into(),
            ));
        }
        Ok(RankingWeights {
            similarity: self.similarity / sum,
            recency: self.recency / sum,
            frequency: self.frequency / sum,
            importance: self.importance / sum,
        })
    }
}

/// Tunables beyond the weights themselves.
#[derive(Debug, Clone)]
pub struct RankingParams {
    pub weights: RankingWeights,
    /// Recency half-life in days.
    pub half_life_days: f64,
    /// Access count at which the frequency factor saturates at 1.
    pub frequency_saturation: i64,
}

impl Default for RankingParams {
    fn default() -> Self {
        Self {
            weights: RankingWeights::default(),
            half_life_days: 30.0,
            frequency_saturation: 100,
        }
    }
}

/// A candidate with its composite score attached.
#[derive(Debug, Clone)]
pub struct RankedMemory {
    pub memory: Memory,
    /// Similarity to the query vector, as reported by the store.
    pub similarity: f64,
    /// Composite ranking score in [0, 1].
    pub score: f64,
}

/// Exponential decay with the configured half-life: a memory created
/// `half_life_days` ago scores exactly 0.5.
pub fn recency_factor(created_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let age_days = (now - created_at).num_milliseconds() as f64 / 86_400_000.0;
    if age_days <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(age_days / half_life_days).clamp(0.0, 1.0)
}

/// Log-saturating frequency: early accesses matter most, and the factor
/// reaches 1 at the saturation count.
pub fn frequency_factor(access_count: i64, saturation: i64) -> f64 {
    if saturation <= 0 {
        return 0.0;
    }
    let count = access_count.max(0) as f64;
    (count.ln_1p() / (saturation as f64).ln_1p()).min(1.0)
}

/// Rank candidates by composite score, descending.
///
/// Ties break deterministically: newer `created_at` first, then lower id.
pub fn rank(
    candidates: Vec<SimilarMemory>,
    params: &RankingParams,
    now: DateTime<Utc>,
) -> Result<Vec<RankedMemory>, EngramError> {
    let weights = params.weights.normalized()?;

    let mut ranked: Vec<RankedMemory> = candidates
        .into_iter()
        .map(|candidate| {
            let score = composite_score(&candidate.memory, candidate.similarity, &weights, params, now);
            RankedMemory {
                similarity: candidate.similarity,
                score,
                memory: candidate.memory,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });

    Ok(ranked)
}

fn composite_score(
    memory: &Memory,
    similarity: f64,
    weights: &RankingWeights,
    params: &RankingParams,
    now: DateTime<Utc>,
) -> f64 {
    weights.similarity * similarity.clamp(0.0, 1.0)
        + weights.recency * recency_factor(memory.created_at, now, params.half_life_days)
        + weights.frequency * frequency_factor(memory.access_count, params.frequency_saturation)
        + weights.importance * importance_of(&memory.metadata)
}
