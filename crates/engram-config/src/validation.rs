// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation of configuration values.
//!
//! Figment guarantees structure; this module checks ranges and
//! cross-field consistency that serde cannot express.

use engram_core::EngramError;

use crate::model::EngramConfig;

/// Validate a loaded configuration, collecting every problem rather than
/// stopping at the first.
pub fn validate_config(config: &EngramConfig) -> Result<(), EngramError> {
    let mut problems = Vec::new();

    if config.storage.database_path.is_empty() {
        problems.push("storage.database_path must not be empty".to_string());
    }

    if config.embedding.models.is_empty() {
        problems.push("embedding.models must declare at least one model dimension".to_string());
    }
    if !config
        .embedding
        .models
        .contains_key(&config.embedding.default_model)
    {
        problems.push(format!(
            "embedding.default_model '{}' has no declared dimension in embedding.models",
            config.embedding.default_model
        ));
    }
    if let Some((model, _)) = config.embedding.models.iter().find(|(_, dim)| **dim == 0) {
        problems.push(format!("embedding.models.{model} dimension must be > 0"));
    }
    if config.embedding.max_attempts == 0 {
        problems.push("embedding.max_attempts must be at least 1".to_string());
    }
    if config.embedding.max_concurrency == 0 {
        problems.push("embedding.max_concurrency must be at least 1".to_string());
    }
    if config.embedding.breaker_failure_threshold == 0 {
        problems.push("embedding.breaker_failure_threshold must be at least 1".to_string());
    }

    if config.cache.capacity == 0 {
        problems.push("cache.capacity must be at least 1".to_string());
    }

    if !(0.0..=1.0).contains(&config.dedup.threshold) {
        problems.push(format!(
            "dedup.threshold must be in [0, 1], got {}",
            config.dedup.threshold
        ));
    }

    let weights = [
        ("ranking.weight_similarity", config.ranking.weight_similarity),
        ("ranking.weight_recency", config.ranking.weight_recency),
        ("ranking.weight_frequency", config.ranking.weight_frequency),
        ("ranking.weight_importance", config.ranking.weight_importance),
    ];
    for (name, w) in weights {
        if w < 0.0 {
            problems.push(format!("{name} must not be negative, got {w}"));
        }
    }
    let weight_sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if weight_sum <= 0.0 {
        problems.push("ranking weights must not all be zero".to_string());
    }
    if config.ranking.half_life_days <= 0.0 {
        problems.push(format!(
            "ranking.half_life_days must be positive, got {}",
            config.ranking.half_life_days
        ));
    }
    if config.ranking.frequency_saturation == 0 {
        problems.push("ranking.frequency_saturation must be at least 1".to_string());
    }

    if config.indexer.chunk_size_tokens == 0 {
        problems.push("indexer.chunk_size_tokens must be at least 1".to_string());
    }
    if config.indexer.overlap_tokens >= config.indexer.chunk_size_tokens {
        problems.push(format!(
            "indexer.overlap_tokens ({}) must be smaller than indexer.chunk_size_tokens ({})",
            config.indexer.overlap_tokens, config.indexer.chunk_size_tokens
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(EngramError::Config(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EngramConfig;

    #[test]
    fn default_config_validates() {
        validate_config(&EngramConfig::default()).unwrap();
    }

    #[test]
    fn zero_weights_rejected() {
        let mut config = EngramConfig::default();
        config.ranking.weight_similarity = 0.0;
        config.ranking.weight_recency = 0.0;
        config.ranking.weight_frequency = 0.0;
        config.ranking.weight_importance = 0.0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("weights"));
    }

    #[test]
    fn negative_weight_rejected() {
        let mut config = EngramConfig::default();
        config.ranking.weight_recency = -0.1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_budget() {
        let mut config = EngramConfig::default();
        config.indexer.overlap_tokens = 500;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn threshold_range_checked() {
        let mut config = EngramConfig::default();
        config.dedup.threshold = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn default_model_must_have_dimension() {
        let mut config = EngramConfig::default();
        config.embedding.default_model = "unknown-model".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("unknown-model"));
    }

    #[test]
    fn multiple_problems_are_collected() {
        let mut config = EngramConfig::default();
        config.cache.capacity = 0;
        config.dedup.threshold = 2.0;
        let err = validate_config(&config).unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("cache.capacity"));
        assert!(rendered.contains("dedup.threshold"));
    }
}
