// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Engram configuration system.

use engram_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_engram_config() {
    let toml = r#"
[storage]
database_path = "/tmp/engram-test.db"
query_timeout_ms = 2500

[embedding]
base_url = "http://localhost:9090"
api_key = "sk-test-123"
default_model = "mini-embed"
request_timeout_ms = 4000
max_attempts = 5
max_concurrency = 8

[embedding.models]
mini-embed = 384
text-embedding-3-small = 1536

[cache]
capacity = 256
ttl_secs = 120

[dedup]
threshold = 0.9

[ranking]
weight_similarity = 0.5
weight_recency = 0.2
weight_frequency = 0.2
weight_importance = 0.1
half_life_days = 14.0

[indexer]
chunk_size_tokens = 400
overlap_tokens = 40
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.storage.database_path, "/tmp/engram-test.db");
    assert_eq!(config.storage.query_timeout_ms, 2500);
    assert_eq!(config.embedding.base_url, "http://localhost:9090");
    assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test-123"));
    assert_eq!(config.embedding.default_model, "mini-embed");
    assert_eq!(config.embedding.models.get("mini-embed").copied(), Some(384));
    assert_eq!(config.embedding.max_attempts, 5);
    assert_eq!(config.cache.capacity, 256);
    assert_eq!(config.cache.ttl_secs, 120);
    assert_eq!(config.dedup.threshold, 0.9);
    assert_eq!(config.ranking.weight_similarity, 0.5);
    assert_eq!(config.ranking.half_life_days, 14.0);
    assert_eq!(config.indexer.chunk_size_tokens, 400);
    assert_eq!(config.indexer.overlap_tokens, 40);
}

/// Missing sections fall back to compiled defaults.
#[test]
fn partial_toml_uses_defaults() {
    let toml = r#"
[cache]
capacity = 16
"#;
    let config = load_config_from_str(toml).expect("partial TOML should deserialize");
    assert_eq!(config.cache.capacity, 16);
    // Everything else is defaulted.
    assert_eq!(config.cache.ttl_secs, 3600);
    assert_eq!(config.dedup.threshold, 0.95);
    assert_eq!(config.indexer.chunk_size_tokens, 500);
}

/// Unknown fields are rejected, not silently ignored.
#[test]
fn unknown_field_is_rejected() {
    let toml = r#"
[dedup]
treshold = 0.9
"#;
    assert!(load_config_from_str(toml).is_err());
}

/// Validation runs after deserialization and catches range errors.
#[test]
fn validation_rejects_out_of_range_values() {
    let toml = r#"
[dedup]
threshold = 1.5
"#;
    let err = load_and_validate_str(toml).unwrap_err();
    assert!(err.to_string().contains("dedup.threshold"));
}

/// An empty string loads the full default configuration.
#[test]
fn empty_config_is_valid() {
    let config = load_and_validate_str("").expect("defaults should validate");
    assert_eq!(config.dedup.threshold, 0.95);
    assert_eq!(config.embedding.breaker_failure_threshold, 5);
}
