// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model for the Engram memory engine.
//!
//! Every section has compiled defaults so a bare `engram.toml` (or none at
//! all) yields a working configuration. Unknown fields are rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration, one section per engine component.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngramConfig {
    /// Datastore settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding service and gateway settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Embedding cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Deduplication filter settings.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Ranking engine settings.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Knowledge indexer settings.
    #[serde(default)]
    pub indexer: IndexerConfig,
}

/// Datastore settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Per-query budget in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

/// Embedding service and gateway settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service.
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    /// Optional bearer token for the embedding service.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used when callers do not specify one.
    #[serde(default = "default_embedding_model")]
    pub default_model: String,

    /// Declared dimension per model name. Writes with a mismatched vector
    /// length are rejected.
    #[serde(default = "default_model_dimensions")]
    pub models: BTreeMap<String, usize>,

    /// Per-call budget in milliseconds for one embedding request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum attempts per call (first try plus retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between retries.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Bounded fan-out for batch embedding.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Consecutive failures within the window that open the circuit.
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,

    /// Rolling failure window in seconds.
    #[serde(default = "default_breaker_window_secs")]
    pub breaker_window_secs: u64,

    /// Cooldown before a single half-open probe is allowed.
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,
}

/// Embedding cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Entry-count ceiling; least-recently-used entries are evicted beyond it.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Time-to-live in seconds, independent of LRU position.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

/// Deduplication filter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    /// Similarity above which a new memory is merged into an existing one.
    #[serde(default = "default_dedup_threshold")]
    pub threshold: f64,
}

/// Ranking engine settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RankingConfig {
    /// Weight of vector similarity in the composite score.
    #[serde(default = "default_weight_similarity")]
    pub weight_similarity: f64,

    /// Weight of creation-time recency.
    #[serde(default = "default_weight_recency")]
    pub weight_recency: f64,

    /// Weight of access frequency.
    #[serde(default = "default_weight_frequency")]
    pub weight_frequency: f64,

    /// Weight of the metadata importance flag.
    #[serde(default = "default_weight_importance")]
    pub weight_importance: f64,

    /// Half-life of the recency decay, in days.
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,

    /// Access count at which the frequency factor saturates.
    #[serde(default = "default_frequency_saturation")]
    pub frequency_saturation: u64,
}

/// Knowledge indexer settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IndexerConfig {
    /// Token budget per chunk.
    #[serde(default = "default_chunk_size_tokens")]
    pub chunk_size_tokens: usize,

    /// Tokens carried from the tail of one chunk into the next.
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,

    /// Budget in milliseconds for fetching a source.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_database_path() -> String {
    "engram.db".to_string()
}
fn default_query_timeout_ms() -> u64 {
    5_000
}
fn default_embedding_base_url() -> String {
    "http://127.0.0.1:8089".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_model_dimensions() -> BTreeMap<String, usize> {
    BTreeMap::from([("text-embedding-3-small".to_string(), 1536)])
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_max_concurrency() -> usize {
    4
}
fn default_breaker_failure_threshold() -> u32 {
    5
}
fn default_breaker_window_secs() -> u64 {
    60
}
fn default_breaker_cooldown_secs() -> u64 {
    30
}
fn default_cache_capacity() -> usize {
    1_024
}
fn default_cache_ttl_secs() -> u64 {
    3_600
}
fn default_dedup_threshold() -> f64 {
    0.95
}
fn default_weight_similarity() -> f64 {
    0.40
}
fn default_weight_recency() -> f64 {
    0.30
}
fn default_weight_frequency() -> f64 {
    0.20
}
fn default_weight_importance() -> f64 {
    0.10
}
fn default_half_life_days() -> f64 {
    30.0
}
fn default_frequency_saturation() -> u64 {
    100
}
fn default_chunk_size_tokens() -> usize {
    500
}
fn default_overlap_tokens() -> usize {
    50
}
fn default_fetch_timeout_ms() -> u64 {
    15_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            api_key: None,
            default_model: default_embedding_model(),
            models: default_model_dimensions(),
            request_timeout_ms: default_request_timeout_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_concurrency: default_max_concurrency(),
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_window_secs: default_breaker_window_secs(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: default_dedup_threshold(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weight_similarity: default_weight_similarity(),
            weight_recency: default_weight_recency(),
            weight_frequency: default_weight_frequency(),
            weight_importance: default_weight_importance(),
            half_life_days: default_half_life_days(),
            frequency_saturation: default_frequency_saturation(),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: default_chunk_size_tokens(),
            overlap_tokens: default_overlap_tokens(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}
