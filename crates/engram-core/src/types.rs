// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for the Engram memory engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a memory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Stored directly from a conversation turn.
    Conversation,
    /// Fetched from a URL.
    Web,
    /// Read from a local file.
    File,
    /// A chunk produced by the knowledge indexer.
    KnowledgeBase,
}

impl SourceType {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Conversation => "conversation",
            SourceType::Web => "web",
            SourceType::File => "file",
            SourceType::KnowledgeBase => "knowledge_base",
        }
    }

    /// Parse from SQLite string.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "web" => SourceType::Web,
            "file" => SourceType::File,
            "knowledge_base" => SourceType::KnowledgeBase,
            _ => SourceType::Conversation,
        }
    }
}

/// A typed metadata value. Metadata maps are validated at the boundary
/// rather than carried as opaque JSON blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    String(String),
    Map(BTreeMap<String, MetadataValue>),
}

/// Open key-value metadata attached to memories and knowledge sources.
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// Read the ranking importance flag from a metadata map.
///
/// Accepts a bool (`true` = 1.0) or a number clamped to [0, 1].
/// Absent or any other type means 0.
pub fn importance_of(metadata: &MetadataMap) -> f64 {
    match metadata.get("importance") {
        Some(MetadataValue::Bool(true)) => 1.0,
        Some(MetadataValue::Number(n)) => n.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Chunk-specific fields carried by memories with
/// [`SourceType::KnowledgeBase`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Sequence number, unique within the owning knowledge source.
    pub seq: i64,
    /// Token count of the chunk content.
    pub token_count: i64,
    /// Optional parent chunk for hierarchical relationships.
    pub parent_chunk_id: Option<String>,
}

/// A single stored memory.
///
/// `content` and `embedding` are write-once; only `tags`, `metadata`,
/// `relevance_score`, `archived`, `last_accessed_at`, and `access_count`
/// may change after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Store-assigned unique identifier.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// The text content (write-once).
    pub content: String,
    /// Embedding vector (write-once, dimension fixed per model).
    #[serde(skip)]
    pub embedding: Vec<f32>,
    /// Name of the model that produced the embedding.
    pub embedding_model: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Typed metadata map.
    pub metadata: MetadataMap,
    /// Provenance of the content.
    pub source_type: SourceType,
    /// Owning knowledge source, for indexed chunks.
    pub source_id: Option<String>,
    /// Chunk fields, present when `source_type` is `KnowledgeBase`.
    pub chunk: Option<ChunkInfo>,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
    /// Last time this memory was consumed by a caller.
    pub last_accessed_at: DateTime<Utc>,
    /// How many times this memory has been consumed or dedup-merged.
    pub access_count: i64,
    /// Mutable decayed relevance score.
    pub relevance_score: f64,
    /// Archived memories are excluded from search unless asked for.
    pub archived: bool,
}

/// A memory paired with its similarity to a query vector.
#[derive(Debug, Clone)]
pub struct SimilarMemory {
    pub memory: Memory,
    /// `1 - cosine_distance`, clamped to [0, 1].
    pub similarity: f64,
}

/// Partial update for the mutable memory fields.
///
/// Anything not listed here (content, embedding, provenance) is write-once;
/// the store rejects attempts to change it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryPatch {
    pub tags: Option<Vec<String>>,
    pub metadata: Option<MetadataMap>,
    pub relevance_score: Option<f64>,
    pub archived: Option<bool>,
}

impl MemoryPatch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.tags.is_none()
            && self.metadata.is_none()
            && self.relevance_score.is_none()
            && self.archived.is_none()
    }
}

/// Filters applied to a similarity query before the top-k cutoff.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Keep memories carrying at least one of these tags. Empty = no filter.
    pub tags: Vec<String>,
    /// Keep memories with one of these source types. Empty = no filter.
    pub source_types: Vec<SourceType>,
    /// Creation-time window (inclusive lower bound).
    pub created_after: Option<DateTime<Utc>>,
    /// Creation-time window (exclusive upper bound).
    pub created_before: Option<DateTime<Utc>>,
    /// Restrict to chunks of one knowledge source.
    pub source_id: Option<String>,
    /// Include archived memories. Off by default.
    pub include_archived: bool,
}

/// Lifecycle state of a conversation. Archival is terminal and read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationState {
    Active,
    Archived,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Active => "active",
            ConversationState::Archived => "archived",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "archived" => ConversationState::Archived,
            _ => ConversationState::Active,
        }
    }
}

/// A conversation scope for memories.
///
/// Conversations are never hard-deleted; archived conversations reject
/// memory writes but remain searchable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub name: Option<String>,
    pub state: ConversationState,
    /// Maintained incrementally on insert; repairable out of band.
    pub memory_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Indexing lifecycle of a knowledge source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Indexing,
    Indexed,
    Failed,
    Stale,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Indexing => "indexing",
            SourceStatus::Indexed => "indexed",
            SourceStatus::Failed => "failed",
            SourceStatus::Stale => "stale",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "indexing" => SourceStatus::Indexing,
            "indexed" => SourceStatus::Indexed,
            "failed" => SourceStatus::Failed,
            "stale" => SourceStatus::Stale,
            _ => SourceStatus::Pending,
        }
    }
}

/// An external document tracked by the knowledge indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub id: String,
    /// URL or filesystem path.
    pub locator: String,
    /// SHA-256 of the raw fetched content. Identifies the current version.
    pub content_hash: Option<String>,
    /// Hash of the previously indexed version, rotated on re-index.
    pub previous_hash: Option<String>,
    pub status: SourceStatus,
    /// Chunks committed for the current version. On `Failed`, the number
    /// committed before the failure, enabling resumable re-indexing.
    pub chunk_count: i64,
    pub indexed_at: Option<DateTime<Utc>>,
    pub metadata: MetadataMap,
    pub created_at: DateTime<Utc>,
    /// Chunking geometry pinned at index time; `None` falls back to the
    /// engine defaults whenever the source is refreshed.
    pub chunk_size_tokens: Option<usize>,
    pub overlap_tokens: Option<usize>,
}

/// Outcome of a store-memory call: either a fresh row or a merge into an
/// existing near-duplicate.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// A new memory was persisted.
    Inserted { id: String },
    /// The deduplication filter suppressed the insert; the existing
    /// memory's id is returned and its access count was bumped.
    Merged { id: String, similarity: f64 },
}

impl StoreOutcome {
    /// The id of the memory this content now lives under.
    pub fn id(&self) -> &str {
        match self {
            StoreOutcome::Inserted { id } => id,
            StoreOutcome::Merged { id, .. } => id,
        }
    }
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Cosine similarity between two vectors of equal dimension.
///
/// Handles unnormalized vectors; zero-magnitude vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Similarity reported to callers: `1 - cosine_distance`, clamped to [0, 1].
pub fn clamped_similarity(a: &[f32], b: &[f32]) -> f64 {
    cosine_similarity(a, b).clamp(0.0, 1.0)
}
