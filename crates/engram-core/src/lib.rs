// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Engram semantic memory engine.
//!
//! Provides the shared error type, domain types, and the collaborator
//! traits implemented by the embedding gateway and knowledge indexer.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::EngramError;
pub use traits::{EmbeddingService, SourceFetcher};
pub use types::{
    Conversation, ConversationState, KnowledgeSource, Memory, MemoryPatch, MetadataMap,
    MetadataValue, SearchFilters, SimilarMemory, SourceStatus, SourceType, StoreOutcome,
};
