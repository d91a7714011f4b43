// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine layer of the Engram semantic memory system.
//!
//! Composes the store and the embedding gateway into the public
//! [`engine::MemoryEngine`] operations: conversation-scoped memory storage
//! with deduplication, composite-ranked semantic search, and knowledge
//! indexing of external documents.

pub mod dedup;
pub mod engine;
pub mod indexer;
pub mod ranking;
pub mod registry;

pub use dedup::DedupFilter;
pub use engine::{MemoryEngine, KNOWLEDGE_CONVERSATION_ID};
pub use indexer::{Chunker, ChunkingOptions, KnowledgeIndexer, SchemeFetcher};
pub use ranking::{RankedMemory, RankingParams, RankingWeights};
pub use registry::ConversationRegistry;
