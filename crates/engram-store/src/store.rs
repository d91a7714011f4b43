// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The vector store: durable persistence of content + vector + metadata
//! with similarity queries and transactional batch writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use engram_core::{EngramError, Memory, MemoryPatch, SearchFilters, SimilarMemory};
use tracing::debug;
use uuid::Uuid;

use crate::database::Database;
use crate::queries::memories;

/// Durable store for memories and chunks.
///
/// Owns dimension validation: every write checks the embedding length
/// against the declared dimension of its model. Content and embedding are
/// write-once; the only mutation paths are [`VectorStore::update_metadata`]
/// and [`VectorStore::record_access`].
pub struct VectorStore {
    db: Arc<Database>,
    /// Declared embedding dimension per model name.
    dimensions: BTreeMap<String, usize>,
}

impl VectorStore {
    pub fn new(db: Arc<Database>, dimensions: BTreeMap<String, usize>) -> Self {
        Self { db, dimensions }
    }

    /// The shared database handle, for the registry and indexer layers.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Declared dimension of a model, or a validation error for unknown models.
    pub fn dimension_of(&self, model: &str) -> Result<usize, EngramError> {
        self.dimensions.get(model).copied().ok_or_else(|| {
            EngramError::Validation(format!("unknown embedding model '{model}'"))
        })
    }

    fn validate_write(&self, memory: &Memory) -> Result<(), EngramError> {
        let expected = self.dimension_of(&memory.embedding_model)?;
        if memory.embedding.len() != expected {
            return Err(EngramError::Validation(format!(
                "embedding dimension {} does not match model '{}' (expects {expected})",
                memory.embedding.len(),
                memory.embedding_model
            )));
        }
        if memory.content.is_empty() {
            return Err(EngramError::Validation("memory content is empty".into()));
        }
        Ok(())
    }

    /// Persist one memory atomically, assigning it a fresh id.
    pub async fn insert(&self, mut memory: Memory) -> Result<String, EngramError> {
        self.validate_write(&memory)?;
        memory.id = Uuid::new_v4().to_string();
        let id = memory.id.clone();
        memories::insert_memory(&self.db, &memory).await?;
        debug!(id = %id, conversation = %memory.conversation_id, "memory inserted");
        Ok(id)
    }

    /// Persist a batch in a single transaction: all rows commit or none do.
    ///
    /// Returned ids match the input order.
    pub async fn insert_batch(&self, mut batch: Vec<Memory>) -> Result<Vec<String>, EngramError> {
        let mut ids = Vec::with_capacity(batch.len());
        for memory in &mut batch {
            self.validate_write(memory)?;
            memory.id = Uuid::new_v4().to_string();
            ids.push(memory.id.clone());
        }
        memories::insert_memories(&self.db, batch).await?;
        debug!(count = ids.len(), "memory batch inserted");
        Ok(ids)
    }

    /// Get a memory by id.
    pub async fn get(&self, id: &str) -> Result<Option<Memory>, EngramError> {
        memories::get_memory(&self.db, id).await
    }

    /// Up to `top_k` memories ordered by ascending cosine distance.
    ///
    /// Filters apply before the cutoff; `conversation_id = None` searches
    /// globally.
    pub async fn query_similar(
        &self,
        conversation_id: Option<&str>,
        query_vector: Vec<f32>,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SimilarMemory>, EngramError> {
        memories::query_similar(&self.db, conversation_id, query_vector, top_k, filters).await
    }

    /// Patch the mutable fields of a memory.
    ///
    /// Immutable fields are not expressible in [`MemoryPatch`]; an empty
    /// patch or an unknown id is a validation error.
    pub async fn update_metadata(&self, id: &str, patch: &MemoryPatch) -> Result<(), EngramError> {
        let found = memories::update_mutable(&self.db, id, patch).await?;
        if !found {
            return Err(EngramError::Validation(format!("unknown memory '{id}'")));
        }
        Ok(())
    }

    /// Explicit consumption side effect: bump access counters.
    pub async fn record_access(&self, ids: &[String]) -> Result<(), EngramError> {
        memories::record_access(&self.db, ids).await
    }

    /// Archive the live chunks of a source under the superseded marker.
    pub async fn supersede_chunks(&self, source_id: &str) -> Result<usize, EngramError> {
        memories::supersede_chunks(&self.db, source_id).await
    }

    /// Live chunks of a source in sequence order.
    pub async fn chunks_for_source(&self, source_id: &str) -> Result<Vec<Memory>, EngramError> {
        memories::chunks_for_source(&self.db, source_id).await
    }

    /// Full-scan memory count for reconciliation.
    pub async fn count_for_conversation(&self, conversation_id: &str) -> Result<i64, EngramError> {
        memories::count_for_conversation(&self.db, conversation_id).await
    }
}
