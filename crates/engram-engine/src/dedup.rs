// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort deduplication at insert time.
//!
//! A single top-1 similarity probe runs before every conversational
//! insert, scoped to the same conversation. Above the threshold the
//! insert is suppressed and the existing memory absorbs the access
//! instead. Knowledge chunks skip this filter: the indexer's
//! supersede-then-reinsert cycle keeps one live copy per source version,
//! and dropping a chunk would leave a hole in its sequence.
//!
//! The probe and the insert are not one atomic unit: two concurrent
//! inserts of near-identical content can both pass the probe and both
//! land. That window is accepted; the single-writer store keeps each
//! individual write consistent.

use engram_core::types::{Memory, SearchFilters, StoreOutcome};
use engram_core::EngramError;
use engram_store::VectorStore;
use tracing::debug;

/// Similarity-threshold gate in front of [`VectorStore::insert`].
#[derive(Debug, Clone, Copy)]
pub struct DedupFilter {
    /// Similarity strictly above this value suppresses the insert.
    threshold: f64,
}

impl Default for DedupFilter {
    fn default() -> Self {
        Self { threshold: 0.95 }
    }
}

impl DedupFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Insert a memory unless a near-duplicate already exists in scope.
    ///
    /// On suppression the existing memory's access count is bumped and
    /// [`StoreOutcome::Merged`] carries its id and the observed similarity.
    pub async fn store(
        &self,
        store: &VectorStore,
        memory: Memory,
    ) -> Result<StoreOutcome, EngramError> {
        let filters = SearchFilters {
            source_id: memory.source_id.clone(),
            ..SearchFilters::default()
        };
        let probe = store
            .query_similar(
                Some(&memory.conversation_id),
                memory.embedding.clone(),
                1,
                &filters,
            )
            .await?;

        if let Some(top) = probe.first() {
            if top.similarity > self.threshold {
                let id = top.memory.id.clone();
                store.record_access(std::slice::from_ref(&id)).await?;
                debug!(
                    existing = %id,
                    similarity = top.similarity,
                    conversation = %memory.conversation_id,
                    "duplicate suppressed"
                );
                metrics::counter!("engram_dedup_suppressed_total").increment(1);
                return Ok(StoreOutcome::Merged {
                    id,
                    similarity: top.similarity,
                });
            }
        }

        let id = store.insert(memory).await?;
        Ok(StoreOutcome::Inserted { id })
    }
}
