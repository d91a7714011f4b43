// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `MemoryEngine` facade: the public surface of the system.
//!
//! Wires the store, gateway, registry, dedup filter, and indexer together
//! from an [`EngramConfig`]. Indexed chunks are filed under a reserved
//! conversation that the engine creates on startup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use engram_config::model::EngramConfig;
use engram_core::traits::{EmbeddingService, SourceFetcher};
use engram_core::types::{
    Conversation, KnowledgeSource, Memory, MemoryPatch, SearchFilters, SourceType, StoreOutcome,
};
use engram_core::{EngramError, MetadataMap};
use engram_embed::{BreakerConfig, CacheConfig, EmbeddingGateway, GatewayConfig};
use engram_store::{Database, VectorStore};
use tracing::debug;

use crate::dedup::DedupFilter;
use crate::indexer::{ChunkingOptions, KnowledgeIndexer, SchemeFetcher};
use crate::ranking::{self, RankedMemory, RankingParams, RankingWeights};
use crate::registry::ConversationRegistry;

/// Reserved conversation that knowledge-base chunks are filed under.
pub const KNOWLEDGE_CONVERSATION_ID: &str = "knowledge-base";

pub struct MemoryEngine {
    store: Arc<VectorStore>,
    gateway: Arc<EmbeddingGateway>,
    registry: ConversationRegistry,
    dedup: DedupFilter,
    indexer: KnowledgeIndexer,
    ranking: RankingParams,
    default_model: String,
}

impl MemoryEngine {
    /// Open the configured database and assemble the engine.
    pub async fn new(
        config: &EngramConfig,
        service: Arc<dyn EmbeddingService>,
    ) -> Result<Self, EngramError> {
        let db = Arc::new(
            Database::open(
                &config.storage.database_path,
                Duration::from_millis(config.storage.query_timeout_ms),
            )
            .await?,
        );
        let fetcher = Arc::new(SchemeFetcher::new(Duration::from_millis(
            config.indexer.fetch_timeout_ms,
        ))?);
        Self::with_database(db, config, service, fetcher).await
    }

    /// Assemble the engine over an already-open database and a chosen
    /// fetcher. Used directly by tests with an in-memory database.
    pub async fn with_database(
        db: Arc<Database>,
        config: &EngramConfig,
        service: Arc<dyn EmbeddingService>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Result<Self, EngramError> {
        let store = Arc::new(VectorStore::new(db.clone(), config.embedding.models.clone()));
        store.dimension_of(&config.embedding.default_model)?;

        let gateway = Arc::new(EmbeddingGateway::new(
            service,
            CacheConfig {
                capacity: config.cache.capacity,
                ttl: Duration::from_secs(config.cache.ttl_secs),
            },
            BreakerConfig {
                failure_threshold: config.embedding.breaker_failure_threshold,
                window: Duration::from_secs(config.embedding.breaker_window_secs),
                cooldown: Duration::from_secs(config.embedding.breaker_cooldown_secs),
            },
            GatewayConfig {
                request_timeout: Duration::from_millis(config.embedding.request_timeout_ms),
                max_attempts: config.embedding.max_attempts,
                initial_backoff: Duration::from_millis(config.embedding.initial_backoff_ms),
                max_concurrency: config.embedding.max_concurrency,
            },
        ));

        let registry = ConversationRegistry::new(db);
        let indexer = KnowledgeIndexer::new(
            store.clone(),
            gateway.clone(),
            fetcher,
            KNOWLEDGE_CONVERSATION_ID.to_string(),
            config.embedding.default_model.clone(),
            config.indexer.chunk_size_tokens,
            config.indexer.overlap_tokens,
        );

        let engine = Self {
            store,
            gateway,
            registry,
            dedup: DedupFilter::new(config.dedup.threshold),
            indexer,
            ranking: RankingParams {
                weights: RankingWeights {
                    similarity: config.ranking.weight_similarity,
                    recency: config.ranking.weight_recency,
                    frequency: config.ranking.weight_frequency,
                    importance: config.ranking.weight_importance,
                },
                half_life_days: config.ranking.half_life_days,
                frequency_saturation: config.ranking.frequency_saturation as i64,
            },
            default_model: config.embedding.default_model.clone(),
        };
        engine.ensure_knowledge_conversation().await?;
        Ok(engine)
    }

    async fn ensure_knowledge_conversation(&self) -> Result<(), EngramError> {
        if self.registry.get(KNOWLEDGE_CONVERSATION_ID).await?.is_some() {
            return Ok(());
        }
        let conversation = Conversation {
            id: KNOWLEDGE_CONVERSATION_ID.to_string(),
            name: Some("Knowledge Base".to_string()),
            state: engram_core::types::ConversationState::Active,
            memory_count: 0,
            created_at: Utc::now(),
        };
        engram_store::queries::conversations::create_conversation(
            self.store.database(),
            &conversation,
        )
        .await
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn gateway(&self) -> &EmbeddingGateway {
        &self.gateway
    }

    pub async fn create_conversation(
        &self,
        name: Option<String>,
    ) -> Result<Conversation, EngramError> {
        self.registry.create(name).await
    }

    /// Archive a conversation. Its memories stay searchable; further
    /// writes to it conflict.
    pub async fn archive_conversation(&self, id: &str) -> Result<(), EngramError> {
        self.registry.archive(id).await
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, EngramError> {
        self.registry.get(id).await
    }

    /// Recompute a conversation's memory count by scan.
    pub async fn reconcile_conversation(&self, id: &str) -> Result<i64, EngramError> {
        self.registry.reconcile(&self.store, id).await
    }

    /// Embed and persist one memory, deduplicating within the conversation.
    pub async fn store_memory(
        &self,
        conversation_id: &str,
        content: &str,
        tags: Vec<String>,
        metadata: MetadataMap,
    ) -> Result<StoreOutcome, EngramError> {
        if content.trim().is_empty() {
            return Err(EngramError::Validation("memory content is empty".into()));
        }
        self.registry.ensure_writable(conversation_id).await?;

        let embedding = self.gateway.embed(&self.default_model, content).await?;
        let now = Utc::now();
        let memory = Memory {
            id: String::new(),
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            embedding,
            embedding_model: self.default_model.clone(),
            tags,
            metadata,
            source_type: SourceType::Conversation,
            source_id: None,
            chunk: None,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            relevance_score: 0.0,
            archived: false,
        };

        let outcome = self.dedup.store(&self.store, memory).await?;
        if let StoreOutcome::Inserted { .. } = &outcome {
            self.registry.note_inserted(conversation_id, 1).await?;
        }
        debug!(conversation = conversation_id, outcome = ?outcome, "memory stored");
        Ok(outcome)
    }

    /// Similarity search plus composite ranking.
    ///
    /// Search is read-only: consumption is recorded separately through
    /// [`MemoryEngine::mark_consumed`]. `conversation_id = None` searches
    /// across all conversations, chunks included.
    pub async fn search_memories(
        &self,
        conversation_id: Option<&str>,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
        weights: Option<RankingWeights>,
    ) -> Result<Vec<RankedMemory>, EngramError> {
        if top_k == 0 {
            return Ok(vec![]);
        }
        let query_vector = self.gateway.embed(&self.default_model, query).await?;
        let candidates = self
            .store
            .query_similar(conversation_id, query_vector, top_k, filters)
            .await?;

        let params = RankingParams {
            weights: weights.unwrap_or(self.ranking.weights),
            ..self.ranking.clone()
        };
        ranking::rank(candidates, &params, Utc::now())
    }

    /// Record that the caller actually used these memories.
    pub async fn mark_consumed(&self, ids: &[String]) -> Result<(), EngramError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.store.record_access(ids).await
    }

    /// Patch the mutable fields of a memory.
    pub async fn update_memory(&self, id: &str, patch: &MemoryPatch) -> Result<(), EngramError> {
        self.store.update_metadata(id, patch).await
    }

    pub async fn get_memory(&self, id: &str) -> Result<Option<Memory>, EngramError> {
        self.store.get(id).await
    }

    /// Register and index an external source.
    pub async fn index_source(
        &self,
        locator: &str,
        chunk_size: Option<usize>,
        overlap: Option<usize>,
    ) -> Result<KnowledgeSource, EngramError> {
        self.indexer
            .index_source(locator, ChunkingOptions { chunk_size, overlap })
            .await
    }

    /// Re-index a source; without `force`, unchanged content is a no-op.
    pub async fn refresh_source(
        &self,
        source_id: &str,
        force: bool,
    ) -> Result<KnowledgeSource, EngramError> {
        self.indexer.refresh_source(source_id, force).await
    }

    pub async fn get_source_status(
        &self,
        source_id: &str,
    ) -> Result<Option<KnowledgeSource>, EngramError> {
        self.indexer.get_source(source_id).await
    }
}
