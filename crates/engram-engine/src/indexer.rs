// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Knowledge indexing: fetch, hash, chunk, embed, persist.
//!
//! A source moves pending -> indexing -> indexed or failed. A later
//! refresh that sees a differing content hash marks the source stale,
//! supersedes its live chunks, and re-chunks from scratch; a same-hash
//! refresh without force is a no-op. Chunking is paragraph-first with a
//! token budget and a tail overlap carried into the next chunk, counted
//! with the cl100k_base tokenizer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use engram_core::traits::SourceFetcher;
use engram_core::types::{
    ChunkInfo, KnowledgeSource, Memory, SourceStatus, SourceType,
};
use engram_core::EngramError;
use engram_embed::EmbeddingGateway;
use engram_store::queries::{conversations, sources};
use engram_store::VectorStore;
use sha2::{Digest, Sha256};
use tiktoken_rs::{CoreBPE, Rank};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A chunk of source text with its token count.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub content: String,
    pub token_count: usize,
}

/// Paragraph-first accumulation chunker.
///
/// Paragraphs (blank-line separated) are packed into chunks up to the
/// token budget. When a chunk closes, its last `overlap` tokens stay in
/// the accumulator as the seed of the next chunk, so context survives
/// every boundary, hard splits included. The seed does not count against
/// the budget: a chunk holds at most `chunk_size + overlap` tokens.
pub struct Chunker {
    bpe: CoreBPE,
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, EngramError> {
        if chunk_size == 0 {
            return Err(EngramError::Validation("chunk size must be positive".into()));
        }
        if overlap >= chunk_size {
            return Err(EngramError::Validation(format!(
                "overlap {overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| EngramError::Internal(format!("failed to load tokenizer: {e}")))?;
        Ok(Self {
            bpe,
            chunk_size,
            overlap,
        })
    }

    /// Chunk `text` into token-bounded pieces.
    ///
    /// The accumulator carries `seed_len` tokens of seed (the previous
    /// chunk's tail); only tokens past the seed count against the budget.
    /// Paragraphs over the budget fill the pending chunk to capacity and
    /// continue across chunk boundaries without a separator.
    pub fn chunk(&self, text: &str) -> Result<Vec<TextChunk>, EngramError> {
        let sep = self.bpe.encode_ordinary("\n\n");
        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut acc: Vec<Rank> = Vec::new();
        let mut seed_len = 0usize;

        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            let tokens = self.bpe.encode_ordinary(paragraph);
            let sep_cost = if acc.is_empty() { 0 } else { sep.len() };

            if acc.len() - seed_len + sep_cost + tokens.len() <= self.chunk_size {
                if sep_cost > 0 {
                    acc.extend_from_slice(&sep);
                }
                acc.extend_from_slice(&tokens);
                continue;
            }

            if sep.len() + tokens.len() <= self.chunk_size {
                self.close(&mut chunks, &mut acc, &mut seed_len)?;
                if !acc.is_empty() {
                    acc.extend_from_slice(&sep);
                }
                acc.extend_from_slice(&tokens);
                continue;
            }

            // Oversized paragraph: fill the pending chunk to its budget and
            // spill across chunks, each continuation opening with the seed.
            if sep_cost > 0 {
                if acc.len() - seed_len + sep.len() >= self.chunk_size {
                    self.close(&mut chunks, &mut acc, &mut seed_len)?;
                } else {
                    acc.extend_from_slice(&sep);
                }
            }
            let mut offset = 0usize;
            while offset < tokens.len() {
                let room = self.chunk_size.saturating_sub(acc.len() - seed_len);
                let take = room.min(tokens.len() - offset);
                acc.extend_from_slice(&tokens[offset..offset + take]);
                offset += take;
                if offset < tokens.len() {
                    self.close(&mut chunks, &mut acc, &mut seed_len)?;
                }
            }
        }

        if acc.len() > seed_len {
            self.close(&mut chunks, &mut acc, &mut seed_len)?;
        }
        Ok(chunks)
    }

    /// Emit the accumulator as a chunk, then retain its last `overlap`
    /// tokens in place as the next chunk's seed.
    fn close(
        &self,
        chunks: &mut Vec<TextChunk>,
        acc: &mut Vec<Rank>,
        seed_len: &mut usize,
    ) -> Result<(), EngramError> {
        let content = self
            .bpe
            .decode(acc.clone())
            .map_err(|e| EngramError::Internal(format!("failed to decode chunk text: {e}")))?;
        chunks.push(TextChunk {
            content,
            token_count: acc.len(),
        });
        let tail_start = acc.len().saturating_sub(self.overlap);
        acc.drain(..tail_start);
        *seed_len = acc.len();
        Ok(())
    }
}

/// Fetches `http://` and `https://` locators with GET.
pub struct HttpSourceFetcher {
    client: reqwest::Client,
}

impl HttpSourceFetcher {
    pub fn new(timeout: Duration) -> Result<Self, EngramError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngramError::ServiceUnavailable {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, EngramError> {
        let response = self.client.get(locator).send().await.map_err(|e| {
            if e.is_timeout() {
                EngramError::Timeout {
                    duration: Duration::ZERO,
                }
            } else {
                EngramError::ServiceUnavailable {
                    message: format!("fetch of '{locator}' failed: {e}"),
                    source: Some(Box::new(e)),
                }
            }
        })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(EngramError::Validation(format!(
                "fetch of '{locator}' returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(EngramError::unavailable(format!(
                "fetch of '{locator}' returned {status}"
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngramError::ServiceUnavailable {
                message: format!("failed to read body of '{locator}': {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(bytes.to_vec())
    }
}

/// Reads filesystem locators.
pub struct FileSourceFetcher;

#[async_trait]
impl SourceFetcher for FileSourceFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, EngramError> {
        let path = locator.strip_prefix("file://").unwrap_or(locator);
        tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngramError::Validation(format!("source file '{path}' not found"))
            } else {
                EngramError::Internal(format!("failed to read '{path}': {e}"))
            }
        })
    }
}

/// Routes locators by scheme: http(s) to the HTTP fetcher, everything
/// else to the filesystem.
pub struct SchemeFetcher {
    http: HttpSourceFetcher,
    file: FileSourceFetcher,
}

impl SchemeFetcher {
    pub fn new(timeout: Duration) -> Result<Self, EngramError> {
        Ok(Self {
            http: HttpSourceFetcher::new(timeout)?,
            file: FileSourceFetcher,
        })
    }
}

#[async_trait]
impl SourceFetcher for SchemeFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, EngramError> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            self.http.fetch(locator).await
        } else {
            self.file.fetch(locator).await
        }
    }
}

/// Chunking overrides for a single indexing call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkingOptions {
    pub chunk_size: Option<usize>,
    pub overlap: Option<usize>,
}

/// Drives the source lifecycle and owns the chunk/embed/persist pipeline.
pub struct KnowledgeIndexer {
    store: Arc<VectorStore>,
    gateway: Arc<EmbeddingGateway>,
    fetcher: Arc<dyn SourceFetcher>,
    /// Conversation chunks are filed under.
    knowledge_conversation_id: String,
    model: String,
    chunk_size: usize,
    overlap: usize,
}

impl KnowledgeIndexer {
    pub fn new(
        store: Arc<VectorStore>,
        gateway: Arc<EmbeddingGateway>,
        fetcher: Arc<dyn SourceFetcher>,
        knowledge_conversation_id: String,
        model: String,
        chunk_size: usize,
        overlap: usize,
    ) -> Self {
        Self {
            store,
            gateway,
            fetcher,
            knowledge_conversation_id,
            model,
            chunk_size,
            overlap,
        }
    }

    /// Register a locator and run a full index pass.
    ///
    /// A locator that is already registered re-indexes through the normal
    /// refresh path instead of erroring.
    pub async fn index_source(
        &self,
        locator: &str,
        options: ChunkingOptions,
    ) -> Result<KnowledgeSource, EngramError> {
        let db = self.store.database();
        if let Some(mut existing) = sources::get_source_by_locator(db, locator).await? {
            debug!(source = %existing.id, locator, "locator already registered, refreshing");
            if options.chunk_size.is_some() || options.overlap.is_some() {
                // Explicit geometry on a re-index call replaces the pinned
                // geometry; later refreshes keep using it.
                sources::set_geometry(
                    db,
                    &existing.id,
                    options.chunk_size.map(|v| v as i64),
                    options.overlap.map(|v| v as i64),
                )
                .await?;
                existing.chunk_size_tokens = options.chunk_size;
                existing.overlap_tokens = options.overlap;
            }
            return self.run(existing, false).await;
        }

        let source = KnowledgeSource {
            id: Uuid::new_v4().to_string(),
            locator: locator.to_string(),
            content_hash: None,
            previous_hash: None,
            status: SourceStatus::Pending,
            chunk_count: 0,
            indexed_at: None,
            metadata: Default::default(),
            created_at: Utc::now(),
            chunk_size_tokens: options.chunk_size,
            overlap_tokens: options.overlap,
        };
        sources::create_source(db, &source).await?;
        self.run(source, false).await
    }

    /// Re-index an already registered source.
    ///
    /// Without `force`, an unchanged content hash is a no-op.
    pub async fn refresh_source(
        &self,
        source_id: &str,
        force: bool,
    ) -> Result<KnowledgeSource, EngramError> {
        let source = sources::get_source(self.store.database(), source_id)
            .await?
            .ok_or_else(|| {
                EngramError::Validation(format!("unknown knowledge source '{source_id}'"))
            })?;
        self.run(source, force).await
    }

    pub async fn get_source(&self, source_id: &str) -> Result<Option<KnowledgeSource>, EngramError> {
        sources::get_source(self.store.database(), source_id).await
    }

    async fn run(
        &self,
        source: KnowledgeSource,
        force: bool,
    ) -> Result<KnowledgeSource, EngramError> {
        let db = self.store.database();

        let bytes = match self.fetcher.fetch(&source.locator).await {
            Ok(bytes) => bytes,
            Err(err) => {
                sources::record_failure(db, &source.id, 0).await?;
                warn!(source = %source.id, error = %err, "source fetch failed");
                return Err(err);
            }
        };
        let hash = hex::encode(Sha256::digest(&bytes));

        if !force
            && source.status == SourceStatus::Indexed
            && source.content_hash.as_deref() == Some(hash.as_str())
        {
            debug!(source = %source.id, "content hash unchanged, skipping re-index");
            return Ok(source);
        }

        if source.status == SourceStatus::Indexed {
            // Hash differs (or force): the indexed copy is out of date.
            sources::set_status(db, &source.id, SourceStatus::Stale).await?;
            metrics::counter!("engram_source_reindexed_total").increment(1);
        }
        sources::set_status(db, &source.id, SourceStatus::Indexing).await?;

        // Geometry pinned on the source row wins; engine defaults otherwise.
        let chunker = Chunker::new(
            source.chunk_size_tokens.unwrap_or(self.chunk_size),
            source.overlap_tokens.unwrap_or(self.overlap),
        )?;
        let text = String::from_utf8_lossy(&bytes);
        let chunks = chunker.chunk(&text)?;

        let superseded = self.store.supersede_chunks(&source.id).await?;
        if superseded > 0 {
            debug!(source = %source.id, superseded, "old chunks superseded");
            conversations::bump_memory_count(
                db,
                &self.knowledge_conversation_id,
                -(superseded as i64),
            )
            .await?;
        }

        let mut committed: usize = 0;
        for (seq, chunk) in chunks.iter().enumerate() {
            match self.gateway.embed(&self.model, &chunk.content).await {
                Ok(vector) => {
                    let memory = self.chunk_memory(&source, seq as i64, chunk, vector);
                    self.store.insert(memory).await?;
                    conversations::bump_memory_count(db, &self.knowledge_conversation_id, 1)
                        .await?;
                    committed += 1;
                }
                Err(err) => {
                    sources::record_failure(db, &source.id, committed as i64).await?;
                    warn!(
                        source = %source.id,
                        committed,
                        remaining = chunks.len() - committed,
                        error = %err,
                        "indexing failed partway"
                    );
                    return Err(EngramError::PartialFailure {
                        job_id: source.id.clone(),
                        succeeded: committed,
                        failed: chunks.len() - committed,
                        message: err.to_string(),
                    });
                }
            }
        }

        sources::record_indexed(
            db,
            &source.id,
            &hash,
            source.content_hash.as_deref(),
            committed as i64,
            Utc::now(),
        )
        .await?;
        info!(source = %source.id, chunks = committed, "source indexed");

        sources::get_source(db, &source.id).await?.ok_or_else(|| {
            EngramError::Internal(format!("source '{}' vanished during indexing", source.id))
        })
    }

    fn chunk_memory(
        &self,
        source: &KnowledgeSource,
        seq: i64,
        chunk: &TextChunk,
        embedding: Vec<f32>,
    ) -> Memory {
        let now = Utc::now();
        Memory {
            id: String::new(),
            conversation_id: self.knowledge_conversation_id.clone(),
            content: chunk.content.clone(),
            embedding,
            embedding_model: self.model.clone(),
            tags: vec![],
            metadata: source.metadata.clone(),
            source_type: SourceType::KnowledgeBase,
            source_id: Some(source.id.clone()),
            chunk: Some(ChunkInfo {
                seq,
                token_count: chunk.token_count as i64,
                parent_chunk_id: None,
            }),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            relevance_score: 0.0,
            archived: false,
        }
    }
}
