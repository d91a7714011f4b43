// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory row CRUD and the similarity query.
//!
//! Filters are compiled into the SQL WHERE clause so they apply before the
//! top-k cutoff; cosine scoring runs over the filtered candidate set. A
//! datastore-native vector index would slot in here without changing the
//! callers.

use chrono::Utc;
use engram_core::types::{blob_to_vec, clamped_similarity, vec_to_blob, ChunkInfo};
use engram_core::{EngramError, Memory, MemoryPatch, SearchFilters, SimilarMemory};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};

use crate::database::Database;
use crate::queries::{fmt_ts, parse_json, parse_ts};

const MEMORY_COLS: &str = "id, conversation_id, content, embedding, embedding_model, tags, \
     metadata, source_type, source_id, chunk_seq, token_count, parent_chunk_id, created_at, \
     last_accessed_at, access_count, relevance_score, archived";

/// Map a full memory row (columns in `MEMORY_COLS` order).
fn row_to_memory(row: &rusqlite::Row) -> Result<Memory, rusqlite::Error> {
    let embedding_blob: Vec<u8> = row.get(3)?;
    let tags_json: String = row.get(5)?;
    let metadata_json: String = row.get(6)?;
    let source_type: String = row.get(7)?;
    let chunk_seq: Option<i64> = row.get(9)?;
    let created_at: String = row.get(12)?;
    let last_accessed_at: String = row.get(13)?;

    let chunk = match chunk_seq {
        Some(seq) => Some(ChunkInfo {
            seq,
            token_count: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
            parent_chunk_id: row.get(11)?,
        }),
        None => None,
    };

    Ok(Memory {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        content: row.get(2)?,
        embedding: blob_to_vec(&embedding_blob),
        embedding_model: row.get(4)?,
        tags: parse_json(5, &tags_json)?,
        metadata: parse_json(6, &metadata_json)?,
        source_type: engram_core::SourceType::from_str_value(&source_type),
        source_id: row.get(8)?,
        chunk,
        created_at: parse_ts(12, &created_at)?,
        last_accessed_at: parse_ts(13, &last_accessed_at)?,
        access_count: row.get(14)?,
        relevance_score: row.get(15)?,
        archived: row.get::<_, i64>(16)? != 0,
    })
}

/// Serialize the JSON columns of a memory up front, outside the connection
/// thread, so serialization failures surface as engine errors.
fn memory_row_values(memory: &Memory) -> Result<(String, String), EngramError> {
    let tags = serde_json::to_string(&memory.tags)
        .map_err(|e| EngramError::Internal(format!("failed to serialize tags: {e}")))?;
    let metadata = serde_json::to_string(&memory.metadata)
        .map_err(|e| EngramError::Internal(format!("failed to serialize metadata: {e}")))?;
    Ok((tags, metadata))
}

fn insert_row(
    conn: &rusqlite::Connection,
    memory: &Memory,
    tags_json: &str,
    metadata_json: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO memories (id, conversation_id, content, embedding, embedding_model, tags, \
         metadata, source_type, source_id, chunk_seq, token_count, parent_chunk_id, created_at, \
         last_accessed_at, access_count, relevance_score, archived) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            memory.id,
            memory.conversation_id,
            memory.content,
            vec_to_blob(&memory.embedding),
            memory.embedding_model,
            tags_json,
            metadata_json,
            memory.source_type.as_str(),
            memory.source_id,
            memory.chunk.as_ref().map(|c| c.seq),
            memory.chunk.as_ref().map(|c| c.token_count),
            memory.chunk.as_ref().and_then(|c| c.parent_chunk_id.clone()),
            fmt_ts(&memory.created_at),
            fmt_ts(&memory.last_accessed_at),
            memory.access_count,
            memory.relevance_score,
            memory.archived as i64,
        ],
    )?;
    Ok(())
}

/// Insert a single memory.
pub async fn insert_memory(db: &Database, memory: &Memory) -> Result<(), EngramError> {
    let (tags_json, metadata_json) = memory_row_values(memory)?;
    let memory = memory.clone();
    db.call(move |conn| {
        insert_row(conn, &memory, &tags_json, &metadata_json)?;
        Ok(())
    })
    .await
}

/// Insert a batch of memories in one transaction: all-or-nothing.
pub async fn insert_memories(db: &Database, memories: Vec<Memory>) -> Result<(), EngramError> {
    let mut rows = Vec::with_capacity(memories.len());
    for memory in memories {
        let json = memory_row_values(&memory)?;
        rows.push((memory, json));
    }
    db.call(move |conn| {
        let tx = conn.transaction()?;
        for (memory, (tags_json, metadata_json)) in &rows {
            insert_row(&tx, memory, tags_json, metadata_json)?;
        }
        tx.commit()?;
        Ok(())
    })
    .await
}

/// Get a memory by id.
pub async fn get_memory(db: &Database, id: &str) -> Result<Option<Memory>, EngramError> {
    let id = id.to_string();
    db.call(move |conn| {
        let mut stmt =
            conn.prepare(&format!("SELECT {MEMORY_COLS} FROM memories WHERE id = ?1"))?;
        match stmt.query_row(params![id], row_to_memory) {
            Ok(memory) => Ok(Some(memory)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await
}

/// Build the WHERE clause for a similarity query.
///
/// Every filter lands in SQL so the candidate set is restricted before the
/// top-k cutoff, never after.
fn build_filter_sql(
    conversation_id: Option<&str>,
    filters: &SearchFilters,
) -> (String, Vec<Value>) {
    let mut sql = format!("SELECT {MEMORY_COLS} FROM memories WHERE 1 = 1");
    let mut values: Vec<Value> = Vec::new();

    if !filters.include_archived {
        sql.push_str(" AND archived = 0");
    }
    if let Some(conversation_id) = conversation_id {
        values.push(Value::Text(conversation_id.to_string()));
        sql.push_str(&format!(" AND conversation_id = ?{}", values.len()));
    }
    if let Some(source_id) = &filters.source_id {
        values.push(Value::Text(source_id.clone()));
        sql.push_str(&format!(" AND source_id = ?{}", values.len()));
    }
    if !filters.source_types.is_empty() {
        let mut placeholders = Vec::new();
        for st in &filters.source_types {
            values.push(Value::Text(st.as_str().to_string()));
            placeholders.push(format!("?{}", values.len()));
        }
        sql.push_str(&format!(" AND source_type IN ({})", placeholders.join(", ")));
    }
    if let Some(after) = &filters.created_after {
        values.push(Value::Text(fmt_ts(after)));
        sql.push_str(&format!(" AND created_at >= ?{}", values.len()));
    }
    if let Some(before) = &filters.created_before {
        values.push(Value::Text(fmt_ts(before)));
        sql.push_str(&format!(" AND created_at < ?{}", values.len()));
    }
    if !filters.tags.is_empty() {
        let mut placeholders = Vec::new();
        for tag in &filters.tags {
            values.push(Value::Text(tag.clone()));
            placeholders.push(format!("?{}", values.len()));
        }
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM json_each(memories.tags) WHERE json_each.value IN ({}))",
            placeholders.join(", ")
        ));
    }

    (sql, values)
}

/// Similarity query: filter in SQL, score by cosine similarity, return the
/// top `top_k` in non-increasing similarity order.
///
/// `conversation_id = None` searches across all conversations. Candidates
/// whose embedding dimension does not match the query vector are skipped.
pub async fn query_similar(
    db: &Database,
    conversation_id: Option<&str>,
    query_vector: Vec<f32>,
    top_k: usize,
    filters: &SearchFilters,
) -> Result<Vec<SimilarMemory>, EngramError> {
    let (sql, values) = build_filter_sql(conversation_id, filters);
    db.call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let candidates = stmt
            .query_map(params_from_iter(values.iter()), row_to_memory)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut scored: Vec<SimilarMemory> = candidates
            .into_iter()
            .filter(|m| m.embedding.len() == query_vector.len())
            .map(|memory| {
                let similarity = clamped_similarity(&query_vector, &memory.embedding);
                SimilarMemory { memory, similarity }
            })
            .collect();

        // Non-increasing similarity; deterministic tie-break by newer
        // creation time, then id, so insertion order never matters.
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    })
    .await
}

/// Apply a patch to the mutable fields of a memory.
///
/// Returns false when the memory does not exist. Content, embedding, and
/// provenance are not reachable from [`MemoryPatch`] by construction.
pub async fn update_mutable(
    db: &Database,
    id: &str,
    patch: &MemoryPatch,
) -> Result<bool, EngramError> {
    if patch.is_empty() {
        return Err(EngramError::Validation(
            "patch contains no mutable fields".to_string(),
        ));
    }

    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(tags) = &patch.tags {
        let json = serde_json::to_string(tags)
            .map_err(|e| EngramError::Internal(format!("failed to serialize tags: {e}")))?;
        values.push(Value::Text(json));
        sets.push(format!("tags = ?{}", values.len()));
    }
    if let Some(metadata) = &patch.metadata {
        let json = serde_json::to_string(metadata)
            .map_err(|e| EngramError::Internal(format!("failed to serialize metadata: {e}")))?;
        values.push(Value::Text(json));
        sets.push(format!("metadata = ?{}", values.len()));
    }
    if let Some(score) = patch.relevance_score {
        values.push(Value::Real(score));
        sets.push(format!("relevance_score = ?{}", values.len()));
    }
    if let Some(archived) = patch.archived {
        values.push(Value::Integer(archived as i64));
        sets.push(format!("archived = ?{}", values.len()));
    }

    values.push(Value::Text(id.to_string()));
    let sql = format!(
        "UPDATE memories SET {} WHERE id = ?{}",
        sets.join(", "),
        values.len()
    );

    db.call(move |conn| {
        let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(affected > 0)
    })
    .await
}

/// Bump access count and last-accessed time for consumed memories.
///
/// This is the explicit side effect of a caller actually using a result
/// set; querying alone never mutates the store.
pub async fn record_access(db: &Database, ids: &[String]) -> Result<(), EngramError> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = fmt_ts(&Utc::now());
    let ids = ids.to_vec();
    db.call(move |conn| {
        let placeholders: Vec<String> = (2..=ids.len() + 1).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?1 \
             WHERE id IN ({})",
            placeholders.join(", ")
        );
        let mut values: Vec<Value> = Vec::with_capacity(ids.len() + 1);
        values.push(Value::Text(now));
        values.extend(ids.into_iter().map(Value::Text));
        conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    })
    .await
}

/// Archive every live chunk of a knowledge source (superseded marker).
///
/// Returns the number of chunks archived.
pub async fn supersede_chunks(db: &Database, source_id: &str) -> Result<usize, EngramError> {
    let source_id = source_id.to_string();
    db.call(move |conn| {
        let affected = conn.execute(
            "UPDATE memories SET archived = 1 WHERE source_id = ?1 AND archived = 0",
            params![source_id],
        )?;
        Ok(affected)
    })
    .await
}

/// All live chunks of a source in sequence order.
pub async fn chunks_for_source(db: &Database, source_id: &str) -> Result<Vec<Memory>, EngramError> {
    let source_id = source_id.to_string();
    db.call(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMORY_COLS} FROM memories \
             WHERE source_id = ?1 AND archived = 0 ORDER BY chunk_seq"
        ))?;
        let chunks = stmt
            .query_map(params![source_id], row_to_memory)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chunks)
    })
    .await
}

/// Full-scan count of live memories in a conversation. Reconciliation only;
/// the hot path maintains `memory_count` incrementally.
pub async fn count_for_conversation(
    db: &Database,
    conversation_id: &str,
) -> Result<i64, EngramError> {
    let conversation_id = conversation_id.to_string();
    db.call(move |conn| {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE conversation_id = ?1 AND archived = 0",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(count)
    })
    .await
}
