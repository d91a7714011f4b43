// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Knowledge-source rows: indexing lifecycle and hash rotation.

use chrono::{DateTime, Utc};
use engram_core::{EngramError, KnowledgeSource, SourceStatus};
use rusqlite::params;

use crate::database::Database;
use crate::queries::{fmt_ts, parse_json, parse_ts};

const SOURCE_COLS: &str = "id, locator, content_hash, previous_hash, status, chunk_count, \
     indexed_at, metadata, created_at, chunk_size_tokens, overlap_tokens";

fn row_to_source(row: &rusqlite::Row) -> Result<KnowledgeSource, rusqlite::Error> {
    let status: String = row.get(4)?;
    let indexed_at: Option<String> = row.get(6)?;
    let metadata: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(KnowledgeSource {
        id: row.get(0)?,
        locator: row.get(1)?,
        content_hash: row.get(2)?,
        previous_hash: row.get(3)?,
        status: SourceStatus::from_str_value(&status),
        chunk_count: row.get(5)?,
        indexed_at: indexed_at.as_deref().map(|s| parse_ts(6, s)).transpose()?,
        metadata: parse_json(7, &metadata)?,
        created_at: parse_ts(8, &created_at)?,
        chunk_size_tokens: row.get::<_, Option<i64>>(9)?.map(|v| v as usize),
        overlap_tokens: row.get::<_, Option<i64>>(10)?.map(|v| v as usize),
    })
}

/// Create a new source row (status `pending`).
pub async fn create_source(db: &Database, source: &KnowledgeSource) -> Result<(), EngramError> {
    let metadata = serde_json::to_string(&source.metadata)
        .map_err(|e| EngramError::Internal(format!("failed to serialize metadata: {e}")))?;
    let source = source.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO knowledge_sources (id, locator, content_hash, previous_hash, \
             status, chunk_count, indexed_at, metadata, created_at, chunk_size_tokens, \
             overlap_tokens) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                source.id,
                source.locator,
                source.content_hash,
                source.previous_hash,
                source.status.as_str(),
                source.chunk_count,
                source.indexed_at.as_ref().map(fmt_ts),
                metadata,
                fmt_ts(&source.created_at),
                source.chunk_size_tokens.map(|v| v as i64),
                source.overlap_tokens.map(|v| v as i64),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Get a source by id.
pub async fn get_source(db: &Database, id: &str) -> Result<Option<KnowledgeSource>, EngramError> {
    let id = id.to_string();
    db.call(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SOURCE_COLS} FROM knowledge_sources WHERE id = ?1"
        ))?;
        match stmt.query_row(params![id], row_to_source) {
            Ok(source) => Ok(Some(source)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await
}

/// Find a source by its locator (unique).
pub async fn get_source_by_locator(
    db: &Database,
    locator: &str,
) -> Result<Option<KnowledgeSource>, EngramError> {
    let locator = locator.to_string();
    db.call(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SOURCE_COLS} FROM knowledge_sources WHERE locator = ?1"
        ))?;
        match stmt.query_row(params![locator], row_to_source) {
            Ok(source) => Ok(Some(source)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await
}

/// Move a source to a new lifecycle status.
pub async fn set_status(db: &Database, id: &str, status: SourceStatus) -> Result<(), EngramError> {
    let id = id.to_string();
    db.call(move |conn| {
        conn.execute(
            "UPDATE knowledge_sources SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    })
    .await
}

/// Record a completed index pass: rotate hashes, set chunk count and
/// indexed-at, move to `indexed`.
pub async fn record_indexed(
    db: &Database,
    id: &str,
    content_hash: &str,
    previous_hash: Option<&str>,
    chunk_count: i64,
    indexed_at: DateTime<Utc>,
) -> Result<(), EngramError> {
    let id = id.to_string();
    let content_hash = content_hash.to_string();
    let previous_hash = previous_hash.map(|s| s.to_string());
    db.call(move |conn| {
        conn.execute(
            "UPDATE knowledge_sources SET status = 'indexed', content_hash = ?1, \
             previous_hash = ?2, chunk_count = ?3, indexed_at = ?4 WHERE id = ?5",
            params![content_hash, previous_hash, chunk_count, fmt_ts(&indexed_at), id],
        )?;
        Ok(())
    })
    .await
}

/// Pin the chunking geometry a source was indexed with. `None` clears an
/// override back to the engine defaults.
pub async fn set_geometry(
    db: &Database,
    id: &str,
    chunk_size_tokens: Option<i64>,
    overlap_tokens: Option<i64>,
) -> Result<(), EngramError> {
    let id = id.to_string();
    db.call(move |conn| {
        conn.execute(
            "UPDATE knowledge_sources SET chunk_size_tokens = ?1, overlap_tokens = ?2 \
             WHERE id = ?3",
            params![chunk_size_tokens, overlap_tokens, id],
        )?;
        Ok(())
    })
    .await
}

/// Record a partial indexing failure: status `failed` with the number of
/// chunks that committed before the failure, for resumable re-indexing.
pub async fn record_failure(
    db: &Database,
    id: &str,
    committed_chunks: i64,
) -> Result<(), EngramError> {
    let id = id.to_string();
    db.call(move |conn| {
        conn.execute(
            "UPDATE knowledge_sources SET status = 'failed', chunk_count = ?1 WHERE id = ?2",
            params![committed_chunks, id],
        )?;
        Ok(())
    })
    .await
}
