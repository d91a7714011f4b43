// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation CRUD. Conversations are never hard-deleted.

use engram_core::{Conversation, ConversationState, EngramError};
use rusqlite::params;

use crate::database::Database;
use crate::queries::{fmt_ts, parse_ts};

fn row_to_conversation(row: &rusqlite::Row) -> Result<Conversation, rusqlite::Error> {
    let state: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    Ok(Conversation {
        id: row.get(0)?,
        name: row.get(1)?,
        state: ConversationState::from_str_value(&state),
        memory_count: row.get(3)?,
        created_at: parse_ts(4, &created_at)?,
    })
}

/// Create a new conversation.
pub async fn create_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<(), EngramError> {
    let conversation = conversation.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO conversations (id, name, state, memory_count, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation.id,
                conversation.name,
                conversation.state.as_str(),
                conversation.memory_count,
                fmt_ts(&conversation.created_at),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Get a conversation by id.
pub async fn get_conversation(
    db: &Database,
    id: &str,
) -> Result<Option<Conversation>, EngramError> {
    let id = id.to_string();
    db.call(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, state, memory_count, created_at \
             FROM conversations WHERE id = ?1",
        )?;
        match stmt.query_row(params![id], row_to_conversation) {
            Ok(conversation) => Ok(Some(conversation)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await
}

/// Mark a conversation archived. Terminal; memories remain searchable.
///
/// Returns false when the conversation does not exist.
pub async fn archive_conversation(db: &Database, id: &str) -> Result<bool, EngramError> {
    let id = id.to_string();
    db.call(move |conn| {
        let affected = conn.execute(
            "UPDATE conversations SET state = 'archived' WHERE id = ?1",
            params![id],
        )?;
        Ok(affected > 0)
    })
    .await
}

/// Incrementally adjust `memory_count` after a successful insert.
pub async fn bump_memory_count(db: &Database, id: &str, delta: i64) -> Result<(), EngramError> {
    let id = id.to_string();
    db.call(move |conn| {
        conn.execute(
            "UPDATE conversations SET memory_count = memory_count + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        Ok(())
    })
    .await
}

/// Overwrite `memory_count` with a reconciled value.
pub async fn set_memory_count(db: &Database, id: &str, count: i64) -> Result<(), EngramError> {
    let id = id.to_string();
    db.call(move |conn| {
        conn.execute(
            "UPDATE conversations SET memory_count = ?1 WHERE id = ?2",
            params![count, id],
        )?;
        Ok(())
    })
    .await
}
