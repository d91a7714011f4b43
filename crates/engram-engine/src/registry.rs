// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lifecycle: create, archive, and the memory-count ledger.
//!
//! Archival is terminal. Archived conversations reject memory writes with
//! [`EngramError::Conflict`] but remain readable and searchable.

use std::sync::Arc;

use chrono::Utc;
use engram_core::types::{Conversation, ConversationState};
use engram_core::EngramError;
use engram_store::queries::conversations;
use engram_store::{Database, VectorStore};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct ConversationRegistry {
    db: Arc<Database>,
}

impl ConversationRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a new active conversation.
    pub async fn create(&self, name: Option<String>) -> Result<Conversation, EngramError> {
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            name,
            state: ConversationState::Active,
            memory_count: 0,
            created_at: Utc::now(),
        };
        conversations::create_conversation(&self.db, &conversation).await?;
        debug!(id = %conversation.id, "conversation created");
        Ok(conversation)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Conversation>, EngramError> {
        conversations::get_conversation(&self.db, id).await
    }

    /// Resolve a conversation for a memory write.
    ///
    /// Unknown ids are a validation error; archived conversations reject
    /// the write with a conflict.
    pub async fn ensure_writable(&self, id: &str) -> Result<Conversation, EngramError> {
        let conversation = self
            .get(id)
            .await?
            .ok_or_else(|| EngramError::Validation(format!("unknown conversation '{id}'")))?;
        if conversation.state == ConversationState::Archived {
            return Err(EngramError::Conflict(format!(
                "conversation '{id}' is archived and rejects writes"
            )));
        }
        Ok(conversation)
    }

    /// Archive a conversation. Idempotent; unknown ids are a validation
    /// error.
    pub async fn archive(&self, id: &str) -> Result<(), EngramError> {
        let found = conversations::archive_conversation(&self.db, id).await?;
        if !found {
            return Err(EngramError::Validation(format!(
                "unknown conversation '{id}'"
            )));
        }
        debug!(id = %id, "conversation archived");
        Ok(())
    }

    /// Adjust the incremental memory count after successful inserts.
    pub async fn note_inserted(&self, id: &str, delta: i64) -> Result<(), EngramError> {
        conversations::bump_memory_count(&self.db, id, delta).await
    }

    /// Recompute `memory_count` by scan and overwrite the stored value.
    ///
    /// Repair operation for counts that drifted (crash between an insert
    /// and its count bump). Returns the reconciled count.
    pub async fn reconcile(&self, store: &VectorStore, id: &str) -> Result<i64, EngramError> {
        let conversation = self
            .get(id)
            .await?
            .ok_or_else(|| EngramError::Validation(format!("unknown conversation '{id}'")))?;
        let actual = store.count_for_conversation(id).await?;
        if actual != conversation.memory_count {
            warn!(
                id = %id,
                stored = conversation.memory_count,
                actual,
                "memory count drifted, reconciling"
            );
            conversations::set_memory_count(&self.db, id, actual).await?;
        }
        Ok(actual)
    }
}
