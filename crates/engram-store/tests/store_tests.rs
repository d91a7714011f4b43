// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the vector store against an in-memory database.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use engram_core::types::MetadataValue;
use engram_core::{
    Conversation, ConversationState, Memory, MemoryPatch, SearchFilters, SourceType,
};
use engram_store::queries::{conversations, memories};
use engram_store::{Database, VectorStore};

const MODEL: &str = "test-embed";
const DIM: usize = 4;

async fn setup_store() -> VectorStore {
    let db = Arc::new(Database::open_in_memory().await.unwrap());
    let conversation = Conversation {
        id: "c1".to_string(),
        name: Some("test".to_string()),
        state: ConversationState::Active,
        memory_count: 0,
        created_at: Utc::now(),
    };
    conversations::create_conversation(&db, &conversation)
        .await
        .unwrap();
    VectorStore::new(db, BTreeMap::from([(MODEL.to_string(), DIM)]))
}

fn make_memory(content: &str, embedding: Vec<f32>) -> Memory {
    Memory {
        id: String::new(),
        conversation_id: "c1".to_string(),
        content: content.to_string(),
        embedding,
        embedding_model: MODEL.to_string(),
        tags: vec![],
        metadata: BTreeMap::new(),
        source_type: SourceType::Conversation,
        source_id: None,
        chunk: None,
        created_at: Utc::now(),
        last_accessed_at: Utc::now(),
        access_count: 0,
        relevance_score: 0.0,
        archived: false,
    }
}

#[tokio::test]
async fn insert_assigns_id_and_roundtrips() {
    let store = setup_store().await;
    let mut memory = make_memory("the user prefers concise answers", vec![0.1, 0.2, 0.3, 0.4]);
    memory.tags = vec!["preference".to_string()];
    memory
        .metadata
        .insert("importance".to_string(), MetadataValue::Bool(true));

    let id = store.insert(memory).await.unwrap();
    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.content, "the user prefers concise answers");
    assert_eq!(stored.tags, vec!["preference"]);
    assert_eq!(stored.embedding.len(), DIM);
    assert_eq!(
        stored.metadata.get("importance"),
        Some(&MetadataValue::Bool(true))
    );
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() {
    let store = setup_store().await;
    let memory = make_memory("short vector", vec![0.1, 0.2]);
    let err = store.insert(memory).await.unwrap_err();
    assert!(matches!(err, engram_core::EngramError::Validation(_)));
}

#[tokio::test]
async fn unknown_model_is_rejected() {
    let store = setup_store().await;
    let mut memory = make_memory("who are you", vec![0.1, 0.2, 0.3, 0.4]);
    memory.embedding_model = "nonexistent".to_string();
    let err = store.insert(memory).await.unwrap_err();
    assert!(err.to_string().contains("nonexistent"));
}

#[tokio::test]
async fn similarity_order_is_independent_of_insertion_order() {
    let query = vec![1.0f32, 0.0, 0.0, 0.0];
    let near = vec![0.9f32, 0.1, 0.0, 0.0];
    let mid = vec![0.5f32, 0.5, 0.0, 0.0];
    let far = vec![0.0f32, 1.0, 0.0, 0.0];

    for order in [
        vec![("near", &near), ("mid", &mid), ("far", &far)],
        vec![("far", &far), ("mid", &mid), ("near", &near)],
    ] {
        let store = setup_store().await;
        for (name, vector) in &order {
            store
                .insert(make_memory(name, (*vector).clone()))
                .await
                .unwrap();
        }
        let results = store
            .query_similar(Some("c1"), query.clone(), 10, &SearchFilters::default())
            .await
            .unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.memory.content.as_str()).collect();
        assert_eq!(names, vec!["near", "mid", "far"]);
        // Non-increasing similarity.
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }
}

#[tokio::test]
async fn filters_apply_before_top_k_cutoff() {
    let store = setup_store().await;
    // Two untagged memories closest to the query, one tagged further away.
    store
        .insert(make_memory("untagged-close", vec![1.0, 0.0, 0.0, 0.0]))
        .await
        .unwrap();
    store
        .insert(make_memory("untagged-also-close", vec![0.95, 0.05, 0.0, 0.0]))
        .await
        .unwrap();
    let mut tagged = make_memory("tagged-far", vec![0.2, 0.8, 0.0, 0.0]);
    tagged.tags = vec!["wanted".to_string()];
    store.insert(tagged).await.unwrap();

    let filters = SearchFilters {
        tags: vec!["wanted".to_string()],
        ..Default::default()
    };
    let results = store
        .query_similar(Some("c1"), vec![1.0, 0.0, 0.0, 0.0], 1, &filters)
        .await
        .unwrap();
    // A filter-then-truncate bug would return the untagged memory (or nothing).
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory.content, "tagged-far");
}

#[tokio::test]
async fn source_type_and_time_window_filters() {
    let store = setup_store().await;
    let mut old = make_memory("old-web", vec![1.0, 0.0, 0.0, 0.0]);
    old.source_type = SourceType::Web;
    old.created_at = Utc::now() - Duration::days(10);
    store.insert(old).await.unwrap();

    let mut recent = make_memory("recent-conversation", vec![1.0, 0.0, 0.0, 0.0]);
    recent.source_type = SourceType::Conversation;
    store.insert(recent).await.unwrap();

    let filters = SearchFilters {
        source_types: vec![SourceType::Web],
        ..Default::default()
    };
    let results = store
        .query_similar(None, vec![1.0, 0.0, 0.0, 0.0], 10, &filters)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory.content, "old-web");

    let filters = SearchFilters {
        created_after: Some(Utc::now() - Duration::days(1)),
        ..Default::default()
    };
    let results = store
        .query_similar(None, vec![1.0, 0.0, 0.0, 0.0], 10, &filters)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory.content, "recent-conversation");
}

#[tokio::test]
async fn archived_memories_are_hidden_unless_requested() {
    let store = setup_store().await;
    let id = store
        .insert(make_memory("to-archive", vec![1.0, 0.0, 0.0, 0.0]))
        .await
        .unwrap();
    store
        .update_metadata(
            &id,
            &MemoryPatch {
                archived: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let results = store
        .query_similar(None, vec![1.0, 0.0, 0.0, 0.0], 10, &SearchFilters::default())
        .await
        .unwrap();
    assert!(results.is_empty());

    let filters = SearchFilters {
        include_archived: true,
        ..Default::default()
    };
    let results = store
        .query_similar(None, vec![1.0, 0.0, 0.0, 0.0], 10, &filters)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn insert_batch_is_all_or_nothing() {
    let store = setup_store().await;
    let db = store.database();

    // Drive the transactional path directly with a duplicate id so the
    // second row violates the primary key.
    let mut first = make_memory("first", vec![1.0, 0.0, 0.0, 0.0]);
    first.id = "dup".to_string();
    let mut second = make_memory("second", vec![0.0, 1.0, 0.0, 0.0]);
    second.id = "dup".to_string();

    let err = memories::insert_memories(db, vec![first, second]).await;
    assert!(err.is_err());

    // Neither row committed.
    assert!(store.get("dup").await.unwrap().is_none());
    let results = store
        .query_similar(None, vec![1.0, 0.0, 0.0, 0.0], 10, &SearchFilters::default())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn insert_batch_returns_ids_in_order() {
    let store = setup_store().await;
    let batch = vec![
        make_memory("a", vec![1.0, 0.0, 0.0, 0.0]),
        make_memory("b", vec![0.0, 1.0, 0.0, 0.0]),
        make_memory("c", vec![0.0, 0.0, 1.0, 0.0]),
    ];
    let ids = store.insert_batch(batch).await.unwrap();
    assert_eq!(ids.len(), 3);
    for (id, expected) in ids.iter().zip(["a", "b", "c"]) {
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.content, expected);
    }
}

#[tokio::test]
async fn empty_patch_is_a_validation_error() {
    let store = setup_store().await;
    let id = store
        .insert(make_memory("patchable", vec![1.0, 0.0, 0.0, 0.0]))
        .await
        .unwrap();
    let err = store
        .update_metadata(&id, &MemoryPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, engram_core::EngramError::Validation(_)));
}

#[tokio::test]
async fn patch_cannot_express_content_or_embedding() {
    // A patch naming an immutable field fails at the boundary.
    let err = serde_json::from_str::<MemoryPatch>(r#"{"content": "rewritten"}"#);
    assert!(err.is_err());
    let err = serde_json::from_str::<MemoryPatch>(r#"{"embedding": [1.0]}"#);
    assert!(err.is_err());
}

#[tokio::test]
async fn record_access_bumps_counters() {
    let store = setup_store().await;
    let id = store
        .insert(make_memory("consumed", vec![1.0, 0.0, 0.0, 0.0]))
        .await
        .unwrap();

    store.record_access(&[id.clone()]).await.unwrap();
    store.record_access(&[id.clone()]).await.unwrap();

    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.access_count, 2);
}

#[tokio::test]
async fn supersede_chunks_archives_only_live_chunks() {
    let store = setup_store().await;
    let mut chunk = make_memory("chunk one", vec![1.0, 0.0, 0.0, 0.0]);
    chunk.source_type = SourceType::KnowledgeBase;
    chunk.source_id = Some("src-1".to_string());
    chunk.chunk = Some(engram_core::types::ChunkInfo {
        seq: 0,
        token_count: 2,
        parent_chunk_id: None,
    });
    store.insert(chunk).await.unwrap();

    let archived = store.supersede_chunks("src-1").await.unwrap();
    assert_eq!(archived, 1);
    // Second call finds nothing live.
    let archived = store.supersede_chunks("src-1").await.unwrap();
    assert_eq!(archived, 0);
    assert!(store.chunks_for_source("src-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn conversation_count_reconciliation() {
    let store = setup_store().await;
    let db = store.database();

    store
        .insert(make_memory("one", vec![1.0, 0.0, 0.0, 0.0]))
        .await
        .unwrap();
    store
        .insert(make_memory("two", vec![0.0, 1.0, 0.0, 0.0]))
        .await
        .unwrap();

    // The incremental counter was never bumped here; reconcile repairs it.
    let counted = store.count_for_conversation("c1").await.unwrap();
    assert_eq!(counted, 2);
    conversations::set_memory_count(db, "c1", counted).await.unwrap();
    let conversation = conversations::get_conversation(db, "c1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.memory_count, 2);
}
