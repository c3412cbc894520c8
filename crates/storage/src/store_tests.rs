// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ov_core::Conversation;

fn store() -> ConversationStore {
    ConversationStore::open_in_memory().unwrap()
}

fn conv(id: &str, started_at: &str) -> Conversation {
    Conversation::root(
        ConversationId::new(id),
        format!("prompt for {id}"),
        started_at.to_string(),
    )
}

fn action(id: &str, conv_id: &str, kind: ActionKind, ts: &str) -> Action {
    Action::new(
        ActionId::new(id),
        ConversationId::new(conv_id),
        kind,
        "content",
        ts.to_string(),
    )
}

#[test]
fn create_and_get_roundtrip() {
    let store = store();
    let mut c = conv("c-1", "2026-01-01T00:00:00.000Z");
    c.metadata
        .insert("origin".to_string(), serde_json::json!("test"));
    store.create_conversation(&c).unwrap();

    let got = store.get_conversation(&c.id).unwrap().unwrap();
    assert_eq!(got, c);

    assert!(store
        .get_conversation(&ConversationId::new("missing"))
        .unwrap()
        .is_none());
}

#[test]
fn create_is_idempotent_on_primary_key() {
    let store = store();
    let c = conv("c-1", "2026-01-01T00:00:00.000Z");
    store.create_conversation(&c).unwrap();

    // Replayed insert with different prompt must not clobber the original
    let mut replay = c.clone();
    replay.prompt = "different".to_string();
    store.create_conversation(&replay).unwrap();

    let got = store.get_conversation(&c.id).unwrap().unwrap();
    assert_eq!(got.prompt, "prompt for c-1");
}

#[test]
fn update_status_and_metadata() {
    let store = store();
    let c = conv("c-1", "2026-01-01T00:00:00.000Z");
    store.create_conversation(&c).unwrap();

    let mut metadata = std::collections::HashMap::new();
    metadata.insert("files".to_string(), serde_json::json!(["a.ts"]));
    store
        .update_conversation(&c.id, Some(TaskStatus::Completed), Some(&metadata))
        .unwrap();

    let got = store.get_conversation(&c.id).unwrap().unwrap();
    assert_eq!(got.status, TaskStatus::Completed);
    assert_eq!(got.metadata["files"], serde_json::json!(["a.ts"]));
}

#[test]
fn update_missing_conversation_errors() {
    let store = store();
    let err = store
        .update_conversation(
            &ConversationId::new("missing"),
            Some(TaskStatus::Failed),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn active_conversations_excludes_terminal() {
    let store = store();
    for (id, status) in [
        ("c-1", TaskStatus::Running),
        ("c-2", TaskStatus::Completed),
        ("c-3", TaskStatus::Paused),
        ("c-4", TaskStatus::Failed),
    ] {
        let mut c = conv(id, "2026-01-01T00:00:00.000Z");
        c.status = status;
        store.create_conversation(&c).unwrap();
    }

    let active = store.get_active_conversations().unwrap();
    let ids: Vec<&str> = active.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c-1", "c-3"]);
}

#[test]
fn tree_returns_descendants_in_depth_order() {
    let store = store();
    let root = conv("root", "2026-01-01T00:00:00.000Z");
    let child_b = Conversation::child_of(
        &root,
        ConversationId::new("child-b"),
        "b",
        "2026-01-01T00:00:02.000Z".to_string(),
    );
    let child_a = Conversation::child_of(
        &root,
        ConversationId::new("child-a"),
        "a",
        "2026-01-01T00:00:01.000Z".to_string(),
    );
    let grandchild = Conversation::child_of(
        &child_a,
        ConversationId::new("grandchild"),
        "g",
        "2026-01-01T00:00:03.000Z".to_string(),
    );
    // An unrelated tree must not leak in
    let stranger = conv("stranger", "2026-01-01T00:00:00.500Z");

    for c in [&root, &child_b, &child_a, &grandchild, &stranger] {
        store.create_conversation(c).unwrap();
    }

    let tree = store.get_conversation_tree(&root.id).unwrap();
    let ids: Vec<&str> = tree.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["root", "child-a", "child-b", "grandchild"]);
    assert_eq!(tree[0].depth, 0);
    assert_eq!(tree[3].depth, 2);
}

#[test]
fn actions_ordered_and_recent_query() {
    let store = store();
    store
        .create_conversation(&conv("c-1", "2026-01-01T00:00:00.000Z"))
        .unwrap();

    store
        .log_action(&action(
            "a-1",
            "c-1",
            ActionKind::TaskStarted,
            "2026-01-01T00:00:01.000Z",
        ))
        .unwrap();
    store
        .log_action(&action(
            "a-2",
            "c-1",
            ActionKind::FileCreated,
            "2026-01-01T00:00:02.000Z",
        ))
        .unwrap();
    store
        .log_action(&action(
            "a-3",
            "c-1",
            ActionKind::TaskCompleted,
            "2026-01-01T00:00:03.000Z",
        ))
        .unwrap();

    let ordered = store.get_actions(&ConversationId::new("c-1")).unwrap();
    let kinds: Vec<ActionKind> = ordered.iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ActionKind::TaskStarted,
            ActionKind::FileCreated,
            ActionKind::TaskCompleted,
        ]
    );

    let recent = store.get_recent_actions(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id.as_str(), "a-3");
    assert_eq!(recent[1].id.as_str(), "a-2");
}

#[test]
fn action_insert_is_idempotent() {
    let store = store();
    store
        .create_conversation(&conv("c-1", "2026-01-01T00:00:00.000Z"))
        .unwrap();

    let a = action("a-1", "c-1", ActionKind::Output, "2026-01-01T00:00:01.000Z");
    store.log_action(&a).unwrap();
    store.log_action(&a).unwrap();

    assert_eq!(store.get_actions(&a.conversation_id).unwrap().len(), 1);
}

#[test]
fn foreign_keys_are_enforced() {
    let store = store();
    let orphan = action(
        "a-1",
        "no-such-conversation",
        ActionKind::Output,
        "2026-01-01T00:00:01.000Z",
    );
    assert!(store.log_action(&orphan).is_err());
}

#[test]
fn streams_roundtrip_with_parsed_payload() {
    let store = store();
    store
        .create_conversation(&conv("c-1", "2026-01-01T00:00:00.000Z"))
        .unwrap();

    let chunk = StreamChunk {
        id: ChunkId::new("s-1"),
        conversation_id: ConversationId::new("c-1"),
        chunk: "raw bytes".to_string(),
        parsed: Some(serde_json::json!({"kind": "output-chunk"})),
        timestamp: "2026-01-01T00:00:01.000Z".to_string(),
    };
    store.log_stream(&chunk).unwrap();
    store.log_stream(&chunk).unwrap();

    let chunks = store.get_chunks(&chunk.conversation_id).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0], chunk);
}

#[test]
fn stats_histograms() {
    let store = store();
    let mut done = conv("c-1", "2026-01-01T00:00:00.000Z");
    done.status = TaskStatus::Completed;
    store.create_conversation(&done).unwrap();
    store
        .create_conversation(&conv("c-2", "2026-01-01T00:00:00.000Z"))
        .unwrap();

    store
        .log_action(&action(
            "a-1",
            "c-1",
            ActionKind::FileCreated,
            "2026-01-01T00:00:01.000Z",
        ))
        .unwrap();
    let mut intervention = action(
        "a-2",
        "c-1",
        ActionKind::Intervention,
        "2026-01-01T00:00:02.000Z",
    );
    let mut meta = std::collections::HashMap::new();
    meta.insert(
        "rule_id".to_string(),
        serde_json::json!("no-todo-markers"),
    );
    intervention.metadata = Some(meta);
    store.log_action(&intervention).unwrap();
    store
        .log_action(&action(
            "a-3",
            "c-2",
            ActionKind::Error,
            "2026-01-01T00:00:03.000Z",
        ))
        .unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.conversations_by_status["completed"], 1);
    assert_eq!(stats.conversations_by_status["running"], 1);
    assert_eq!(stats.actions_by_kind["file-created"], 1);
    assert_eq!(stats.actions_by_kind["intervention"], 1);
    assert_eq!(stats.violations_by_kind["no-todo-markers"], 1);
    assert_eq!(stats.violations_by_kind["error"], 1);
}

#[test]
fn migration_is_idempotent_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.db");

    {
        let store = ConversationStore::open(&path).unwrap();
        store
            .create_conversation(&conv("c-1", "2026-01-01T00:00:00.000Z"))
            .unwrap();
    }

    let store = ConversationStore::open(&path).unwrap();
    assert!(store
        .get_conversation(&ConversationId::new("c-1"))
        .unwrap()
        .is_some());
}
