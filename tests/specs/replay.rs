// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replay-equivalence: the ledger alone reproduces the store's projection.

use crate::prelude::*;
use ov_core::{ActionKind, ConversationId, Event, SubmitOptions, TaskStatus};
use std::time::Duration;

/// Rebuilding conversation state from the ledger's events yields the same
/// projection the store applied online: same terminal status, same file
/// actions, same chunk payloads in order.
#[tokio::test(start_paused = true)]
async fn ledger_replay_matches_store_projection() {
    let fx = fixture(vec![
        ov_adapters::FakeStep::Chunk("working\n".to_string()),
        ov_adapters::FakeStep::Chunk("Created replayed.ts\n".to_string()),
        ov_adapters::FakeStep::Exit(0),
    ]);

    let task_id = fx
        .supervisor
        .submit("Create replayed.ts for the replay check", SubmitOptions::default())
        .unwrap();
    fx.supervisor
        .wait(&task_id, Duration::from_secs(10))
        .await
        .unwrap();

    let entries = fx.supervisor.ledger().read_all().unwrap();
    let for_task: Vec<_> = entries
        .iter()
        .filter(|e| e.task_id.as_ref() == Some(&task_id))
        .collect();
    assert!(!for_task.is_empty());

    // Sequence numbers are strictly increasing across the whole ledger
    for pair in entries.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
    }

    // Replay: fold the events into a terminal status and file list
    let mut replayed_status = None;
    let mut replayed_files = Vec::new();
    let mut replayed_chunks = Vec::new();
    for entry in &for_task {
        match &entry.event {
            Event::TaskQueued { .. } => replayed_status = Some(TaskStatus::Queued),
            Event::TaskStarted { .. } => replayed_status = Some(TaskStatus::Running),
            Event::TaskCompleted { .. } => replayed_status = Some(TaskStatus::Completed),
            Event::TaskFailed { .. } => replayed_status = Some(TaskStatus::Failed),
            Event::TaskAborted { .. } => replayed_status = Some(TaskStatus::Aborted),
            Event::FileCreated { path, .. } => replayed_files.push(path.clone()),
            Event::StreamChunk { bytes, .. } => replayed_chunks.push(bytes.clone()),
            _ => {}
        }
    }

    let conversation_id = ConversationId::new(task_id.as_str());
    let conversation = fx
        .supervisor
        .store()
        .get_conversation(&conversation_id)
        .unwrap()
        .unwrap();
    similar_asserts::assert_eq!(Some(conversation.status), replayed_status);

    let stored_files: Vec<String> = fx
        .supervisor
        .store()
        .get_actions(&conversation_id)
        .unwrap()
        .iter()
        .filter(|a| a.kind == ActionKind::FileCreated)
        .map(|a| a.content.clone())
        .collect();
    similar_asserts::assert_eq!(stored_files, replayed_files);

    // Byte-faithfulness: chunk concatenation equals the subject's output
    let stored_chunks: Vec<String> = fx
        .supervisor
        .store()
        .get_chunks(&conversation_id)
        .unwrap()
        .iter()
        .map(|c| c.chunk.clone())
        .collect();
    similar_asserts::assert_eq!(stored_chunks, replayed_chunks);
    let combined: String = replayed_chunks.concat();
    assert_eq!(combined, "working\nCreated replayed.ts\n");
}

/// The verification engine agrees between live results and offline replay.
#[tokio::test(start_paused = true)]
async fn offline_verification_matches_live_report() {
    let fx = fixture(creates_file_script("checked.ts"));
    let task_id = fx
        .supervisor
        .submit("Create checked.ts with the checker", SubmitOptions::default())
        .unwrap();
    let result = fx
        .supervisor
        .wait(&task_id, Duration::from_secs(10))
        .await
        .unwrap();

    let offline = fx
        .supervisor
        .verify(&ConversationId::new(task_id.as_str()))
        .unwrap();
    similar_asserts::assert_eq!(result.verification.unwrap(), offline);
}
