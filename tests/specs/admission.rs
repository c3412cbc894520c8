// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission specifications: concrete tasks run, research prompts bounce.

use crate::prelude::*;
use ov_core::{AcceptanceCriteria, ActionKind, ConversationId, SubmitOptions, TaskStatus};
use ov_engine::EngineError;
use std::time::Duration;

/// S1: `"Create factorial.ts exporting factorial(n)"` is admitted, runs
/// queued → running → completed, and records a file-created action.
#[tokio::test(start_paused = true)]
async fn concrete_task_admission() {
    let fx = fixture(creates_file_script("factorial.ts"));
    let options = SubmitOptions {
        acceptance: AcceptanceCriteria {
            expected_files: vec!["factorial.ts".to_string()],
            must_execute: false,
        },
        ..SubmitOptions::default()
    };

    let task_id = fx
        .supervisor
        .submit("Create factorial.ts exporting factorial(n)", options)
        .unwrap();
    assert_eq!(
        fx.supervisor.task(&task_id).unwrap().status,
        TaskStatus::Queued
    );

    let result = fx
        .supervisor
        .wait(&task_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert!(result.error.is_none(), "error: {:?}", result.error);
    assert_eq!(
        fx.supervisor.task(&task_id).unwrap().status,
        TaskStatus::Completed
    );

    let actions = fx
        .supervisor
        .store()
        .get_actions(&ConversationId::new(task_id.as_str()))
        .unwrap();
    assert!(
        actions
            .iter()
            .any(|a| a.kind == ActionKind::FileCreated && a.content.contains("factorial.ts")),
        "actions: {actions:?}"
    );
}

/// S2: a pure-research prompt is rejected citing the concrete-task policy,
/// and no PTY is spawned.
#[tokio::test(start_paused = true)]
async fn research_prompt_is_blocked() {
    let fx = fixture(Vec::new());

    let err = fx
        .supervisor
        .submit(
            "Research authentication patterns for our app",
            SubmitOptions::default(),
        )
        .unwrap_err();

    match err {
        EngineError::Validation(reason) => {
            assert!(reason.contains("concrete-task"), "reason: {reason}");
        }
        other => panic!("expected a validation rejection, got: {other:?}"),
    }
    assert!(fx.adapter.calls().is_empty(), "no PTY may be spawned");
}

/// TODO-laden prompts defer the work they are supposed to produce.
#[tokio::test(start_paused = true)]
async fn todo_laden_prompt_is_blocked() {
    let fx = fixture(Vec::new());
    let err = fx
        .supervisor
        .submit(
            "Create parser.ts, TODO decide on the grammar",
            SubmitOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
