// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Closed-loop supervision specifications: interventions, stalls, fan-out.

use crate::prelude::*;
use ov_core::{ActionKind, ConversationId, SubmitOptions, TaskId, TaskStatus};
use ov_engine::PoolEvent;
use ov_adapters::ProcessCall;
use std::collections::HashSet;
use std::time::Duration;

/// S3: a TODO line draws an interrupt with the remediation template, and the
/// task still completes once the subject produces the file.
#[tokio::test(start_paused = true)]
async fn todo_line_is_interrupted_then_task_recovers() {
    let fx = fixture(Vec::new());
    let task_id = fx
        .supervisor
        .submit(
            "Create factorial.ts exporting factorial(n)",
            SubmitOptions::default(),
        )
        .unwrap();

    wait_until(|| spawned(&fx.adapter, &task_id)).await;
    fx.adapter
        .emit_chunk(&task_id, "// TODO: implement later\n")
        .await;

    wait_until(|| !fx.adapter.sent_inputs(&task_id).is_empty()).await;
    let inputs = fx.adapter.sent_inputs(&task_id);
    assert!(
        inputs.iter().any(|i| i.contains("Implement the code now")),
        "remediation missing from {inputs:?}"
    );

    fx.adapter
        .emit_chunk(&task_id, "Created factorial.ts\n")
        .await;
    fx.adapter.emit_exit(&task_id, 0).await;

    let result = fx
        .supervisor
        .wait(&task_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert!(result.error.is_none());

    let actions = fx
        .supervisor
        .store()
        .get_actions(&ConversationId::new(task_id.as_str()))
        .unwrap();
    assert!(actions.iter().any(|a| a.kind == ActionKind::Intervention));
    assert!(actions.iter().any(|a| a.kind == ActionKind::FileCreated));
}

/// S4: thirty-one silent seconds fail the task with a stall and kill the
/// subject process.
#[tokio::test(start_paused = true)]
async fn silent_subject_is_stalled_out() {
    let fx = fixture(Vec::new());
    let task_id = fx
        .supervisor
        .submit(
            "Create factorial.ts exporting factorial(n)",
            SubmitOptions::default(),
        )
        .unwrap();

    wait_until(|| spawned(&fx.adapter, &task_id)).await;
    fx.adapter.emit_chunk(&task_id, "one line then silence\n").await;

    fx.clock.advance(Duration::from_secs(31));

    let result = fx
        .supervisor
        .wait(&task_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert!(result.error.as_deref().unwrap().starts_with("stall:"));
    assert_eq!(
        fx.supervisor.task(&task_id).unwrap().status,
        TaskStatus::Failed
    );
    assert!(fx
        .adapter
        .calls()
        .iter()
        .any(|c| matches!(c, ProcessCall::Kill { task_id: id } if *id == task_id)));
}

/// S5: three equal-priority tasks interleave in the aggregator under their
/// short-id prefixes, fire child-complete events, and land in the store.
#[tokio::test(start_paused = true)]
async fn three_parallel_tasks_aggregate() {
    let fx = fixture(creates_file_script("shared.ts"));
    let mut events = fx.supervisor.events();

    let prompts = [
        "Create red.ts for the red widget",
        "Create green.ts for the green widget",
        "Create blue.ts for the blue widget",
    ];
    let ids: Vec<TaskId> = prompts
        .iter()
        .map(|p| fx.supervisor.submit(p, SubmitOptions::default()).unwrap())
        .collect();

    for task_id in &ids {
        let result = fx
            .supervisor
            .wait(task_id, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(result.error.is_none());
    }

    let lines = fx.lines.lock().clone();
    for task_id in &ids {
        let prefix = format!("[{}]", task_id.short(8));
        assert!(
            lines.iter().any(|l| l.contains(&prefix)),
            "missing {prefix} in {lines:?}"
        );
    }

    let mut child_completes = HashSet::new();
    while child_completes.len() < 3 {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(PoolEvent::ChildComplete(info))) => {
                child_completes.insert(info.task_id.clone());
            }
            Ok(Ok(_)) => {}
            other => panic!("event stream ended early: {other:?}"),
        }
    }

    for task_id in &ids {
        assert!(fx
            .supervisor
            .store()
            .get_conversation(&ConversationId::new(task_id.as_str()))
            .unwrap()
            .is_some());
    }
}

/// S6: an observer intervention lands in the conversation and on the PTY.
#[tokio::test(start_paused = true)]
async fn observer_intervention_round_trip() {
    let fx = fixture(Vec::new());
    let task_id = fx
        .supervisor
        .submit(
            "Create factorial.ts exporting factorial(n)",
            SubmitOptions::default(),
        )
        .unwrap();

    wait_until(|| spawned(&fx.adapter, &task_id)).await;

    fx.supervisor
        .intervene(&task_id, "Stop and write tests")
        .await
        .unwrap();

    assert!(fx
        .adapter
        .sent_inputs(&task_id)
        .iter()
        .any(|i| i == "Stop and write tests"));

    let store = std::sync::Arc::clone(fx.supervisor.store());
    let conversation = ConversationId::new(task_id.as_str());
    wait_until(move || {
        store
            .get_actions(&conversation)
            .map(|actions| {
                actions
                    .iter()
                    .any(|a| a.kind == ActionKind::Intervention
                        && a.content == "Stop and write tests")
            })
            .unwrap_or(false)
    })
    .await;

    fx.adapter.emit_exit(&task_id, 0).await;
    fx.supervisor
        .wait(&task_id, Duration::from_secs(10))
        .await
        .unwrap();
}
