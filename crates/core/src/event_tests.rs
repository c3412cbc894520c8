// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::task::TaskId;

#[test]
fn events_serialize_with_type_tag() {
    let event = Event::TaskQueued {
        id: TaskId::new("t-1"),
        parent: None,
        prompt: "Create factorial.ts".to_string(),
        priority: 5,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "task:queued");
    assert_eq!(json["id"], "t-1");
    assert_eq!(json["priority"], 5);
    assert!(json.get("parent").is_none());
}

#[test]
fn events_deserialize_from_tag() {
    let json = r#"{"type":"task:failed","id":"t-9","kind":"stall","error":"no activity for 31s"}"#;
    let event: Event = serde_json::from_str(json).unwrap();
    assert_eq!(
        event,
        Event::TaskFailed {
            id: TaskId::new("t-9"),
            kind: crate::task::ErrorKind::Stall,
            error: "no activity for 31s".to_string(),
        }
    );
}

#[test]
fn unknown_tags_deserialize_to_custom() {
    let json = r#"{"type":"future:event","data":123}"#;
    let event: Event = serde_json::from_str(json).unwrap();
    assert_eq!(event, Event::Custom);
}

#[test]
fn name_matches_serialized_tag() {
    let events = [
        Event::TaskResumed { id: TaskId::new("t") },
        Event::StreamChunk {
            task_id: TaskId::new("t"),
            bytes: "x".to_string(),
        },
        Event::FileCreated {
            task_id: TaskId::new("t"),
            path: "a.ts".to_string(),
        },
        Event::PersistenceLag { dropped: 3 },
        Event::Shutdown,
    ];
    for event in events {
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
    }
}

#[test]
fn task_id_extraction() {
    let id = TaskId::new("t-1");
    assert_eq!(
        Event::TaskCompleted {
            id: id.clone(),
            duration_ms: 10,
        }
        .task_id(),
        Some(&id)
    );
    assert_eq!(
        Event::ViolationDetected {
            task_id: id.clone(),
            rule_id: "no-todo-markers".to_string(),
            severity: crate::violation::Severity::Error,
            excerpt: "TODO".to_string(),
        }
        .task_id(),
        Some(&id)
    );
    assert_eq!(Event::Shutdown.task_id(), None);
    assert_eq!(
        Event::MetaError {
            message: "disk full".to_string()
        }
        .task_id(),
        None
    );
}

#[test]
fn log_summary_is_single_line() {
    let events = [
        Event::TaskQueued {
            id: TaskId::new("t-1"),
            parent: Some(TaskId::new("t-0")),
            prompt: "multi\nline\nprompt".to_string(),
            priority: -2,
        },
        Event::CodeBlock {
            task_id: TaskId::new("t-1"),
            language: Some("ts".to_string()),
            body: "export {}\n".to_string(),
        },
        Event::InterventionSent {
            task_id: TaskId::new("t-1"),
            message: "Stop planning. Write the file.".to_string(),
        },
    ];
    for event in events {
        let summary = event.log_summary();
        assert!(!summary.contains('\n'), "summary: {summary}");
        assert!(summary.starts_with(event.name()));
    }
}

#[test]
fn stream_chunk_summary_reports_length_not_content() {
    let event = Event::StreamChunk {
        task_id: TaskId::new("t-1"),
        bytes: "secret output".to_string(),
    };
    let summary = event.log_summary();
    assert!(summary.contains("len=13"));
    assert!(!summary.contains("secret"));
}
