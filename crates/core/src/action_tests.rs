// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    file_created  = { ActionKind::FileCreated, "file-created" },
    file_modified = { ActionKind::FileModified, "file-modified" },
    command       = { ActionKind::CommandExecuted, "command-executed" },
    error         = { ActionKind::Error, "error" },
    output        = { ActionKind::Output, "output" },
    started       = { ActionKind::TaskStarted, "task-started" },
    completed     = { ActionKind::TaskCompleted, "task-completed" },
    code_block    = { ActionKind::CodeBlock, "code-block" },
    chunk         = { ActionKind::OutputChunk, "output-chunk" },
    intervention  = { ActionKind::Intervention, "intervention" },
)]
fn kind_string_roundtrip(kind: ActionKind, s: &str) {
    assert_eq!(kind.as_str(), s);
    assert_eq!(ActionKind::parse(s), Some(kind));
}

#[test]
fn unknown_kind_does_not_parse() {
    assert_eq!(ActionKind::parse("file-deleted"), None);
}

#[test]
fn file_touch_kinds() {
    assert!(ActionKind::FileCreated.is_file_touch());
    assert!(ActionKind::FileModified.is_file_touch());
    assert!(!ActionKind::CodeBlock.is_file_touch());
    assert!(!ActionKind::Intervention.is_file_touch());
}

#[test]
fn kind_serde_matches_as_str() {
    for kind in [
        ActionKind::FileCreated,
        ActionKind::CommandExecuted,
        ActionKind::OutputChunk,
        ActionKind::Intervention,
    ] {
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, format!("\"{}\"", kind.as_str()));
    }
}

#[test]
fn action_omits_empty_metadata() {
    let action = Action::new(
        ActionId::new("a-1"),
        ConversationId::new("c-1"),
        ActionKind::FileCreated,
        "factorial.ts",
        "1970-01-01T00:00:00.000Z".to_string(),
    );
    let json = serde_json::to_value(&action).unwrap();
    assert!(json.get("metadata").is_none());
    assert_eq!(json["kind"], "file-created");
}
