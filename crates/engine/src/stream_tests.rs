// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ov_core::FakeClock;

fn parser() -> StreamParser<FakeClock> {
    StreamParser::new(FakeClock::new()).unwrap()
}

fn kinds(events: &[StreamEvent]) -> Vec<StreamEventKind> {
    events.iter().map(|e| e.kind).collect()
}

#[test]
fn code_block_tracked_across_chunks() {
    let mut parser = parser();

    // Fence opens in one chunk, body arrives split, fence closes later
    assert!(parser.feed("```ts\n").is_empty());
    assert!(parser.in_code_block());
    assert!(parser.feed("export function factorial").is_empty());
    assert!(parser.feed("(n: number) {}\n").is_empty());

    let events = parser.feed("```\n");
    assert_eq!(kinds(&events), vec![StreamEventKind::CodeBlock]);
    assert_eq!(events[0].content, "export function factorial(n: number) {}\n");
    assert_eq!(events[0].metadata.get("language").map(String::as_str), Some("ts"));
    assert!(!parser.in_code_block());
}

#[test]
fn fence_without_language_has_no_language_metadata() {
    let mut parser = parser();
    parser.feed("```\ncode\n");
    let events = parser.feed("```\n");
    assert_eq!(events[0].kind, StreamEventKind::CodeBlock);
    assert!(events[0].metadata.get("language").is_none());
}

#[test]
fn heartbeat_sentinel_never_reaches_code_blocks() {
    let mut parser = parser();
    parser.feed("```js\n");
    parser.feed("let x\u{0} = 1\n\u{0}");
    let events = parser.feed("```\n");
    assert_eq!(events[0].content, "let x = 1\n");
    assert!(!events[0].content.contains('\u{0}'));
}

#[test]
fn file_signatures_capture_paths() {
    let mut parser = parser();

    let events = parser.feed("Created factorial.ts with the exported function\n");
    assert_eq!(events[0].kind, StreamEventKind::FileCreated);
    assert_eq!(events[0].metadata.get("path").map(String::as_str), Some("factorial.ts"));

    let events = parser.feed("Updated src/index.ts to re-export it\n");
    assert_eq!(events[0].kind, StreamEventKind::FileModified);
    assert_eq!(
        events[0].metadata.get("path").map(String::as_str),
        Some("src/index.ts")
    );
}

#[test]
fn command_and_error_signatures() {
    let mut parser = parser();

    let events = parser.feed("$ npm test\n");
    assert_eq!(events[0].kind, StreamEventKind::CommandExecuted);
    assert_eq!(
        events[0].metadata.get("command").map(String::as_str),
        Some("npm test")
    );

    let events = parser.feed("Error: module not found\n");
    assert_eq!(events[0].kind, StreamEventKind::ErrorOccurred);
}

#[test]
fn task_markers_are_recognized() {
    let mut parser = parser();
    let events = parser.feed("TASK_STARTED build\nTASK_COMPLETED build\n");
    assert_eq!(
        kinds(&events),
        vec![StreamEventKind::TaskStarted, StreamEventKind::TaskCompleted]
    );
}

#[test]
fn unrecognized_lines_become_output_chunks() {
    let mut parser = parser();
    let events = parser.feed("thinking about the problem\n\n");
    // The blank line is dropped, the text line is a chunk
    assert_eq!(kinds(&events), vec![StreamEventKind::OutputChunk]);
    assert_eq!(events[0].content, "thinking about the problem");
}

#[test]
fn partial_lines_wait_for_their_newline() {
    let mut parser = parser();
    assert!(parser.feed("no newline yet").is_empty());
    let events = parser.feed(" and now\n");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].content, "no newline yet and now");
}

#[test]
fn crlf_lines_are_trimmed() {
    let mut parser = parser();
    let events = parser.feed("plain line\r\n");
    assert_eq!(events[0].content, "plain line");
}

#[yare::parameterized(
    created  = { "Wrote tests/helpers.py for the fixtures", StreamEventKind::FileCreated },
    saved    = { "Saved output to build/app.js", StreamEventKind::FileCreated },
    modified = { "Editing main.rs to add the flag", StreamEventKind::FileModified },
    running  = { "Running: cargo check", StreamEventKind::CommandExecuted },
)]
fn signature_variants(line: &str, expected: StreamEventKind) {
    let mut parser = parser();
    let events = parser.feed(&format!("{line}\n"));
    assert_eq!(events[0].kind, expected, "line: {line}");
}
