// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn envelope_serializes_with_camel_case_fields() {
    let envelope = Envelope::new(
        EnvelopeKind::Stream,
        json!({ "chunk": "output" }),
        "2026-01-01T00:00:00.000Z".to_string(),
    )
    .for_task("t-1");

    let value: serde_json::Value = serde_json::from_str(&envelope.to_json()).unwrap();
    assert_eq!(value["type"], "stream");
    assert_eq!(value["taskId"], "t-1");
    assert_eq!(value["data"]["chunk"], "output");
    assert_eq!(value["timestamp"], "2026-01-01T00:00:00.000Z");
    assert!(value.get("workerId").is_none());
}

#[yare::parameterized(
    stream       = { EnvelopeKind::Stream, "stream" },
    task_update  = { EnvelopeKind::TaskUpdate, "task_update" },
    verification = { EnvelopeKind::Verification, "verification" },
    intervention = { EnvelopeKind::Intervention, "intervention" },
    error        = { EnvelopeKind::Error, "error" },
    system       = { EnvelopeKind::System, "system" },
)]
fn envelope_kind_tags(kind: EnvelopeKind, tag: &str) {
    assert_eq!(
        serde_json::to_value(kind).unwrap(),
        serde_json::Value::String(tag.to_string())
    );
}

#[test]
fn envelope_roundtrip() {
    let envelope = Envelope::new(
        EnvelopeKind::Error,
        json!({ "error": "boom" }),
        "2026-01-01T00:00:00.000Z".to_string(),
    );
    let back: Envelope = serde_json::from_str(&envelope.to_json()).unwrap();
    assert_eq!(back, envelope);
}

#[test]
fn intervene_message_parses_from_the_wire_shape() {
    let message: ClientMessage = serde_json::from_str(
        r#"{"type":"intervene","taskId":"t-42","prompt":"Stop and write tests"}"#,
    )
    .unwrap();
    assert_eq!(
        message,
        ClientMessage::Intervene {
            task_id: "t-42".to_string(),
            prompt: "Stop and write tests".to_string(),
        }
    );
}

#[yare::parameterized(
    subscribe = { r#"{"type":"subscribe"}"#, ClientMessage::Subscribe },
    ping      = { r#"{"type":"ping"}"#, ClientMessage::Ping },
)]
fn reserved_messages_parse(raw: &str, expected: ClientMessage) {
    let message: ClientMessage = serde_json::from_str(raw).unwrap();
    assert_eq!(message, expected);
}

#[test]
fn unknown_message_type_is_an_error() {
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"reboot"}"#).is_err());
}
