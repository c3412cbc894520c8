// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashSet;

crate::define_id! {
    /// Test-only ID type.
    pub struct ProbeId;
}

#[test]
fn short_truncates_long_strings() {
    let id = ProbeId::new("abcdefghijklmnop");
    assert_eq!(id.short(8), "abcdefgh");
}

#[test]
fn short_keeps_short_strings_whole() {
    let id = ProbeId::new("abc");
    assert_eq!(id.short(8), "abc");
}

#[test]
fn short_id_trait_on_str() {
    assert_eq!("hello world".short(5), "hello");
    assert_eq!("hi".short(5), "hi");
}

#[test]
fn display_and_equality() {
    let id = ProbeId::new("task-1");
    assert_eq!(id.to_string(), "task-1");
    assert_eq!(id, "task-1");
    assert_eq!(id, *"task-1");
    assert_eq!(id.as_str(), "task-1");
}

#[test]
fn uuid_gen_produces_unique_ids() {
    let idgen = UuidIdGen;
    let ids: HashSet<String> = (0..100).map(|_| idgen.next()).collect();
    assert_eq!(ids.len(), 100);
}

#[test]
fn sequential_gen_counts_up() {
    let idgen = SequentialIdGen::new("t");
    assert_eq!(idgen.next(), "t-1");
    assert_eq!(idgen.next(), "t-2");

    // Clones share the counter
    let clone = idgen.clone();
    assert_eq!(clone.next(), "t-3");
    assert_eq!(idgen.next(), "t-4");
}

#[test]
fn id_serde_roundtrip() {
    let id = ProbeId::new("abc-123");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"abc-123\"");
    let back: ProbeId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
