// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex as PlMutex;
use serde_json::json;
use std::sync::Arc;

fn input(point: HookPoint, payload: serde_json::Value) -> HookInput {
    HookInput {
        point,
        task_id: None,
        payload,
    }
}

#[test]
fn hooks_run_in_priority_order_with_registration_tiebreak() {
    let orchestrator = HookOrchestrator::new();
    let order: Arc<PlMutex<Vec<&'static str>>> = Arc::new(PlMutex::new(Vec::new()));

    for (name, priority) in [("low", 1), ("high-a", 10), ("high-b", 10)] {
        let order = Arc::clone(&order);
        let tag: &'static str = name;
        orchestrator.register(name, HookPoint::StreamEvent, priority, move |_| {
            order.lock().push(tag);
            HookVerdict::Continue
        });
    }

    orchestrator
        .run(input(HookPoint::StreamEvent, json!({})))
        .unwrap();
    assert_eq!(*order.lock(), vec!["high-a", "high-b", "low"]);
}

#[test]
fn block_short_circuits_later_hooks() {
    let orchestrator = HookOrchestrator::new();
    let reached: Arc<PlMutex<bool>> = Arc::new(PlMutex::new(false));

    orchestrator.register("gate", HookPoint::PreSpawn, 10, |_| HookVerdict::Block {
        reason: "not today".to_string(),
    });
    {
        let reached = Arc::clone(&reached);
        orchestrator.register("after", HookPoint::PreSpawn, 1, move |_| {
            *reached.lock() = true;
            HookVerdict::Continue
        });
    }

    let err = orchestrator
        .run(input(HookPoint::PreSpawn, json!({})))
        .unwrap_err();
    assert_eq!(err, "not today");
    assert!(!*reached.lock());
}

#[test]
fn replace_feeds_modified_payload_forward() {
    let orchestrator = HookOrchestrator::new();

    orchestrator.register("rewrite", HookPoint::PreSpawn, 10, |_| HookVerdict::Replace {
        payload: json!({ "prompt": "rewritten" }),
    });
    orchestrator.register("inspect", HookPoint::PreSpawn, 1, |input| {
        assert_eq!(input.payload["prompt"], "rewritten");
        HookVerdict::Continue
    });

    let payload = orchestrator
        .run(input(HookPoint::PreSpawn, json!({ "prompt": "original" })))
        .unwrap();
    assert_eq!(payload["prompt"], "rewritten");
}

#[test]
fn hooks_only_fire_for_their_point() {
    let orchestrator = HookOrchestrator::new();
    let fired: Arc<PlMutex<u32>> = Arc::new(PlMutex::new(0));
    {
        let fired = Arc::clone(&fired);
        orchestrator.register("counter", HookPoint::Violation, 0, move |_| {
            *fired.lock() += 1;
            HookVerdict::Continue
        });
    }

    orchestrator.notify(HookPoint::StreamEvent, None, json!({}));
    assert_eq!(*fired.lock(), 0);
    orchestrator.notify(HookPoint::Violation, None, json!({}));
    assert_eq!(*fired.lock(), 1);
}

mod admission {
    use super::*;

    fn validate(prompt: &str) -> Result<serde_json::Value, String> {
        let orchestrator = HookOrchestrator::with_admission_validator().unwrap();
        orchestrator.run(input(HookPoint::PreSpawn, json!({ "prompt": prompt })))
    }

    #[test]
    fn concrete_file_task_passes() {
        validate("Create factorial.ts exporting factorial(n)").unwrap();
    }

    #[test]
    fn concrete_noun_task_passes() {
        validate("Fix the login component state handling").unwrap();
        validate("Implement the search endpoint").unwrap();
    }

    #[test]
    fn research_prompt_is_blocked() {
        let reason = validate("Research authentication patterns for our app").unwrap_err();
        assert!(reason.contains("concrete-task"), "reason: {reason}");
    }

    #[test]
    fn vague_prompt_is_blocked() {
        let reason = validate("Create something nice").unwrap_err();
        assert!(reason.contains("concrete"), "reason: {reason}");
    }

    #[test]
    fn todo_laden_prompt_is_blocked() {
        let reason = validate("Create parser.ts, TODO figure out the grammar").unwrap_err();
        assert!(reason.contains("TODO"), "reason: {reason}");
    }

    #[test]
    fn missing_action_verb_is_blocked() {
        let reason = validate("The api module and its tests").unwrap_err();
        assert!(reason.contains("action verb"), "reason: {reason}");
    }
}
