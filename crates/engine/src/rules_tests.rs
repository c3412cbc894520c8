// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ov_core::FakeClock;
use parking_lot::Mutex as PlMutex;

fn engine() -> RuleEngine<FakeClock> {
    RuleEngine::with_builtins(FakeClock::new()).unwrap()
}

fn task() -> TaskId {
    TaskId::new("t-1")
}

#[test]
fn todo_marker_violates_with_rendered_remediation() {
    let engine = engine();
    let violations = engine.check_line(&task(), "// TODO: implement later");

    assert_eq!(violations.len(), 1);
    let v = &violations[0];
    assert_eq!(v.rule_id, "no-todo-markers");
    assert_eq!(v.severity, Severity::Error);
    assert_eq!(v.matched, "TODO");
    assert_eq!(v.line, "// TODO: implement later");
    let remediation = v.remediation.as_deref().unwrap();
    assert!(remediation.contains("TODO"));
    assert!(!remediation.contains("{match}"));
}

#[test]
fn dynamic_eval_is_critical() {
    let engine = engine();
    let violations = engine.check_line(&task(), "const out = eval(userInput)");
    assert_eq!(violations[0].rule_id, "no-dynamic-eval");
    assert_eq!(violations[0].severity, Severity::Critical);
}

#[test]
fn hardcoded_secret_detected() {
    let engine = engine();
    let violations = engine.check_line(&task(), r#"const apiKey = "sk-abcdef123456""#);
    assert!(violations.iter().any(|v| v.rule_id == "no-hardcoded-secrets"));
}

#[yare::parameterized(
    unscoped      = { "counter = counter + 1", true },
    let_scoped    = { "let counter = 1", false },
    const_scoped  = { "const counter = 1", false },
    comparison    = { "if (a == b) {", false },
)]
fn unscoped_variable_guard(line: &str, violates: bool) {
    let engine = engine();
    let hits = engine
        .check_line(&task(), line)
        .iter()
        .any(|v| v.rule_id == "no-unscoped-vars");
    assert_eq!(hits, violates, "line: {line}");
}

#[test]
fn check_block_scans_every_line() {
    let engine = engine();
    let code = "function good() {\n  console.log('debug')\n  // FIXME handle errors\n}\n";
    let violations = engine.check_block(&task(), code);

    let ids: Vec<&str> = violations.iter().map(|v| v.rule_id.as_str()).collect();
    assert!(ids.contains(&"no-debug-prints"));
    assert!(ids.contains(&"no-todo-markers"));
}

#[test]
fn intervention_picks_max_severity_then_registration_order() {
    let engine = engine();
    // One line violating no-dynamic-eval (critical, registered earlier) and
    // no-hardcoded-secrets (critical, registered later)
    let line = r#"eval(x); apiKey = "abcdefghijkl""#;
    let violations = engine.check_line(&task(), line);
    assert!(violations.len() >= 2);

    let remediation = engine.generate_intervention(&violations).unwrap();
    assert!(
        remediation.contains("dynamic evaluation"),
        "remediation: {remediation}"
    );
}

#[test]
fn intervention_is_none_without_actionable_remediation() {
    let engine = RuleEngine::empty(FakeClock::new());
    assert_eq!(engine.generate_intervention(&[]), None);
}

#[test]
fn per_task_and_global_history() {
    let engine = engine();
    let t1 = TaskId::new("t-1");
    let t2 = TaskId::new("t-2");

    engine.check_line(&t1, "// TODO: one");
    engine.check_line(&t2, "// TODO: two");

    assert_eq!(engine.violations(Some(&t1)).len(), 1);
    assert_eq!(engine.violations(Some(&t2)).len(), 1);
    assert_eq!(engine.violations(None).len(), 2);

    engine.clear();
    assert!(engine.violations(None).is_empty());
    assert!(engine.violations(Some(&t1)).is_empty());
}

#[test]
fn on_violation_handlers_fire_synchronously() {
    let engine = engine();
    let seen = std::sync::Arc::new(PlMutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);
    engine.on_violation(move |v| sink.lock().push(v.rule_id.clone()));

    engine.check_line(&task(), "eval(x)");
    assert_eq!(*seen.lock(), vec!["no-dynamic-eval"]);
}

#[test]
fn add_and_remove_rules() {
    let engine = engine();
    let before = engine.export_rules().len();

    engine
        .add_rule(RuleDef {
            id: "no-sleep".to_string(),
            name: "No sleeps".to_string(),
            description: "Sleeping hides races".to_string(),
            pattern: r"\bsleep\s*\(".to_string(),
            unless: None,
            severity: Severity::Warning,
            action: RuleAction::Warn,
            auto_fix: false,
            remediation: None,
        })
        .unwrap();
    assert_eq!(engine.export_rules().len(), before + 1);
    assert!(!engine.check_line(&task(), "sleep(100)").is_empty());

    assert!(engine.remove_rule("no-sleep"));
    assert!(!engine.remove_rule("no-sleep"));
    assert!(engine.check_line(&task(), "sleep(100)").is_empty());
}

#[test]
fn invalid_pattern_is_rejected() {
    let engine = engine();
    let result = engine.add_rule(RuleDef {
        id: "broken".to_string(),
        name: "broken".to_string(),
        description: String::new(),
        pattern: "(unclosed".to_string(),
        unless: None,
        severity: Severity::Info,
        action: RuleAction::Log,
        auto_fix: false,
        remediation: None,
    });
    assert!(result.is_err());
}

#[test]
fn export_import_roundtrip() {
    let engine = engine();
    let exported = engine.export_rules();

    let fresh = RuleEngine::empty(FakeClock::new());
    fresh.import_rules(exported.clone()).unwrap();
    assert_eq!(fresh.export_rules(), exported);
}

#[test]
fn rule_action_lookup() {
    let engine = engine();
    assert_eq!(
        engine.rule_action("no-todo-markers"),
        Some(RuleAction::Interrupt)
    );
    assert_eq!(engine.rule_action("missing"), None);
}
