// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule engine: anti-behavior pattern detection on lines and code blocks.
//!
//! The rule set is shared read-mostly state. Mutations build a new snapshot
//! behind an `Arc` swap, so in-flight checks keep seeing a consistent set.

use crate::error::EngineError;
use ov_core::{Clock, RuleAction, RuleDef, Severity, TaskId, Violation};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Bounded global violation history.
const GLOBAL_HISTORY: usize = 1024;

/// A compiled rule.
struct Rule {
    def: RuleDef,
    pattern: Regex,
    unless: Option<Regex>,
}

impl Rule {
    fn compile(def: RuleDef) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&def.pattern)?;
        let unless = match &def.unless {
            Some(source) => Some(Regex::new(source)?),
            None => None,
        };
        Ok(Self {
            def,
            pattern,
            unless,
        })
    }

    fn matches<'t>(&self, line: &'t str) -> Option<regex::Match<'t>> {
        let matched = self.pattern.find(line)?;
        if let Some(unless) = &self.unless {
            if unless.is_match(line) {
                return None;
            }
        }
        Some(matched)
    }
}

type ViolationHandler = Box<dyn Fn(&Violation) + Send + Sync>;

/// Detects anti-behavior patterns in subject output.
pub struct RuleEngine<C: Clock> {
    clock: C,
    /// Copy-on-write snapshot, in registration order
    rules: Mutex<Arc<Vec<Rule>>>,
    per_task: Mutex<HashMap<TaskId, Vec<Violation>>>,
    global: Mutex<VecDeque<Violation>>,
    handlers: Mutex<Vec<ViolationHandler>>,
}

/// The built-in anti-behavior ruleset.
pub fn builtin_rules() -> Vec<RuleDef> {
    vec![
        RuleDef {
            id: "no-custom-math".to_string(),
            name: "No custom math functions".to_string(),
            description: "Re-implementing standard math invites subtle bugs".to_string(),
            pattern: r"(?i)function\s+(factorial|fibonacci|gcd|lcm|isPrime|sqrt|pow|abs)\s*\("
                .to_string(),
            unless: None,
            severity: Severity::Warning,
            action: RuleAction::Redirect,
            auto_fix: true,
            remediation: Some(
                "Use the standard library or an established package instead of defining {match}"
                    .to_string(),
            ),
        },
        RuleDef {
            id: "no-unscoped-vars".to_string(),
            name: "No unscoped variables".to_string(),
            description: "Assignments without let/const/var leak globals".to_string(),
            pattern: r"^\s*[a-zA-Z_$][\w$]*\s*=[^=]".to_string(),
            unless: Some(r"\b(let|const|var|this\.|window\.|export)\b".to_string()),
            severity: Severity::Warning,
            action: RuleAction::Warn,
            auto_fix: true,
            remediation: Some("Declare the variable with const or let: {match}".to_string()),
        },
        RuleDef {
            id: "no-dynamic-eval".to_string(),
            name: "No dynamic code evaluation".to_string(),
            description: "eval and Function constructors execute arbitrary code".to_string(),
            pattern: r"\beval\s*\(|new\s+Function\s*\(".to_string(),
            unless: None,
            severity: Severity::Critical,
            action: RuleAction::Interrupt,
            auto_fix: false,
            remediation: Some(
                "Remove the dynamic evaluation ({match}) and express the logic directly"
                    .to_string(),
            ),
        },
        RuleDef {
            id: "no-debug-prints".to_string(),
            name: "No unguarded debug prints".to_string(),
            description: "console.log left in production code".to_string(),
            pattern: r"console\.(log|debug|trace)\s*\(".to_string(),
            unless: None,
            severity: Severity::Warning,
            action: RuleAction::Warn,
            auto_fix: true,
            remediation: Some("Use the project logger instead of {match}".to_string()),
        },
        RuleDef {
            id: "no-hardcoded-secrets".to_string(),
            name: "No hardcoded credentials".to_string(),
            description: "Secrets belong in the environment, not the source".to_string(),
            pattern: r#"(?i)(api[_-]?key|secret|password|token)\s*[:=]\s*["'][^"']{8,}["']"#
                .to_string(),
            unless: None,
            severity: Severity::Critical,
            action: RuleAction::Interrupt,
            auto_fix: false,
            remediation: Some(
                "Remove the hardcoded credential ({match}) and read it from the environment"
                    .to_string(),
            ),
        },
        RuleDef {
            id: "no-todo-markers".to_string(),
            name: "No TODO markers".to_string(),
            description: "TODO/FIXME defers the implementation this task exists to produce"
                .to_string(),
            pattern: r"\b(TODO|FIXME)\b".to_string(),
            unless: None,
            severity: Severity::Error,
            action: RuleAction::Interrupt,
            auto_fix: false,
            remediation: Some(
                "Stop. Implement the code now instead of writing {match}. Write the actual \
                 working implementation to a file."
                    .to_string(),
            ),
        },
    ]
}

impl<C: Clock> RuleEngine<C> {
    /// Engine preloaded with the built-in ruleset.
    pub fn with_builtins(clock: C) -> Result<Self, EngineError> {
        let engine = Self::empty(clock);
        engine.import_rules(builtin_rules())?;
        Ok(engine)
    }

    /// Engine with no rules registered.
    pub fn empty(clock: C) -> Self {
        Self {
            clock,
            rules: Mutex::new(Arc::new(Vec::new())),
            per_task: Mutex::new(HashMap::new()),
            global: Mutex::new(VecDeque::new()),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Append a rule. Serialized; readers keep the previous snapshot.
    pub fn add_rule(&self, def: RuleDef) -> Result<(), EngineError> {
        let compiled = Rule::compile(def)?;
        let mut guard = self.rules.lock();
        let mut next: Vec<Rule> = Vec::with_capacity(guard.len() + 1);
        for rule in guard.iter() {
            next.push(Rule {
                def: rule.def.clone(),
                pattern: rule.pattern.clone(),
                unless: rule.unless.clone(),
            });
        }
        next.push(compiled);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Remove a rule by id. Returns whether it existed.
    pub fn remove_rule(&self, id: &str) -> bool {
        let mut guard = self.rules.lock();
        if !guard.iter().any(|r| r.def.id == id) {
            return false;
        }
        let next: Vec<Rule> = guard
            .iter()
            .filter(|r| r.def.id != id)
            .map(|rule| Rule {
                def: rule.def.clone(),
                pattern: rule.pattern.clone(),
                unless: rule.unless.clone(),
            })
            .collect();
        *guard = Arc::new(next);
        true
    }

    fn snapshot(&self) -> Arc<Vec<Rule>> {
        Arc::clone(&self.rules.lock())
    }

    /// Check one line. All matching rules emit violations, in registration
    /// order.
    pub fn check_line(&self, task_id: &TaskId, line: &str) -> Vec<Violation> {
        let rules = self.snapshot();
        let timestamp = self.clock.iso_now();

        let mut violations = Vec::new();
        for rule in rules.iter() {
            if let Some(matched) = rule.matches(line) {
                let remediation = rule
                    .def
                    .remediation
                    .as_ref()
                    .map(|template| template.replace("{match}", matched.as_str()));
                violations.push(Violation {
                    rule_id: rule.def.id.clone(),
                    rule_name: rule.def.name.clone(),
                    severity: rule.def.severity,
                    matched: matched.as_str().to_string(),
                    line: line.to_string(),
                    task_id: task_id.clone(),
                    timestamp: timestamp.clone(),
                    remediation,
                });
            }
        }

        self.record(&violations);
        violations
    }

    /// Check a whole code block, line by line.
    pub fn check_block(&self, task_id: &TaskId, code: &str) -> Vec<Violation> {
        code.lines()
            .flat_map(|line| self.check_line(task_id, line))
            .collect()
    }

    fn record(&self, violations: &[Violation]) {
        if violations.is_empty() {
            return;
        }
        {
            let mut per_task = self.per_task.lock();
            for violation in violations {
                per_task
                    .entry(violation.task_id.clone())
                    .or_default()
                    .push(violation.clone());
            }
        }
        {
            let mut global = self.global.lock();
            for violation in violations {
                if global.len() >= GLOBAL_HISTORY {
                    global.pop_front();
                }
                global.push_back(violation.clone());
            }
        }
        let handlers = self.handlers.lock();
        for violation in violations {
            for handler in handlers.iter() {
                handler(violation);
            }
        }
    }

    /// Recorded violations, for one task or globally.
    pub fn violations(&self, task_id: Option<&TaskId>) -> Vec<Violation> {
        match task_id {
            Some(id) => self
                .per_task
                .lock()
                .get(id)
                .cloned()
                .unwrap_or_default(),
            None => self.global.lock().iter().cloned().collect(),
        }
    }

    /// Drop all recorded violations.
    pub fn clear(&self) {
        self.per_task.lock().clear();
        self.global.lock().clear();
    }

    /// Register a synchronous violation handler.
    pub fn on_violation<F>(&self, handler: F)
    where
        F: Fn(&Violation) + Send + Sync + 'static,
    {
        self.handlers.lock().push(Box::new(handler));
    }

    /// Current rule definitions, in registration order.
    pub fn export_rules(&self) -> Vec<RuleDef> {
        self.snapshot().iter().map(|r| r.def.clone()).collect()
    }

    /// The configured action of a rule, if it exists.
    pub fn rule_action(&self, id: &str) -> Option<RuleAction> {
        self.snapshot()
            .iter()
            .find(|r| r.def.id == id)
            .map(|r| r.def.action)
    }

    /// Append a batch of definitions.
    pub fn import_rules(&self, defs: Vec<RuleDef>) -> Result<(), EngineError> {
        for def in defs {
            self.add_rule(def)?;
        }
        Ok(())
    }

    /// Pick the remediation for the worst violation.
    ///
    /// Maximum severity wins; ties go to the earliest violation in the slice,
    /// which for `check_line` output is registration order.
    pub fn generate_intervention(&self, violations: &[Violation]) -> Option<String> {
        let mut worst: Option<&Violation> = None;
        for violation in violations.iter().filter(|v| v.remediation.is_some()) {
            match worst {
                Some(current) if violation.severity <= current.severity => {}
                _ => worst = Some(violation),
            }
        }
        worst.and_then(|v| v.remediation.clone())
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
