// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule and violation records shared across the engine and storage layers.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a violation. Ordering matters: intervention selection picks
/// the maximum-severity match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// What the engine does when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Record only
    Log,
    /// Record and warn the subject
    Warn,
    /// Interrupt the subject and inject the remediation
    Interrupt,
    /// Interrupt and redirect the subject to a new direction
    Redirect,
}

/// A rule match on subject output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    /// The excerpt that matched the pattern
    pub matched: String,
    /// The full line the match occurred on
    pub line: String,
    pub task_id: TaskId,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// Serializable rule definition (export/import form).
///
/// The pattern is kept as source text; the engine compiles it on load.
/// `unless` makes the rule a composite predicate: a line matching both
/// `pattern` and `unless` is not a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDef {
    pub id: String,
    pub name: String,
    pub description: String,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless: Option<String>,
    pub severity: Severity,
    pub action: RuleAction,
    #[serde(default)]
    pub auto_fix: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// Accumulated measurements from replaying a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMetrics {
    pub files_created: u64,
    pub files_modified: u64,
    pub todos_found: u64,
    pub code_blocks: u64,
    /// True when at least one file-touch action exists.
    pub actual_implementation: bool,
}

/// Result of verifying a conversation against the declarative rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub violations: Vec<String>,
    pub metrics: VerificationMetrics,
}

#[cfg(test)]
#[path = "violation_tests.rs"]
mod tests;
