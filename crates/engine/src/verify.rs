// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verification engine: offline replay of conversations into pass/fail.
//!
//! Replays a conversation's actions from the store through a declarative
//! rule set. `files-required` fails conversations that talked a lot but
//! touched nothing; `code-to-files` fails code blocks that were never
//! followed by a file write; `no-todos` fails conversations that left
//! deferred-work markers behind.

use crate::error::EngineError;
use ov_core::{Action, ActionKind, ConversationId, VerificationMetrics, VerificationReport};
use ov_storage::ConversationStore;
use regex::Regex;
use std::sync::Arc;

/// A code block must be followed by a file-touch within this many actions.
const CODE_TO_FILES_WINDOW: usize = 3;

/// Conversations with more than this many actions need at least one
/// file-touch to pass.
const FILES_REQUIRED_THRESHOLD: usize = 5;

/// Replays stored conversations into verification reports.
pub struct VerificationEngine {
    store: Arc<ConversationStore>,
    todo_marker: Regex,
}

impl VerificationEngine {
    pub fn new(store: Arc<ConversationStore>) -> Result<Self, EngineError> {
        Ok(Self {
            store,
            todo_marker: Regex::new(r"\b(TODO|FIXME)\b")?,
        })
    }

    /// Verify one conversation.
    pub fn verify(&self, id: &ConversationId) -> Result<VerificationReport, EngineError> {
        let actions = self.store.get_actions(id)?;
        Ok(self.evaluate(&actions))
    }

    /// Verify a conversation and all of its descendants.
    ///
    /// The tree passes only if every conversation in it passes; metrics are
    /// summed, violations prefixed with the conversation id.
    pub fn verify_tree(&self, root: &ConversationId) -> Result<VerificationReport, EngineError> {
        let conversations = self.store.get_conversation_tree(root)?;
        let mut passed = true;
        let mut violations = Vec::new();
        let mut metrics = VerificationMetrics::default();

        for conversation in &conversations {
            let report = self.verify(&conversation.id)?;
            passed &= report.passed;
            violations.extend(
                report
                    .violations
                    .into_iter()
                    .map(|v| format!("{}: {}", conversation.id, v)),
            );
            metrics.files_created += report.metrics.files_created;
            metrics.files_modified += report.metrics.files_modified;
            metrics.todos_found += report.metrics.todos_found;
            metrics.code_blocks += report.metrics.code_blocks;
            metrics.actual_implementation |= report.metrics.actual_implementation;
        }

        Ok(VerificationReport {
            passed,
            violations,
            metrics,
        })
    }

    /// Real-time variant: check only the newest action and return violations.
    pub fn verify_latest(&self, id: &ConversationId) -> Result<Vec<String>, EngineError> {
        let actions = self.store.get_actions(id)?;
        let Some(latest) = actions.last() else {
            return Ok(Vec::new());
        };

        let mut violations = Vec::new();
        if self.todo_marker.is_match(&latest.content) {
            violations.push(format!("no-todos: {}", latest.content.trim()));
        }
        if latest.kind == ActionKind::Error {
            violations.push(format!("error-action: {}", latest.content.trim()));
        }
        Ok(violations)
    }

    fn evaluate(&self, actions: &[Action]) -> VerificationReport {
        let mut metrics = VerificationMetrics::default();
        let mut violations = Vec::new();

        for action in actions {
            match action.kind {
                ActionKind::FileCreated => metrics.files_created += 1,
                ActionKind::FileModified => metrics.files_modified += 1,
                ActionKind::CodeBlock => metrics.code_blocks += 1,
                _ => {}
            }
            metrics.todos_found += self.todo_marker.find_iter(&action.content).count() as u64;
        }
        metrics.actual_implementation = metrics.files_created + metrics.files_modified > 0;

        // files-required: plenty of actions, zero artifacts
        if actions.len() > FILES_REQUIRED_THRESHOLD && !metrics.actual_implementation {
            violations.push(format!(
                "files-required: {} actions produced no file",
                actions.len()
            ));
        }

        // code-to-files: every code block must turn into a file soon after
        for (index, action) in actions.iter().enumerate() {
            if action.kind != ActionKind::CodeBlock {
                continue;
            }
            let window = &actions[index + 1..(index + 1 + CODE_TO_FILES_WINDOW).min(actions.len())];
            if !window.iter().any(|a| a.kind.is_file_touch()) {
                violations.push(format!(
                    "code-to-files: code block at action {} never reached a file",
                    index
                ));
            }
        }

        // no-todos: deferred-work markers anywhere in the conversation
        if metrics.todos_found > 0 {
            violations.push(format!(
                "no-todos: {} TODO/FIXME markers remain",
                metrics.todos_found
            ));
        }

        VerificationReport {
            passed: violations.is_empty(),
            violations,
            metrics,
        }
    }
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod tests;
