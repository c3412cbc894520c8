// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actions: discriminated side effects observed on a conversation.

use crate::conversation::ConversationId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

crate::define_id! {
    /// Identifier of an action row in the store.
    pub struct ActionId;
}

/// Kind of side effect observed on a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    FileCreated,
    FileModified,
    CommandExecuted,
    Error,
    Output,
    TaskStarted,
    TaskCompleted,
    CodeBlock,
    OutputChunk,
    Intervention,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::FileCreated => "file-created",
            ActionKind::FileModified => "file-modified",
            ActionKind::CommandExecuted => "command-executed",
            ActionKind::Error => "error",
            ActionKind::Output => "output",
            ActionKind::TaskStarted => "task-started",
            ActionKind::TaskCompleted => "task-completed",
            ActionKind::CodeBlock => "code-block",
            ActionKind::OutputChunk => "output-chunk",
            ActionKind::Intervention => "intervention",
        }
    }

    /// Parse the store's TEXT column back into a kind.
    pub fn parse(s: &str) -> Option<ActionKind> {
        Some(match s {
            "file-created" => ActionKind::FileCreated,
            "file-modified" => ActionKind::FileModified,
            "command-executed" => ActionKind::CommandExecuted,
            "error" => ActionKind::Error,
            "output" => ActionKind::Output,
            "task-started" => ActionKind::TaskStarted,
            "task-completed" => ActionKind::TaskCompleted,
            "code-block" => ActionKind::CodeBlock,
            "output-chunk" => ActionKind::OutputChunk,
            "intervention" => ActionKind::Intervention,
            _ => return None,
        })
    }

    /// File-touch kinds satisfy acceptance criteria and verification rules.
    pub fn is_file_touch(&self) -> bool {
        matches!(self, ActionKind::FileCreated | ActionKind::FileModified)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single observed side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub conversation_id: ConversationId,
    pub kind: ActionKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    /// ISO-8601 millisecond timestamp; non-decreasing within a conversation
    pub timestamp: String,
}

impl Action {
    pub fn new(
        id: ActionId,
        conversation_id: ConversationId,
        kind: ActionKind,
        content: impl Into<String>,
        timestamp: String,
    ) -> Self {
        Self {
            id,
            conversation_id,
            kind,
            content: content.into(),
            metadata: None,
            timestamp,
        }
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
