// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation projection of a task.

use crate::task::TaskStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Identifier of a conversation row in the store.
    ///
    /// For supervised tasks the conversation id equals the task id, so the
    /// ledger and the store can be joined without a mapping table.
    pub struct ConversationId;
}

/// Relational projection of a task: one row per supervised process.
///
/// Conversations form a forest ordered by (depth asc, started_at asc).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ConversationId>,
    /// ISO-8601 millisecond timestamp
    pub started_at: String,
    pub status: TaskStatus,
    /// Root = 0, child = parent.depth + 1
    pub depth: u32,
    pub prompt: String,
    /// Free-form tag describing what kind of work this is
    pub task_type: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Conversation {
    pub fn root(id: ConversationId, prompt: impl Into<String>, started_at: String) -> Self {
        Self {
            id,
            parent_id: None,
            started_at,
            status: TaskStatus::Running,
            depth: 0,
            prompt: prompt.into(),
            task_type: "task".to_string(),
            metadata: HashMap::new(),
        }
    }

    /// Create a child conversation one level below `parent`.
    pub fn child_of(
        parent: &Conversation,
        id: ConversationId,
        prompt: impl Into<String>,
        started_at: String,
    ) -> Self {
        Self {
            id,
            parent_id: Some(parent.id.clone()),
            started_at,
            status: TaskStatus::Running,
            depth: parent.depth + 1,
            prompt: prompt.into(),
            task_type: "task".to_string(),
            metadata: HashMap::new(),
        }
    }
}
