// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task model and lifecycle.
//!
//! A task is the unit of supervised work: one prompt, one subject process,
//! one terminal outcome. Tasks are owned by the pool; status transitions are
//! monotonic and a terminal status is reached at most once.

use crate::violation::VerificationReport;
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a supervised task.
    pub struct TaskId;
}

crate::define_id! {
    /// Identifier of the pool worker that owns a task's process.
    pub struct WorkerId;
}

/// Error kinds surfaced by the supervision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Admission rejected the prompt
    Validation,
    /// PTY attach failed
    Spawn,
    /// Read/write to the PTY failed
    Io,
    /// Phase or global deadline exceeded
    Timeout,
    /// No activity from the subject process
    Stall,
    /// An intervention interrupted the subject
    ViolationInterrupt,
    /// Tool forbidden in the current phase
    ForbiddenTool,
    /// Conversation store failure
    Persistence,
    /// Malformed tool invocation
    Protocol,
    /// Bug assertion
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Spawn => "spawn",
            ErrorKind::Io => "io",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Stall => "stall",
            ErrorKind::ViolationInterrupt => "violation-interrupt",
            ErrorKind::ForbiddenTool => "forbidden-tool",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Aborted,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Aborted
        )
    }

    /// Parse the store's TEXT column back into a status.
    pub fn parse(s: &str) -> Option<TaskStatus> {
        Some(match s {
            "queued" => TaskStatus::Queued,
            "running" => TaskStatus::Running,
            "paused" => TaskStatus::Paused,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "aborted" => TaskStatus::Aborted,
            _ => return None,
        })
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// What a task must have produced to count as done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriteria {
    /// Path patterns the subject is expected to create, in order.
    #[serde(default)]
    pub expected_files: Vec<String>,
    /// Whether the subject must have executed at least one command.
    #[serde(default)]
    pub must_execute: bool,
}

/// Fan-out shape for a submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnPattern {
    #[default]
    Single,
    Parallel,
}

/// Options accepted at task submission (mirrors the external tool contract).
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub priority: i64,
    pub parent: Option<TaskId>,
    pub acceptance: AcceptanceCriteria,
    pub spawn_pattern: SpawnPattern,
    pub spawn_count: Option<u32>,
    pub system_prompt: Option<String>,
    /// Overall deadline in milliseconds; None uses the configured default.
    pub timeout_ms: Option<u64>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    /// Run the four-phase plan instead of a single execution phase.
    pub phased: bool,
}

/// A supervised task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub prompt: String,
    pub priority: i64,
    pub status: TaskStatus,
    #[serde(default)]
    pub acceptance: AcceptanceCriteria,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, prompt: impl Into<String>, priority: i64, created_at_ms: u64) -> Self {
        Self {
            id,
            parent_id: None,
            prompt: prompt.into(),
            priority,
            status: TaskStatus::Queued,
            acceptance: AcceptanceCriteria::default(),
            created_at_ms,
            started_at_ms: None,
            ended_at_ms: None,
            worker_id: None,
            error: None,
        }
    }

    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn with_acceptance(mut self, acceptance: AcceptanceCriteria) -> Self {
        self.acceptance = acceptance;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status transition.
    ///
    /// Terminal statuses are monotonic: once reached, further transitions are
    /// ignored and `false` is returned.
    pub fn transition(&mut self, status: TaskStatus, epoch_ms: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        if status == TaskStatus::Running && self.started_at_ms.is_none() {
            self.started_at_ms = Some(epoch_ms);
        }
        if status.is_terminal() {
            self.ended_at_ms = Some(epoch_ms);
        }
        self.status = status;
        true
    }

    /// Duration from start to end, when both are known.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at_ms, self.ended_at_ms) {
            (Some(s), Some(e)) => Some(e.saturating_sub(s)),
            _ => None,
        }
    }
}

/// Final result delivered for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: TaskId,
    pub prompt: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub start_time: String,
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
