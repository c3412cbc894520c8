// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the Overseer system
//!
//! Serializes with `{"type": "event:name", ...fields}` format.
//! Unknown type tags deserialize to `Custom`.

use crate::id::ShortId;
use crate::phase::{Phase, PhaseOutcome};
use crate::task::{ErrorKind, TaskId, WorkerId};
use crate::violation::Severity;
use serde::{Deserialize, Serialize};

/// Events recorded in the ledger and broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- task --
    #[serde(rename = "task:queued")]
    TaskQueued {
        id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<TaskId>,
        prompt: String,
        priority: i64,
    },

    #[serde(rename = "task:started")]
    TaskStarted { id: TaskId, worker_id: WorkerId },

    #[serde(rename = "task:paused")]
    TaskPaused { id: TaskId, reason: String },

    #[serde(rename = "task:resumed")]
    TaskResumed { id: TaskId },

    #[serde(rename = "task:completed")]
    TaskCompleted { id: TaskId, duration_ms: u64 },

    #[serde(rename = "task:failed")]
    TaskFailed {
        id: TaskId,
        kind: ErrorKind,
        error: String,
    },

    #[serde(rename = "task:aborted")]
    TaskAborted { id: TaskId, reason: String },

    // -- stream --
    /// Raw PTY byte window (lossy UTF-8)
    #[serde(rename = "stream:chunk")]
    StreamChunk { task_id: TaskId, bytes: String },

    #[serde(rename = "stream:file_created")]
    FileCreated { task_id: TaskId, path: String },

    #[serde(rename = "stream:file_modified")]
    FileModified { task_id: TaskId, path: String },

    #[serde(rename = "stream:command")]
    CommandExecuted { task_id: TaskId, command: String },

    #[serde(rename = "stream:code_block")]
    CodeBlock {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        body: String,
    },

    #[serde(rename = "stream:error")]
    ErrorOccurred { task_id: TaskId, message: String },

    // -- violation / intervention --
    #[serde(rename = "violation:detected")]
    ViolationDetected {
        task_id: TaskId,
        rule_id: String,
        severity: Severity,
        excerpt: String,
    },

    #[serde(rename = "intervention:sent")]
    InterventionSent { task_id: TaskId, message: String },

    #[serde(rename = "approval:requested")]
    ApprovalRequested {
        task_id: TaskId,
        op_id: String,
        operation: String,
    },

    #[serde(rename = "approval:resolved")]
    ApprovalResolved {
        task_id: TaskId,
        op_id: String,
        approved: bool,
    },

    // -- phase --
    #[serde(rename = "phase:started")]
    PhaseStarted { task_id: TaskId, phase: Phase },

    #[serde(rename = "phase:completed")]
    PhaseCompleted {
        task_id: TaskId,
        phase: Phase,
        outcome: PhaseOutcome,
    },

    // -- tool --
    /// Parsed from the `TOOL_INVOCATION: {json}` sentinel in the stream
    #[serde(rename = "tool:invocation")]
    ToolInvocation {
        task_id: TaskId,
        payload: serde_json::Value,
    },

    // -- meta --
    /// Deferred report of a ledger sink failure
    #[serde(rename = "meta:error")]
    MetaError { message: String },

    /// Chunk persistence was dropped because the store fell behind
    #[serde(rename = "meta:persistence_lag")]
    PersistenceLag { dropped: u64 },

    // -- system --
    #[serde(rename = "system:shutdown")]
    Shutdown,

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskQueued { .. } => "task:queued",
            Event::TaskStarted { .. } => "task:started",
            Event::TaskPaused { .. } => "task:paused",
            Event::TaskResumed { .. } => "task:resumed",
            Event::TaskCompleted { .. } => "task:completed",
            Event::TaskFailed { .. } => "task:failed",
            Event::TaskAborted { .. } => "task:aborted",
            Event::StreamChunk { .. } => "stream:chunk",
            Event::FileCreated { .. } => "stream:file_created",
            Event::FileModified { .. } => "stream:file_modified",
            Event::CommandExecuted { .. } => "stream:command",
            Event::CodeBlock { .. } => "stream:code_block",
            Event::ErrorOccurred { .. } => "stream:error",
            Event::ViolationDetected { .. } => "violation:detected",
            Event::InterventionSent { .. } => "intervention:sent",
            Event::ApprovalRequested { .. } => "approval:requested",
            Event::ApprovalResolved { .. } => "approval:resolved",
            Event::PhaseStarted { .. } => "phase:started",
            Event::PhaseCompleted { .. } => "phase:completed",
            Event::ToolInvocation { .. } => "tool:invocation",
            Event::MetaError { .. } => "meta:error",
            Event::PersistenceLag { .. } => "meta:persistence_lag",
            Event::Shutdown => "system:shutdown",
            Event::Custom => "custom",
        }
    }

    /// The task this event belongs to, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskQueued { id, .. }
            | Event::TaskStarted { id, .. }
            | Event::TaskPaused { id, .. }
            | Event::TaskResumed { id }
            | Event::TaskCompleted { id, .. }
            | Event::TaskFailed { id, .. }
            | Event::TaskAborted { id, .. } => Some(id),
            Event::StreamChunk { task_id, .. }
            | Event::FileCreated { task_id, .. }
            | Event::FileModified { task_id, .. }
            | Event::CommandExecuted { task_id, .. }
            | Event::CodeBlock { task_id, .. }
            | Event::ErrorOccurred { task_id, .. }
            | Event::ViolationDetected { task_id, .. }
            | Event::InterventionSent { task_id, .. }
            | Event::ApprovalRequested { task_id, .. }
            | Event::ApprovalResolved { task_id, .. }
            | Event::PhaseStarted { task_id, .. }
            | Event::PhaseCompleted { task_id, .. }
            | Event::ToolInvocation { task_id, .. } => Some(task_id),
            Event::MetaError { .. }
            | Event::PersistenceLag { .. }
            | Event::Shutdown
            | Event::Custom => None,
        }
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::TaskQueued { id, priority, .. } => {
                format!("{t} id={id} priority={priority}")
            }
            Event::TaskStarted { id, worker_id } => {
                format!("{t} id={id} worker={worker_id}")
            }
            Event::TaskPaused { id, reason } => format!("{t} id={id} reason={reason}"),
            Event::TaskResumed { id } => format!("{t} id={id}"),
            Event::TaskCompleted { id, duration_ms } => {
                format!("{t} id={id} duration_ms={duration_ms}")
            }
            Event::TaskFailed { id, kind, .. } => format!("{t} id={id} kind={kind}"),
            Event::TaskAborted { id, reason } => format!("{t} id={id} reason={reason}"),
            Event::StreamChunk { task_id, bytes } => {
                format!("{t} task={task_id} len={}", bytes.len())
            }
            Event::FileCreated { task_id, path } | Event::FileModified { task_id, path } => {
                format!("{t} task={task_id} path={path}")
            }
            Event::CommandExecuted { task_id, command } => {
                format!("{t} task={task_id} cmd={}", command.short(48))
            }
            Event::CodeBlock {
                task_id,
                language,
                body,
            } => format!(
                "{t} task={task_id} lang={} len={}",
                language.as_deref().unwrap_or("-"),
                body.len()
            ),
            Event::ErrorOccurred { task_id, message } => {
                format!("{t} task={task_id} msg={}", message.short(64))
            }
            Event::ViolationDetected {
                task_id,
                rule_id,
                severity,
                ..
            } => format!("{t} task={task_id} rule={rule_id} severity={severity}"),
            Event::InterventionSent { task_id, message } => {
                format!("{t} task={task_id} msg={}", message.short(48))
            }
            Event::ApprovalRequested {
                task_id,
                op_id,
                operation,
            } => format!("{t} task={task_id} op={op_id} operation={operation}"),
            Event::ApprovalResolved {
                task_id,
                op_id,
                approved,
            } => format!("{t} task={task_id} op={op_id} approved={approved}"),
            Event::PhaseStarted { task_id, phase } => {
                format!("{t} task={task_id} phase={phase}")
            }
            Event::PhaseCompleted {
                task_id,
                phase,
                outcome,
            } => format!("{t} task={task_id} phase={phase} outcome={outcome:?}"),
            Event::ToolInvocation { task_id, .. } => format!("{t} task={task_id}"),
            Event::MetaError { message } => format!("{t} msg={}", message.short(64)),
            Event::PersistenceLag { dropped } => format!("{t} dropped={dropped}"),
            Event::Shutdown | Event::Custom => t.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
