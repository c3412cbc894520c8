// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Intervention controller: closes the loop from detections to PTY writes.
//!
//! Injection protocol: the adapter's interrupt escape stops the subject's
//! current utterance, a short settle delay lets it quiesce, then the
//! remediation text goes in followed by the submission sequence. Text can be
//! drip-fed in small slices because some subject input layers discard
//! fast-pasted text.

use crate::error::EngineError;
use ov_adapters::ProcessAdapter;
use ov_core::{AutoApprovePattern, Event, SupervisorConfig, TaskId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Delay between the interrupt escape and the remediation text.
const INTERRUPT_SETTLE: Duration = Duration::from_millis(1_000);

/// Injected text is written in slices of this many characters.
const INJECT_SLICE: usize = 16;

/// An operation waiting for human approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingApproval {
    pub op_id: String,
    pub operation: String,
    pub details: String,
}

/// Controller knobs, derived from [`SupervisorConfig`].
#[derive(Debug, Clone)]
pub struct InterventionConfig {
    pub inject_delay: Duration,
    pub sensitive_operations: Vec<String>,
    pub auto_approve: bool,
    pub auto_approve_patterns: Vec<AutoApprovePattern>,
}

impl From<&SupervisorConfig> for InterventionConfig {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            inject_delay: Duration::from_millis(config.inject_delay_ms),
            sensitive_operations: config.sensitive_operations.clone(),
            auto_approve: config.auto_approve,
            auto_approve_patterns: config.auto_approve_patterns.clone(),
        }
    }
}

#[derive(Default)]
struct TaskControl {
    paused: bool,
    exited: bool,
    queued: VecDeque<String>,
    approvals: Vec<PendingApproval>,
    next_op: u64,
}

/// Per-task intervention state and PTY write access.
pub struct InterventionController<P: ProcessAdapter> {
    adapter: P,
    config: InterventionConfig,
    state: Mutex<HashMap<TaskId, TaskControl>>,
    /// Controller-originated events, routed to the ledger by the supervisor
    event_tx: mpsc::Sender<Event>,
}

impl<P: ProcessAdapter> InterventionController<P> {
    pub fn new(adapter: P, config: InterventionConfig, event_tx: mpsc::Sender<Event>) -> Arc<Self> {
        Arc::new(Self {
            adapter,
            config,
            state: Mutex::new(HashMap::new()),
            event_tx,
        })
    }

    /// Track a task. Must be called before any other operation on it.
    pub fn register_task(&self, task_id: &TaskId) {
        self.state
            .lock()
            .entry(task_id.clone())
            .or_default();
    }

    /// Record that the subject exited; later injections are dropped.
    pub fn mark_exited(&self, task_id: &TaskId) {
        if let Some(control) = self.state.lock().get_mut(task_id) {
            control.exited = true;
        }
    }

    /// Drop all state for a task.
    pub fn forget_task(&self, task_id: &TaskId) {
        self.state.lock().remove(task_id);
    }

    async fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event).await;
    }

    /// Write text to the subject and submit it.
    ///
    /// Queued while paused, dropped (with a warning) after exit; ordering of
    /// queued injections is FIFO.
    pub async fn inject(&self, task_id: &TaskId, text: &str) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock();
            let control = state
                .get_mut(task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
            if control.exited {
                tracing::warn!(%task_id, "dropping injection for exited task");
                return Ok(());
            }
            if control.paused {
                control.queued.push_back(text.to_string());
                return Ok(());
            }
        }

        self.write_text(task_id, text).await?;
        self.adapter.send_submission(task_id).await?;
        self.emit(Event::InterventionSent {
            task_id: task_id.clone(),
            message: text.to_string(),
        })
        .await;
        Ok(())
    }

    /// Drip-feed text so the subject's input layer keeps up.
    async fn write_text(&self, task_id: &TaskId, text: &str) -> Result<(), EngineError> {
        if self.config.inject_delay.is_zero() {
            self.adapter.send(task_id, text).await?;
            return Ok(());
        }
        let chars: Vec<char> = text.chars().collect();
        for slice in chars.chunks(INJECT_SLICE) {
            let part: String = slice.iter().collect();
            self.adapter.send(task_id, &part).await?;
            tokio::time::sleep(self.config.inject_delay).await;
        }
        Ok(())
    }

    /// Suppress writes; reads continue. Queued injections drain on resume.
    pub async fn pause(&self, task_id: &TaskId, reason: &str) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock();
            let control = state
                .get_mut(task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
            control.paused = true;
        }
        self.emit(Event::TaskPaused {
            id: task_id.clone(),
            reason: reason.to_string(),
        })
        .await;
        Ok(())
    }

    /// Resume writes and drain the injection queue in FIFO order.
    pub async fn resume(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let queued = {
            let mut state = self.state.lock();
            let control = state
                .get_mut(task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
            control.paused = false;
            std::mem::take(&mut control.queued)
        };
        self.emit(Event::TaskResumed {
            id: task_id.clone(),
        })
        .await;
        for text in queued {
            self.inject(task_id, &text).await?;
        }
        Ok(())
    }

    pub fn is_paused(&self, task_id: &TaskId) -> bool {
        self.state
            .lock()
            .get(task_id)
            .is_some_and(|c| c.paused)
    }

    /// Write the abort preamble, then kill the PTY.
    pub async fn abort(&self, task_id: &TaskId, reason: &str) -> Result<(), EngineError> {
        let already_exited = self
            .state
            .lock()
            .get(task_id)
            .is_some_and(|c| c.exited);

        if !already_exited {
            let preamble = format!("\n[overseer] aborting task: {}\n", reason);
            if let Err(e) = self.adapter.send(task_id, &preamble).await {
                tracing::warn!(%task_id, error = %e, "abort preamble write failed");
            }
            if let Err(e) = self.adapter.kill(task_id).await {
                tracing::warn!(%task_id, error = %e, "kill after abort failed");
            }
        }

        self.emit(Event::TaskAborted {
            id: task_id.clone(),
            reason: reason.to_string(),
        })
        .await;
        Ok(())
    }

    /// Interrupt the current utterance, wait for quiescence, then inject.
    pub async fn redirect(&self, task_id: &TaskId, new_direction: &str) -> Result<(), EngineError> {
        {
            let state = self.state.lock();
            let control = state
                .get(task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
            if control.exited {
                tracing::warn!(%task_id, "dropping redirect for exited task");
                return Ok(());
            }
        }
        self.adapter.send_interrupt(task_id).await?;
        tokio::time::sleep(INTERRUPT_SETTLE).await;
        self.inject(task_id, new_direction).await
    }

    /// Whether an operation name matches the sensitive-operations list.
    pub fn is_sensitive(&self, operation: &str) -> bool {
        let lower = operation.to_lowercase();
        self.config
            .sensitive_operations
            .iter()
            .any(|s| lower.contains(&s.to_lowercase()))
    }

    /// Queue an operation for human approval. Returns the operation id.
    pub async fn require_approval(
        &self,
        task_id: &TaskId,
        operation: &str,
        details: &str,
    ) -> Result<String, EngineError> {
        let op_id = {
            let mut state = self.state.lock();
            let control = state
                .get_mut(task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
            control.next_op += 1;
            let op_id = format!("{}-op-{}", task_id.short(8), control.next_op);
            control.approvals.push(PendingApproval {
                op_id: op_id.clone(),
                operation: operation.to_string(),
                details: details.to_string(),
            });
            op_id
        };
        self.emit(Event::ApprovalRequested {
            task_id: task_id.clone(),
            op_id: op_id.clone(),
            operation: operation.to_string(),
        })
        .await;
        Ok(op_id)
    }

    /// Pending approvals for a task.
    pub fn pending_approvals(&self, task_id: &TaskId) -> Vec<PendingApproval> {
        self.state
            .lock()
            .get(task_id)
            .map(|c| c.approvals.clone())
            .unwrap_or_default()
    }

    /// Resolve a queued approval. Approved operations proceed (optionally
    /// with modified instructions injected); denials inject a stop notice.
    pub async fn approve(
        &self,
        task_id: &TaskId,
        op_id: &str,
        approved: bool,
        modifications: Option<&str>,
    ) -> Result<(), EngineError> {
        let pending = {
            let mut state = self.state.lock();
            let control = state
                .get_mut(task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
            let index = control
                .approvals
                .iter()
                .position(|p| p.op_id == op_id)
                .ok_or_else(|| EngineError::Protocol(format!("unknown approval: {}", op_id)))?;
            control.approvals.remove(index)
        };

        self.emit(Event::ApprovalResolved {
            task_id: task_id.clone(),
            op_id: op_id.to_string(),
            approved,
        })
        .await;

        if approved {
            if let Some(text) = modifications {
                self.inject(task_id, text).await?;
            }
        } else {
            let notice = format!("Operation '{}' was denied. Do not proceed with it.", pending.operation);
            self.inject(task_id, &notice).await?;
        }
        Ok(())
    }

    /// Synthesize guidance from the surrounding text and inject it.
    pub async fn contextual_help(
        &self,
        task_id: &TaskId,
        context: &str,
    ) -> Result<Vec<String>, EngineError> {
        let lower = context.to_lowercase();
        let mut suggestions = Vec::new();
        if lower.contains("error") || lower.contains("exception") {
            suggestions.push("Read the error message and fix the first failing line".to_string());
        }
        if lower.contains("test") {
            suggestions.push("Run the test suite and make the failing test pass".to_string());
        }
        if lower.contains("todo") || lower.contains("later") {
            suggestions.push("Implement the deferred code now".to_string());
        }
        if suggestions.is_empty() {
            suggestions.push("Write the implementation to a file before explaining it".to_string());
        }

        let message = format!("Guidance:\n- {}", suggestions.join("\n- "));
        self.inject(task_id, &message).await?;
        Ok(suggestions)
    }

    /// Scan an output window for interactive confirmation prompts and answer
    /// them. Returns true when a response was written.
    pub async fn observe_output(&self, task_id: &TaskId, window: &str) -> bool {
        if !self.config.auto_approve {
            return false;
        }
        let exited = self
            .state
            .lock()
            .get(task_id)
            .is_none_or(|c| c.exited);
        if exited {
            return false;
        }
        for pattern in &self.config.auto_approve_patterns {
            if pattern.contains.iter().all(|needle| window.contains(needle.as_str())) {
                tracing::info!(%task_id, "confirmation prompt detected, auto-approving");
                if self.adapter.send(task_id, &pattern.response).await.is_ok() {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
#[path = "intervention_tests.rs"]
mod tests;
