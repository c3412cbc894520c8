// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook orchestrator: ordered transducers over lifecycle events.
//!
//! Hooks run in priority order (highest first, ties in registration order).
//! A hook may pass the input through, replace it for everything downstream,
//! or block the operation with a reason.

use crate::error::EngineError;
use ov_core::TaskId;
use parking_lot::Mutex;
use regex::Regex;

/// Lifecycle points a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    PreAdmission,
    PreSpawn,
    StreamEvent,
    Violation,
    PostExecution,
    ConversationCreated,
    ActionLogged,
    TaskStatusUpdated,
    PhaseTransition,
}

/// Input delivered to hooks at a point.
#[derive(Debug, Clone)]
pub struct HookInput {
    pub point: HookPoint,
    pub task_id: Option<TaskId>,
    pub payload: serde_json::Value,
}

/// What a hook decided.
#[derive(Debug, Clone)]
pub enum HookVerdict {
    /// Pass the input through unchanged
    Continue,
    /// Short-circuit: reject the operation
    Block { reason: String },
    /// Replace the payload for later hooks and the executor
    Replace { payload: serde_json::Value },
}

type HookFn = Box<dyn Fn(&HookInput) -> HookVerdict + Send + Sync>;

struct RegisteredHook {
    name: String,
    point: HookPoint,
    priority: i32,
    seq: u64,
    hook: HookFn,
}

/// Ordered hook registry and dispatcher.
#[derive(Default)]
pub struct HookOrchestrator {
    hooks: Mutex<Vec<RegisteredHook>>,
    next_seq: Mutex<u64>,
}

impl HookOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orchestrator with the concrete-task admission validator installed.
    pub fn with_admission_validator() -> Result<Self, EngineError> {
        let orchestrator = Self::new();
        orchestrator.register_admission_validator()?;
        Ok(orchestrator)
    }

    /// Register a hook at a point. Higher priority runs first.
    pub fn register<F>(&self, name: &str, point: HookPoint, priority: i32, hook: F)
    where
        F: Fn(&HookInput) -> HookVerdict + Send + Sync + 'static,
    {
        let seq = {
            let mut next = self.next_seq.lock();
            *next += 1;
            *next
        };
        let mut hooks = self.hooks.lock();
        hooks.push(RegisteredHook {
            name: name.to_string(),
            point,
            priority,
            seq,
            hook: Box::new(hook),
        });
        hooks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
    }

    /// Run all hooks registered for the input's point.
    ///
    /// Returns the (possibly replaced) payload, or the blocking reason.
    pub fn run(&self, mut input: HookInput) -> Result<serde_json::Value, String> {
        let point = input.point;
        let hooks = self.hooks.lock();
        for registered in hooks.iter().filter(|h| h.point == point) {
            match (registered.hook)(&input) {
                HookVerdict::Continue => {}
                HookVerdict::Block { reason } => {
                    tracing::info!(
                        hook = %registered.name,
                        point = ?input.point,
                        reason = %reason,
                        "hook blocked operation"
                    );
                    return Err(reason);
                }
                HookVerdict::Replace { payload } => {
                    input.payload = payload;
                }
            }
        }
        Ok(input.payload)
    }

    /// Notify hooks at a point, ignoring verdicts (fan-out only).
    pub fn notify(&self, point: HookPoint, task_id: Option<&TaskId>, payload: serde_json::Value) {
        let _ = self.run(HookInput {
            point,
            task_id: task_id.cloned(),
            payload,
        });
    }

    /// The concrete-task validation hook.
    ///
    /// A prompt is admissible when it contains an action verb AND either a
    /// file-path-like token or a concrete noun. Pure-research prompts and
    /// TODO-laden prompts are blocked.
    fn register_admission_validator(&self) -> Result<(), EngineError> {
        let action_verb = Regex::new(
            r"(?i)\b(create|implement|write|build|fix|add|update|refactor|test)\b",
        )?;
        let path_token = Regex::new(r"[\w./-]+\.\w{1,8}\b")?;
        let concrete_noun = Regex::new(
            r"(?i)\b(component|function|class|module|feature|endpoint|api|test)s?\b",
        )?;
        let todo_marker = Regex::new(r"\b(TODO|FIXME)\b")?;

        self.register("concrete-task", HookPoint::PreSpawn, 100, move |input| {
            let prompt = input
                .payload
                .get("prompt")
                .and_then(|v| v.as_str())
                .unwrap_or_default();

            if todo_marker.is_match(prompt) {
                return HookVerdict::Block {
                    reason: "concrete-task policy: prompt defers work with TODO/FIXME markers"
                        .to_string(),
                };
            }
            if !action_verb.is_match(prompt) {
                return HookVerdict::Block {
                    reason: "concrete-task policy: prompt has no action verb (create, \
                             implement, write, build, fix, add, update, refactor, test)"
                        .to_string(),
                };
            }
            if !path_token.is_match(prompt) && !concrete_noun.is_match(prompt) {
                return HookVerdict::Block {
                    reason: "concrete-task policy: prompt names neither a file nor a concrete \
                             deliverable"
                        .to_string(),
                };
            }
            HookVerdict::Continue
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
