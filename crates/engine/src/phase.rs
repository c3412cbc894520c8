// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase controller: the research → planning → execution → integration
//! state machine with per-phase tool gating and time budgets.
//!
//! Simple tasks bypass this entirely and run as a single execution phase.

use ov_core::{Clock, Phase, PhaseOutcome, PhaseRecord, TaskId};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One planned phase.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub phase: Phase,
    pub budget: Duration,
    pub allowed_tools: BTreeSet<String>,
    pub forbidden_tools: BTreeSet<String>,
    pub output_file: PathBuf,
    pub success_pattern: Option<String>,
}

/// Ordered plan of phases for one task.
#[derive(Debug, Clone)]
pub struct PhasePlan {
    pub phases: Vec<PhaseSpec>,
}

fn tools(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl PhasePlan {
    /// The full four-phase plan with standard artifacts under `workspace`.
    pub fn standard(workspace: &Path) -> Self {
        Self {
            phases: vec![
                PhaseSpec {
                    phase: Phase::Research,
                    budget: Duration::from_secs(180),
                    allowed_tools: tools(&["read_file", "grep", "list_directory", "web_search"]),
                    forbidden_tools: tools(&["write_file", "run_command"]),
                    output_file: workspace.join("research-findings.md"),
                    success_pattern: None,
                },
                PhaseSpec {
                    phase: Phase::Planning,
                    budget: Duration::from_secs(180),
                    allowed_tools: tools(&["read_file", "write_file"]),
                    forbidden_tools: tools(&["run_command", "web_search"]),
                    output_file: workspace.join("task-plan.json"),
                    success_pattern: None,
                },
                PhaseSpec {
                    phase: Phase::Execution,
                    budget: Duration::from_secs(600),
                    allowed_tools: tools(&["read_file", "write_file", "run_command"]),
                    forbidden_tools: tools(&["web_search"]),
                    // Execution produces the files the plan enumerates; any
                    // observed file write under the workspace counts.
                    output_file: workspace.to_path_buf(),
                    success_pattern: None,
                },
                PhaseSpec {
                    phase: Phase::Integration,
                    budget: Duration::from_secs(300),
                    allowed_tools: tools(&["read_file", "write_file", "run_command"]),
                    forbidden_tools: tools(&["web_search"]),
                    output_file: workspace.join("integrated-solution.md"),
                    success_pattern: None,
                },
            ],
        }
    }

    /// Degenerate plan: one execution phase with the given budget.
    pub fn single_execution(workspace: &Path, budget: Duration) -> Self {
        Self {
            phases: vec![PhaseSpec {
                phase: Phase::Execution,
                budget,
                allowed_tools: BTreeSet::new(),
                forbidden_tools: BTreeSet::new(),
                output_file: workspace.to_path_buf(),
                success_pattern: None,
            }],
        }
    }
}

/// Result of a tool-gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolGate {
    Allowed,
    /// The tool is denied in the current phase; inject this remediation.
    Forbidden { remediation: String },
}

/// A completed phase plus what starts next.
#[derive(Debug, Clone)]
pub struct PhaseTransition {
    pub finished: PhaseRecord,
    /// (phase, prompt) of the next phase, if the plan continues
    pub next: Option<(Phase, String)>,
}

/// Drives one task through its phase plan.
pub struct PhaseController<C: Clock> {
    task_id: TaskId,
    clock: C,
    plan: Vec<PhaseSpec>,
    records: Vec<PhaseRecord>,
    current: usize,
    task_prompt: String,
}

impl<C: Clock> PhaseController<C> {
    pub fn new(task_id: TaskId, task_prompt: impl Into<String>, plan: PhasePlan, clock: C) -> Self {
        Self {
            task_id,
            clock,
            plan: plan.phases,
            records: Vec::new(),
            current: 0,
            task_prompt: task_prompt.into(),
        }
    }

    /// Begin the first phase and return its prompt.
    pub fn start(&mut self) -> Option<(Phase, String)> {
        self.begin_current()
    }

    fn begin_current(&mut self) -> Option<(Phase, String)> {
        let spec = self.plan.get(self.current)?;
        self.records.push(PhaseRecord {
            phase: spec.phase,
            budget_ms: spec.budget.as_millis() as u64,
            allowed_tools: spec.allowed_tools.clone(),
            forbidden_tools: spec.forbidden_tools.clone(),
            output_file: spec.output_file.clone(),
            success_pattern: spec.success_pattern.clone(),
            started_at_ms: self.clock.epoch_ms(),
            ended_at_ms: None,
            outcome: None,
        });
        Some((spec.phase, self.phase_prompt(spec)))
    }

    fn phase_prompt(&self, spec: &PhaseSpec) -> String {
        let tools = if spec.allowed_tools.is_empty() {
            "any tool".to_string()
        } else {
            spec.allowed_tools
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };
        let minutes = spec.budget.as_secs().div_ceil(60);
        match spec.phase {
            Phase::Research => format!(
                "Research phase ({minutes} min, tools: {tools}). Gather only the facts needed \
                 for: {task}. Write your findings to {artifact}. Do not write any other files.",
                task = self.task_prompt,
                artifact = spec.output_file.display(),
            ),
            Phase::Planning => format!(
                "Planning phase ({minutes} min, tools: {tools}). Produce {artifact}: a JSON \
                 array of tasks, each {{id, prompt, expectedFiles, duration}}, that implements: \
                 {task}. No prose outside the file.",
                task = self.task_prompt,
                artifact = spec.output_file.display(),
            ),
            Phase::Execution => format!(
                "Execution phase ({minutes} min, tools: {tools}). Implement: {task}. Create the \
                 files your plan enumerates under {artifact}. Code in files, not in chat.",
                task = self.task_prompt,
                artifact = spec.output_file.display(),
            ),
            Phase::Integration => format!(
                "Integration phase ({minutes} min, tools: {tools}). Combine the produced files \
                 into a working whole and write {artifact}.",
                artifact = spec.output_file.display(),
            ),
        }
    }

    /// The phase currently running, if any.
    pub fn current_phase(&self) -> Option<Phase> {
        self.plan.get(self.current).map(|s| s.phase)
    }

    /// All phase records so far (a strict prefix of the phase order).
    pub fn records(&self) -> &[PhaseRecord] {
        &self.records
    }

    /// Gate a tool use against the current phase.
    pub fn tool_allowed(&self, tool: &str) -> ToolGate {
        let Some(spec) = self.plan.get(self.current) else {
            return ToolGate::Allowed;
        };
        let denied = spec.forbidden_tools.contains(tool)
            || (!spec.allowed_tools.is_empty() && !spec.allowed_tools.contains(tool));
        if denied {
            ToolGate::Forbidden {
                remediation: format!(
                    "The tool '{}' is not available during the {} phase. Allowed tools: {}. \
                     Continue with those.",
                    tool,
                    spec.phase,
                    if spec.allowed_tools.is_empty() {
                        "unrestricted".to_string()
                    } else {
                        spec.allowed_tools
                            .iter()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", ")
                    }
                ),
            }
        } else {
            ToolGate::Allowed
        }
    }

    /// Budget check. On exhaustion the phase is force-terminated, a
    /// best-effort artifact is synthesized, and the next phase begins.
    pub fn on_tick(&mut self) -> Option<PhaseTransition> {
        let spec = self.plan.get(self.current)?;
        let record = self.records.last()?;
        let elapsed = self.clock.epoch_ms().saturating_sub(record.started_at_ms);
        if elapsed < spec.budget.as_millis() as u64 {
            return None;
        }

        // Synthesize the artifact so downstream phases have something to read
        if spec.output_file.extension().is_some() && !spec.output_file.exists() {
            if let Err(e) = std::fs::write(&spec.output_file, "") {
                tracing::warn!(
                    task_id = %self.task_id,
                    path = %spec.output_file.display(),
                    error = %e,
                    "failed to synthesize phase artifact"
                );
            }
        }

        Some(self.advance(PhaseOutcome::Timeout))
    }

    /// An artifact write was observed. If it is the current phase's output,
    /// the phase succeeds and the plan advances immediately.
    pub fn on_artifact_observed(&mut self, path: &Path) -> Option<PhaseTransition> {
        let spec = self.plan.get(self.current)?;
        let matches = if spec.output_file.extension().is_some() {
            path == spec.output_file
                || path.file_name() == spec.output_file.file_name()
        } else {
            // Directory target (execution): any file write counts
            true
        };
        matches.then(|| self.advance(PhaseOutcome::Success))
    }

    /// Force-close the current phase (task aborted or interrupted).
    pub fn interrupt(&mut self) -> Option<PhaseRecord> {
        if self.current >= self.plan.len() {
            return None;
        }
        let epoch_ms = self.clock.epoch_ms();
        self.current = self.plan.len();
        let record = self.records.last_mut()?;
        record.finish(PhaseOutcome::Interrupted, epoch_ms);
        Some(record.clone())
    }

    fn advance(&mut self, outcome: PhaseOutcome) -> PhaseTransition {
        let epoch_ms = self.clock.epoch_ms();
        if let Some(record) = self.records.last_mut() {
            record.finish(outcome, epoch_ms);
        }
        let finished = self
            .records
            .last()
            .cloned()
            .unwrap_or_else(|| PhaseRecord {
                phase: Phase::Execution,
                budget_ms: 0,
                allowed_tools: BTreeSet::new(),
                forbidden_tools: BTreeSet::new(),
                output_file: PathBuf::new(),
                success_pattern: None,
                started_at_ms: epoch_ms,
                ended_at_ms: Some(epoch_ms),
                outcome: Some(outcome),
            });

        self.current += 1;
        let next = self.begin_current();
        PhaseTransition { finished, next }
    }

    /// Whether every phase in the plan has finished.
    pub fn is_done(&self) -> bool {
        self.current >= self.plan.len()
    }
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;
