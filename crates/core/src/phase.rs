// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase records for the four-phase task state machine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Phases run in a strict linear order; a task's phase records form a
/// prefix of this sequence and no phase appears twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Research,
    Planning,
    Execution,
    Integration,
}

impl Phase {
    /// The phase that follows this one, if any.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Research => Some(Phase::Planning),
            Phase::Planning => Some(Phase::Execution),
            Phase::Execution => Some(Phase::Integration),
            Phase::Integration => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Research => "research",
            Phase::Planning => "planning",
            Phase::Execution => "execution",
            Phase::Integration => "integration",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a finished phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    Success,
    Timeout,
    Interrupted,
}

/// Record of one phase of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    /// Time budget in milliseconds
    pub budget_ms: u64,
    pub allowed_tools: BTreeSet<String>,
    pub forbidden_tools: BTreeSet<String>,
    /// Artifact the subject is instructed to write
    pub output_file: PathBuf,
    /// Optional regex source marking success in the output stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_pattern: Option<String>,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PhaseOutcome>,
}

impl PhaseRecord {
    /// Close the record with the given outcome.
    pub fn finish(&mut self, outcome: PhaseOutcome, epoch_ms: u64) {
        if self.ended_at_ms.is_none() {
            self.ended_at_ms = Some(epoch_ms);
            self.outcome = Some(outcome);
        }
    }
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;
