// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream aggregator: merges many child streams into one ordered output.
//!
//! Each attached child gets an 8-character short id and a palette color.
//! Partial lines buffer until their newline arrives, so interleaved children
//! never tear each other's lines.

use ov_core::{Clock, ShortId, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::IsTerminal;

/// ANSI-256 palette cycled across children.
const PALETTE: [u8; 8] = [74, 150, 179, 176, 68, 114, 167, 109];

const COLOR_RESET: &str = "\x1b[0m";

/// Whether the aggregated output should carry ANSI colors.
///
/// `NO_COLOR=1` always wins and `COLOR=1` forces color on; with neither set,
/// a terminal gets color and a pipe gets plain text.
pub fn should_colorize() -> bool {
    if std::env::var("NO_COLOR").as_deref() == Ok("1") {
        return false;
    }
    std::env::var("COLOR").as_deref() == Ok("1") || std::io::stdout().is_terminal()
}

/// Per-child counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildMetrics {
    pub bytes: u64,
    pub lines: u64,
    pub interventions: u64,
    pub last_activity_ms: u64,
    pub started_ms: u64,
}

/// Emitted when a child detaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildComplete {
    pub task_id: TaskId,
    pub short_id: String,
    pub duration_ms: u64,
    pub lines: u64,
    pub interventions: u64,
}

/// Totals across all children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub active: usize,
    pub total_bytes: u64,
    pub total_lines: u64,
    pub total_interventions: u64,
}

struct Child {
    short_id: String,
    color: u8,
    partial: String,
    metrics: ChildMetrics,
}

type LineSink = Box<dyn Fn(&str) + Send + Sync>;

/// Multiplexes child output into a single prefixed stream.
pub struct StreamAggregator<C: Clock> {
    clock: C,
    colorize: bool,
    children: Mutex<HashMap<TaskId, Child>>,
    next_color: Mutex<usize>,
    totals: Mutex<AggregatorStats>,
    sink: LineSink,
}

impl<C: Clock> StreamAggregator<C> {
    /// Aggregator writing completed lines to `sink`.
    pub fn new<F>(clock: C, colorize: bool, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            clock,
            colorize,
            children: Mutex::new(HashMap::new()),
            next_color: Mutex::new(0),
            totals: Mutex::new(AggregatorStats::default()),
            sink: Box::new(sink),
        }
    }

    /// Attach a child stream; returns its short id.
    pub fn attach(&self, task_id: &TaskId) -> String {
        let short_id = task_id.short(8).to_string();
        let color = {
            let mut next = self.next_color.lock();
            let color = PALETTE[*next % PALETTE.len()];
            *next += 1;
            color
        };
        let now = self.clock.epoch_ms();
        self.children.lock().insert(
            task_id.clone(),
            Child {
                short_id: short_id.clone(),
                color,
                partial: String::new(),
                metrics: ChildMetrics {
                    started_ms: now,
                    last_activity_ms: now,
                    ..ChildMetrics::default()
                },
            },
        );
        self.totals.lock().active += 1;
        short_id
    }

    /// Feed raw bytes from one child; completed lines go to the sink.
    pub fn push(&self, task_id: &TaskId, bytes: &str) {
        let mut lines = Vec::new();
        {
            let mut children = self.children.lock();
            let Some(child) = children.get_mut(task_id) else {
                return;
            };
            child.metrics.bytes += bytes.len() as u64;
            child.metrics.last_activity_ms = self.clock.epoch_ms();
            child.partial.push_str(bytes);
            while let Some(pos) = child.partial.find('\n') {
                let line: String = child.partial.drain(..=pos).collect();
                let line = line.trim_end_matches(['\n', '\r']);
                child.metrics.lines += 1;
                lines.push(self.format_line(child, line));
            }
        }
        {
            let mut totals = self.totals.lock();
            totals.total_bytes += bytes.len() as u64;
            totals.total_lines += lines.len() as u64;
        }
        for line in lines {
            (self.sink)(&line);
        }
    }

    fn format_line(&self, child: &Child, line: &str) -> String {
        if self.colorize {
            format!(
                "\x1b[38;5;{}m[{}]{} {}",
                child.color, child.short_id, COLOR_RESET, line
            )
        } else {
            format!("[{}] {}", child.short_id, line)
        }
    }

    /// Count an intervention against a child.
    pub fn record_intervention(&self, task_id: &TaskId) {
        if let Some(child) = self.children.lock().get_mut(task_id) {
            child.metrics.interventions += 1;
            self.totals.lock().total_interventions += 1;
        }
    }

    /// Metrics snapshot for one child.
    pub fn metrics(&self, task_id: &TaskId) -> Option<ChildMetrics> {
        self.children
            .lock()
            .get(task_id)
            .map(|c| c.metrics.clone())
    }

    /// Detach a child, flushing any unterminated line.
    pub fn complete(&self, task_id: &TaskId) -> Option<ChildComplete> {
        let child = self.children.lock().remove(task_id)?;
        if !child.partial.is_empty() {
            (self.sink)(&self.format_line(&child, &child.partial));
        }
        {
            let mut totals = self.totals.lock();
            totals.active = totals.active.saturating_sub(1);
        }
        Some(ChildComplete {
            task_id: task_id.clone(),
            short_id: child.short_id,
            duration_ms: self
                .clock
                .epoch_ms()
                .saturating_sub(child.metrics.started_ms),
            lines: child.metrics.lines,
            interventions: child.metrics.interventions,
        })
    }

    /// Global totals.
    pub fn stats(&self) -> AggregatorStats {
        self.totals.lock().clone()
    }
}

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod tests;
