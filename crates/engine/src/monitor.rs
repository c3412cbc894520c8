// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thought monitor: character-grained detection on a rolling buffer.
//!
//! Watches the subject's narration for planning language, research loops,
//! deferred-implementation markers and success signals, and runs the stall
//! detector. Detections for the same (pattern, match) pair are rate-limited
//! by a cooldown so repetitive output cannot amplify into intervention storms.

use ov_core::{Clock, RuleAction, Severity, TaskId};
use regex::Regex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default rolling buffer capacity in characters.
const BUFFER_CAPACITY: usize = 4096;

/// Context bytes attached to a stall detection.
const STALL_CONTEXT: usize = 200;

/// Repeated accesses of one file within the buffer window that count as a
/// research loop.
const RESEARCH_LOOP_THRESHOLD: usize = 4;

/// A detection produced by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub pattern_id: String,
    pub severity: Severity,
    pub action: RuleAction,
    pub matched: String,
    pub task_id: TaskId,
    /// Buffer tail around the detection (stall carries the last ~200 bytes)
    pub context: String,
}

struct MonitorPattern {
    id: &'static str,
    regex: Regex,
    severity: Severity,
    action: RuleAction,
}

/// Streaming detector for one task.
pub struct ThoughtMonitor<C: Clock> {
    task_id: TaskId,
    clock: C,
    buffer: String,
    line: String,
    stream_position: u64,
    last_activity: Instant,
    stall_after: Duration,
    stall_reported: bool,
    cooldown: Duration,
    last_emitted: HashMap<(String, String), Instant>,
    patterns: Vec<MonitorPattern>,
    file_access: Regex,
}

impl<C: Clock> ThoughtMonitor<C> {
    pub fn new(
        task_id: TaskId,
        clock: C,
        stall_after: Duration,
        cooldown: Duration,
    ) -> Result<Self, regex::Error> {
        let patterns = vec![
            MonitorPattern {
                id: "planning-language",
                regex: Regex::new(
                    r"(?i)\b(I would|I could|Let me plan|My strategy|we should consider|the approach would be)\b",
                )?,
                severity: Severity::Warning,
                action: RuleAction::Warn,
            },
            MonitorPattern {
                id: "research-loop",
                regex: Regex::new(r"(?i)\blet me check\b.*\bagain\b")?,
                severity: Severity::Warning,
                action: RuleAction::Redirect,
            },
            MonitorPattern {
                id: "todo-violation",
                regex: Regex::new(
                    r"\b(TODO|FIXME)\b|(?i)\b(implement(?:ed)? later|for now,? just|placeholder for|left as an exercise)\b",
                )?,
                severity: Severity::Error,
                action: RuleAction::Interrupt,
            },
            MonitorPattern {
                id: "success-signal",
                regex: Regex::new(
                    r"(?i)\b(file created|files? written|tests? passed|completed successfully|all checks pass)\b",
                )?,
                severity: Severity::Info,
                action: RuleAction::Log,
            },
        ];

        let last_activity = clock.now();
        Ok(Self {
            task_id,
            clock,
            buffer: String::with_capacity(BUFFER_CAPACITY),
            line: String::new(),
            stream_position: 0,
            last_activity,
            stall_after,
            stall_reported: false,
            cooldown,
            last_emitted: HashMap::new(),
            patterns,
            file_access: Regex::new(r"(?i)\b(?:Reading|Checking|Opening|Accessing)\s+([\w./-]+)")?,
        })
    }

    /// Total characters seen so far.
    pub fn stream_position(&self) -> u64 {
        self.stream_position
    }

    /// Process a chunk of output characters.
    pub fn process_chunk(&mut self, text: &str) -> Vec<Detection> {
        let mut detections = Vec::new();
        for c in text.chars() {
            if let Some(found) = self.process_char(c) {
                detections.extend(found);
            }
        }
        detections
    }

    /// Process a single character; line-based patterns fire on newline.
    pub fn process_char(&mut self, c: char) -> Option<Vec<Detection>> {
        if c == '\u{0}' {
            // Heartbeat sentinel is not activity and never enters the buffer
            return None;
        }

        self.stream_position += 1;
        self.last_activity = self.clock.now();
        self.stall_reported = false;

        self.buffer.push(c);
        if self.buffer.len() > BUFFER_CAPACITY {
            let excess = self.buffer.len() - BUFFER_CAPACITY;
            let cut = (excess..self.buffer.len())
                .find(|i| self.buffer.is_char_boundary(*i))
                .unwrap_or(0);
            self.buffer.drain(..cut);
        }

        if c != '\n' {
            self.line.push(c);
            return None;
        }

        let line = std::mem::take(&mut self.line);
        let detections = self.scan_line(&line);
        (!detections.is_empty()).then_some(detections)
    }

    fn scan_line(&mut self, line: &str) -> Vec<Detection> {
        let mut detections = Vec::new();

        for i in 0..self.patterns.len() {
            if let Some(matched) = self.patterns[i].regex.find(line) {
                let matched = matched.as_str().to_string();
                let (id, severity, action) = (
                    self.patterns[i].id.to_string(),
                    self.patterns[i].severity,
                    self.patterns[i].action,
                );
                if self.cooled_down(&id, &matched) {
                    detections.push(Detection {
                        pattern_id: id,
                        severity,
                        action,
                        matched,
                        task_id: self.task_id.clone(),
                        context: line.to_string(),
                    });
                }
            }
        }

        // Repeat-access tracking: the same file read over and over within
        // the buffer window is a research loop even without loop phrasing.
        if let Some(caps) = self.file_access.captures(line) {
            if let Some(file) = caps.get(1) {
                let file = file.as_str().to_string();
                let count = self.buffer.matches(&file).count();
                if count >= RESEARCH_LOOP_THRESHOLD
                    && self.cooled_down("research-loop-file", &file)
                {
                    detections.push(Detection {
                        pattern_id: "research-loop-file".to_string(),
                        severity: Severity::Warning,
                        action: RuleAction::Redirect,
                        matched: file,
                        task_id: self.task_id.clone(),
                        context: line.to_string(),
                    });
                }
            }
        }

        detections
    }

    /// Enforce the per-(pattern, match) cooldown and record the emission.
    fn cooled_down(&mut self, pattern_id: &str, matched: &str) -> bool {
        let key = (pattern_id.to_string(), matched.to_string());
        let now = self.clock.now();
        if let Some(last) = self.last_emitted.get(&key) {
            if now.duration_since(*last) < self.cooldown {
                return false;
            }
        }
        self.last_emitted.insert(key, now);
        true
    }

    /// Fire the stall detector if no byte arrived within the configured
    /// interval. Reports once per stall; new activity re-arms it.
    pub fn check_stall(&mut self) -> Option<Detection> {
        if self.stall_reported {
            return None;
        }
        let idle = self.clock.now().duration_since(self.last_activity);
        if idle < self.stall_after {
            return None;
        }
        self.stall_reported = true;

        let tail_start = self
            .buffer
            .len()
            .saturating_sub(STALL_CONTEXT);
        let cut = (tail_start..self.buffer.len())
            .find(|i| self.buffer.is_char_boundary(*i))
            .unwrap_or(self.buffer.len());

        Some(Detection {
            pattern_id: "stall".to_string(),
            severity: Severity::Critical,
            action: RuleAction::Interrupt,
            matched: format!("no activity for {}s", idle.as_secs()),
            task_id: self.task_id.clone(),
            context: self.buffer[cut..].to_string(),
        })
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
