// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream parser: raw PTY bytes to typed stream events.
//!
//! Tracks code fences across chunk boundaries so a block split over many
//! reads is still attached, whole, to the closing-fence event. The keepalive
//! sentinel is stripped before buffering, so heartbeat bytes can never appear
//! inside a code-block payload.

use ov_core::Clock;
use regex::Regex;
use std::collections::HashMap;

/// Kind of a parsed stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEventKind {
    TaskStarted,
    TaskCompleted,
    CodeBlock,
    FileCreated,
    FileModified,
    CommandExecuted,
    ErrorOccurred,
    OutputChunk,
}

/// A typed event extracted from the subject's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub timestamp: String,
    pub content: String,
    pub metadata: HashMap<String, String>,
}

impl StreamEvent {
    fn new(kind: StreamEventKind, timestamp: String, content: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp,
            content: content.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Line signatures for file, command and error detection.
struct Signatures {
    file_created: Regex,
    file_modified: Regex,
    command: Regex,
    error: Regex,
}

impl Signatures {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            file_created: Regex::new(
                r"(?i)\b(?:created?|creating|wrote|writing|saved)\b[^\n]*?([\w./-]+\.\w{1,8})",
            )?,
            file_modified: Regex::new(
                r"(?i)\b(?:modif(?:y|ied|ying)|updated?|updating|edit(?:ed|ing))\b[^\n]*?([\w./-]+\.\w{1,8})",
            )?,
            command: Regex::new(r"(?i)^\s*(?:\$\s+|>\s+|running[: ]\s*|executing[: ]\s*)(.+)$")?,
            error: Regex::new(r"(?i)\b(?:error|exception|panic|failure|failed)\b")?,
        })
    }
}

/// Stateful parser over one subject's output stream.
pub struct StreamParser<C: Clock> {
    clock: C,
    signatures: Signatures,
    /// Pending bytes up to the last unterminated line
    buffer: String,
    in_code_block: bool,
    code_language: Option<String>,
    code_buffer: String,
}

impl<C: Clock> StreamParser<C> {
    pub fn new(clock: C) -> Result<Self, regex::Error> {
        Ok(Self {
            clock,
            signatures: Signatures::compile()?,
            buffer: String::new(),
            in_code_block: false,
            code_language: None,
            code_buffer: String::new(),
        })
    }

    /// Feed a raw byte window; returns the events completed by it.
    pub fn feed(&mut self, bytes: &str) -> Vec<StreamEvent> {
        // Heartbeat sentinel never reaches the line buffer
        if bytes.contains('\u{0}') {
            self.buffer.push_str(&bytes.replace('\u{0}', ""));
        } else {
            self.buffer.push_str(bytes);
        }

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Whether the parser is currently inside an open code fence.
    pub fn in_code_block(&self) -> bool {
        self.in_code_block
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            if self.in_code_block {
                // Closing fence: attach the buffered block
                let mut event = StreamEvent::new(
                    StreamEventKind::CodeBlock,
                    self.clock.iso_now(),
                    std::mem::take(&mut self.code_buffer),
                );
                if let Some(language) = self.code_language.take() {
                    event.metadata.insert("language".to_string(), language);
                }
                self.in_code_block = false;
                return Some(event);
            }
            self.in_code_block = true;
            let language = trimmed.trim_start_matches('`').trim();
            self.code_language = (!language.is_empty()).then(|| language.to_string());
            return None;
        }

        if self.in_code_block {
            self.code_buffer.push_str(line);
            self.code_buffer.push('\n');
            return None;
        }

        if trimmed.is_empty() {
            return None;
        }

        let ts = self.clock.iso_now();

        if trimmed.contains("TASK_STARTED") {
            return Some(StreamEvent::new(StreamEventKind::TaskStarted, ts, trimmed));
        }
        if trimmed.contains("TASK_COMPLETED") {
            return Some(StreamEvent::new(StreamEventKind::TaskCompleted, ts, trimmed));
        }

        if let Some(caps) = self.signatures.file_created.captures(trimmed) {
            let mut event = StreamEvent::new(StreamEventKind::FileCreated, ts, trimmed);
            if let Some(path) = caps.get(1) {
                event
                    .metadata
                    .insert("path".to_string(), path.as_str().to_string());
            }
            return Some(event);
        }
        if let Some(caps) = self.signatures.file_modified.captures(trimmed) {
            let mut event = StreamEvent::new(StreamEventKind::FileModified, ts, trimmed);
            if let Some(path) = caps.get(1) {
                event
                    .metadata
                    .insert("path".to_string(), path.as_str().to_string());
            }
            return Some(event);
        }
        if let Some(caps) = self.signatures.command.captures(trimmed) {
            let mut event = StreamEvent::new(StreamEventKind::CommandExecuted, ts, trimmed);
            if let Some(cmd) = caps.get(1) {
                event
                    .metadata
                    .insert("command".to_string(), cmd.as_str().trim().to_string());
            }
            return Some(event);
        }
        if self.signatures.error.is_match(trimmed) {
            return Some(StreamEvent::new(StreamEventKind::ErrorOccurred, ts, trimmed));
        }

        Some(StreamEvent::new(StreamEventKind::OutputChunk, ts, trimmed))
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
