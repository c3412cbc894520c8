// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer channel wire protocol.
//!
//! One JSON envelope per WebSocket text frame. Field names are camelCase on
//! the wire (`taskId`, `workerId`) to match the external observer clients.

use serde::{Deserialize, Serialize};

/// Envelope type tags for server-to-client messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Stream,
    TaskUpdate,
    Verification,
    Intervention,
    Error,
    System,
}

/// Server-to-client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(rename = "taskId", default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(rename = "workerId", default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub data: serde_json::Value,
    pub timestamp: String,
}

impl Envelope {
    pub fn new(kind: EnvelopeKind, data: serde_json::Value, timestamp: String) -> Self {
        Self {
            kind,
            task_id: None,
            worker_id: None,
            data,
            timestamp,
        }
    }

    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"type\":\"error\",\"data\":\"encode failure: {}\",\"timestamp\":\"\"}}",
                e
            )
        })
    }
}

/// Client-to-server message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Inject text into a running task
    Intervene {
        #[serde(rename = "taskId")]
        task_id: String,
        prompt: String,
    },
    /// Reserved: narrow the event stream
    Subscribe,
    /// Liveness probe
    Ping,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
