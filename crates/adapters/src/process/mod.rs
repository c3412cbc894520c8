// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subject-process management.
//!
//! The [`ProcessAdapter`] trait hides how the subject process is attached.
//! Control bytes are implementation constants, not part of the engine
//! contract: the controller asks for "interrupt" or "submission" and the
//! adapter writes the right bytes.

mod pty;

pub use pty::PtyProcessAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcessAdapter, FakeStep, ProcessCall};

use async_trait::async_trait;
use ov_core::TaskId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// In-band escape the subject's runtime treats as "stop generating".
pub const INTERRUPT_BYTE: u8 = 0x1b;

/// Submission sequence, distinct from newlines embedded in injected text.
pub const SUBMISSION_BYTE: u8 = 0x0d;

/// Keepalive byte written to the subject to defeat idle timeouts. NUL is
/// invisible in terminal output, so it never shows up in parsed streams.
pub const HEARTBEAT_SENTINEL: u8 = 0x00;

/// Errors from process operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process not found: {0}")]
    NotFound(String),
    #[error("process already running: {0}")]
    AlreadyRunning(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("kill failed: {0}")]
    KillFailed(String),
}

/// Configuration for spawning a subject process
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub task_id: TaskId,
    /// Binary to execute
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// PTY dimensions
    pub rows: u16,
    pub cols: u16,
    /// Keepalive heartbeat interval
    pub heartbeat: Duration,
}

impl SpawnConfig {
    pub fn new(task_id: TaskId, command: impl Into<String>) -> Self {
        Self {
            task_id,
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            rows: 24,
            cols: 80,
            heartbeat: Duration::from_secs(180),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

/// Events emitted for a supervised process.
///
/// `Exit` is emitted exactly once and no `Data` follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Raw PTY byte window, in read order, nothing dropped
    Data { task_id: TaskId, bytes: String },
    /// The keepalive fired
    Heartbeat { task_id: TaskId },
    /// The subject process ended
    Exit {
        task_id: TaskId,
        exit_code: Option<i32>,
        signal: Option<i32>,
    },
}

impl ProcessEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            ProcessEvent::Data { task_id, .. }
            | ProcessEvent::Heartbeat { task_id }
            | ProcessEvent::Exit { task_id, .. } => task_id,
        }
    }
}

/// Handle to a spawned process
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub task_id: TaskId,
    /// OS process id when known
    pub pid: Option<u32>,
}

/// Adapter for supervising subject processes
#[async_trait]
pub trait ProcessAdapter: Clone + Send + Sync + 'static {
    /// Spawn a subject process for a task.
    ///
    /// Process events are delivered to `event_tx` in read order. Exactly one
    /// live process per task id; a second spawn is a precondition failure.
    async fn spawn(
        &self,
        config: SpawnConfig,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<ProcessHandle, ProcessError>;

    /// Write bytes to the subject's stdin. Safe to call from event handlers.
    async fn send(&self, task_id: &TaskId, input: &str) -> Result<(), ProcessError>;

    /// Write the in-band interrupt escape.
    async fn send_interrupt(&self, task_id: &TaskId) -> Result<(), ProcessError>;

    /// Write the submission sequence.
    async fn send_submission(&self, task_id: &TaskId) -> Result<(), ProcessError>;

    /// Terminate the subject and stop its timers.
    async fn kill(&self, task_id: &TaskId) -> Result<(), ProcessError>;

    /// Whether the subject process is still running.
    async fn is_alive(&self, task_id: &TaskId) -> Result<bool, ProcessError>;

    /// Accumulated raw output, bounded to the retention window.
    async fn output(&self, task_id: &TaskId) -> Result<String, ProcessError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
