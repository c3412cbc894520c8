// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake process adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ProcessAdapter, ProcessError, ProcessEvent, ProcessHandle, SpawnConfig};
use async_trait::async_trait;
use ov_core::TaskId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCall {
    Spawn {
        task_id: TaskId,
        command: String,
        args: Vec<String>,
    },
    Send {
        task_id: TaskId,
        input: String,
    },
    Interrupt {
        task_id: TaskId,
    },
    Submission {
        task_id: TaskId,
    },
    Kill {
        task_id: TaskId,
    },
}

/// One step of a scripted subject process
#[derive(Debug, Clone)]
pub enum FakeStep {
    /// Emit a raw output window
    Chunk(String),
    /// Emit the exit event with the given code
    Exit(i32),
}

struct FakeProc {
    event_tx: mpsc::Sender<ProcessEvent>,
    alive: bool,
    output: String,
}

struct FakeState {
    script: Vec<FakeStep>,
    procs: HashMap<TaskId, FakeProc>,
    calls: Vec<ProcessCall>,
    fail_next_spawn: u32,
}

/// Fake process adapter: scripted output, recorded calls, controllable exit.
#[derive(Clone)]
pub struct FakeProcessAdapter {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeProcessAdapter {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                script: Vec::new(),
                procs: HashMap::new(),
                calls: Vec::new(),
                fail_next_spawn: 0,
            })),
        }
    }
}

impl FakeProcessAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script replayed for every subsequent spawn.
    pub fn with_script(self, script: Vec<FakeStep>) -> Self {
        self.inner.lock().script = script;
        self
    }

    /// Make the next `count` spawns fail (spawn-retry testing).
    pub fn fail_spawns(&self, count: u32) {
        self.inner.lock().fail_next_spawn = count;
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ProcessCall> {
        self.inner.lock().calls.clone()
    }

    /// Inputs sent to one task, in order.
    pub fn sent_inputs(&self, task_id: &TaskId) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ProcessCall::Send { task_id: id, input } if id == task_id => Some(input.clone()),
                _ => None,
            })
            .collect()
    }

    /// Emit an output window for a running task.
    pub async fn emit_chunk(&self, task_id: &TaskId, bytes: &str) {
        let event_tx = {
            let mut inner = self.inner.lock();
            let Some(proc) = inner.procs.get_mut(task_id) else {
                return;
            };
            proc.output.push_str(bytes);
            proc.event_tx.clone()
        };
        let _ = event_tx
            .send(ProcessEvent::Data {
                task_id: task_id.clone(),
                bytes: bytes.to_string(),
            })
            .await;
    }

    /// Emit the exit event for a running task.
    pub async fn emit_exit(&self, task_id: &TaskId, exit_code: i32) {
        let event_tx = {
            let mut inner = self.inner.lock();
            let Some(proc) = inner.procs.get_mut(task_id) else {
                return;
            };
            if !proc.alive {
                return;
            }
            proc.alive = false;
            proc.event_tx.clone()
        };
        let _ = event_tx
            .send(ProcessEvent::Exit {
                task_id: task_id.clone(),
                exit_code: Some(exit_code),
                signal: None,
            })
            .await;
    }
}

#[async_trait]
impl ProcessAdapter for FakeProcessAdapter {
    async fn spawn(
        &self,
        config: SpawnConfig,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<ProcessHandle, ProcessError> {
        let script = {
            let mut inner = self.inner.lock();

            inner.calls.push(ProcessCall::Spawn {
                task_id: config.task_id.clone(),
                command: config.command.clone(),
                args: config.args.clone(),
            });

            if inner.fail_next_spawn > 0 {
                inner.fail_next_spawn -= 1;
                return Err(ProcessError::SpawnFailed("scripted spawn failure".into()));
            }

            if inner
                .procs
                .get(&config.task_id)
                .is_some_and(|p| p.alive)
            {
                return Err(ProcessError::AlreadyRunning(config.task_id.to_string()));
            }

            inner.procs.insert(
                config.task_id.clone(),
                FakeProc {
                    event_tx: event_tx.clone(),
                    alive: true,
                    output: String::new(),
                },
            );

            inner.script.clone()
        };

        // Replay the script in the background, the way a real subject would
        // produce output after spawn returns.
        let adapter = self.clone();
        let task_id = config.task_id.clone();
        tokio::spawn(async move {
            for step in script {
                match step {
                    FakeStep::Chunk(bytes) => adapter.emit_chunk(&task_id, &bytes).await,
                    FakeStep::Exit(code) => adapter.emit_exit(&task_id, code).await,
                }
            }
        });

        Ok(ProcessHandle {
            task_id: config.task_id,
            pid: None,
        })
    }

    async fn send(&self, task_id: &TaskId, input: &str) -> Result<(), ProcessError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProcessCall::Send {
            task_id: task_id.clone(),
            input: input.to_string(),
        });
        if !inner.procs.contains_key(task_id) {
            return Err(ProcessError::NotFound(task_id.to_string()));
        }
        Ok(())
    }

    async fn send_interrupt(&self, task_id: &TaskId) -> Result<(), ProcessError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProcessCall::Interrupt {
            task_id: task_id.clone(),
        });
        if !inner.procs.contains_key(task_id) {
            return Err(ProcessError::NotFound(task_id.to_string()));
        }
        Ok(())
    }

    async fn send_submission(&self, task_id: &TaskId) -> Result<(), ProcessError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProcessCall::Submission {
            task_id: task_id.clone(),
        });
        if !inner.procs.contains_key(task_id) {
            return Err(ProcessError::NotFound(task_id.to_string()));
        }
        Ok(())
    }

    async fn kill(&self, task_id: &TaskId) -> Result<(), ProcessError> {
        {
            let mut inner = self.inner.lock();
            inner.calls.push(ProcessCall::Kill {
                task_id: task_id.clone(),
            });
            if !inner.procs.contains_key(task_id) {
                return Err(ProcessError::NotFound(task_id.to_string()));
            }
        }
        // A killed subject exits like a real one: via the event channel
        self.emit_exit(task_id, 137).await;
        Ok(())
    }

    async fn is_alive(&self, task_id: &TaskId) -> Result<bool, ProcessError> {
        let inner = self.inner.lock();
        Ok(inner.procs.get(task_id).is_some_and(|p| p.alive))
    }

    async fn output(&self, task_id: &TaskId) -> Result<String, ProcessError> {
        let inner = self.inner.lock();
        inner
            .procs
            .get(task_id)
            .map(|p| p.output.clone())
            .ok_or_else(|| ProcessError::NotFound(task_id.to_string()))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
