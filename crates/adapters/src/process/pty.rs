// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY-backed process adapter.
//!
//! Spawns the subject inside a pseudo-terminal, forwards every byte window
//! it reads to the event channel, and runs a keepalive heartbeat that writes
//! a NUL sentinel to the subject's stdin.

use super::{
    ProcessAdapter, ProcessError, ProcessEvent, ProcessHandle, SpawnConfig, HEARTBEAT_SENTINEL,
    INTERRUPT_BYTE, SUBMISSION_BYTE,
};
use async_trait::async_trait;
use ov_core::TaskId;
use parking_lot::Mutex;
use portable_pty::{CommandBuilder, NativePtySystem, PtySize, PtySystem};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Maximum bytes of raw output retained per task.
const OUTPUT_RETENTION: usize = 256 * 1024;

/// Bounded accumulator for raw output.
struct OutputRing {
    buf: String,
}

impl OutputRing {
    fn new() -> Self {
        Self { buf: String::new() }
    }

    fn push(&mut self, bytes: &str) {
        self.buf.push_str(bytes);
        if self.buf.len() > OUTPUT_RETENTION {
            let excess = self.buf.len() - OUTPUT_RETENTION;
            // Trim at a char boundary at or after the excess point
            let cut = (excess..self.buf.len())
                .find(|i| self.buf.is_char_boundary(*i))
                .unwrap_or(0);
            self.buf.drain(..cut);
        }
    }
}

struct ProcInfo {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    output: Arc<Mutex<OutputRing>>,
    alive: Arc<AtomicBool>,
    killer: Mutex<Box<dyn portable_pty::ChildKiller + Send + Sync>>,
    heartbeat: tokio::task::JoinHandle<()>,
    /// Keeps the PTY pair open for the lifetime of the child
    _master: Mutex<Box<dyn portable_pty::MasterPty + Send>>,
}

/// Process adapter backed by a native pseudo-terminal.
#[derive(Clone, Default)]
pub struct PtyProcessAdapter {
    procs: Arc<Mutex<HashMap<TaskId, Arc<ProcInfo>>>>,
}

impl PtyProcessAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, task_id: &TaskId) -> Result<Arc<ProcInfo>, ProcessError> {
        self.procs
            .lock()
            .get(task_id)
            .cloned()
            .ok_or_else(|| ProcessError::NotFound(task_id.to_string()))
    }

    fn write_bytes(&self, task_id: &TaskId, bytes: &[u8]) -> Result<(), ProcessError> {
        let info = self.get(task_id)?;
        let mut writer = info.writer.lock();
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| ProcessError::WriteFailed(e.to_string()))
    }
}

#[async_trait]
impl ProcessAdapter for PtyProcessAdapter {
    async fn spawn(
        &self,
        config: SpawnConfig,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<ProcessHandle, ProcessError> {
        let task_id = config.task_id.clone();

        {
            let procs = self.procs.lock();
            if let Some(existing) = procs.get(&task_id) {
                if existing.alive.load(Ordering::SeqCst) {
                    return Err(ProcessError::AlreadyRunning(task_id.to_string()));
                }
            }
        }

        if let Some(ref cwd) = config.cwd {
            if !cwd.exists() {
                return Err(ProcessError::SpawnFailed(format!(
                    "working directory does not exist: {}",
                    cwd.display()
                )));
            }
        }

        let pty_system = NativePtySystem::default();
        let pair = pty_system
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&config.command);
        cmd.args(&config.args);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(ref cwd) = config.cwd {
            cmd.cwd(cwd);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;
        let writer = Arc::new(Mutex::new(writer));

        let output = Arc::new(Mutex::new(OutputRing::new()));
        let alive = Arc::new(AtomicBool::new(true));

        tracing::info!(%task_id, command = %config.command, ?pid, "subject process spawned");

        // Reader thread: forwards byte windows in order, then delivers the
        // single Exit event. Running read + wait on one thread guarantees no
        // Data is sent after Exit.
        {
            let task_id = task_id.clone();
            let event_tx = event_tx.clone();
            let output = Arc::clone(&output);
            let alive = Arc::clone(&alive);
            std::thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(n) if n > 0 => {
                            let bytes = String::from_utf8_lossy(&buf[..n]).into_owned();
                            output.lock().push(&bytes);
                            if event_tx
                                .blocking_send(ProcessEvent::Data {
                                    task_id: task_id.clone(),
                                    bytes,
                                })
                                .is_err()
                            {
                                break;
                            }
                        }
                        _ => break,
                    }
                }

                let exit_code = match child.wait() {
                    Ok(status) => Some(status.exit_code() as i32),
                    Err(e) => {
                        tracing::warn!(%task_id, error = %e, "wait for subject failed");
                        None
                    }
                };
                alive.store(false, Ordering::SeqCst);
                tracing::info!(%task_id, ?exit_code, "subject process exited");
                let _ = event_tx.blocking_send(ProcessEvent::Exit {
                    task_id,
                    exit_code,
                    signal: None,
                });
            });
        }

        // Keepalive heartbeat: writes the NUL sentinel so idle-timeout logic
        // in the subject never fires while we are still supervising it.
        let heartbeat = {
            let task_id = task_id.clone();
            let writer = Arc::clone(&writer);
            let alive = Arc::clone(&alive);
            let interval = config.heartbeat;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    if !alive.load(Ordering::SeqCst) {
                        break;
                    }
                    {
                        let mut writer = writer.lock();
                        if writer.write_all(&[HEARTBEAT_SENTINEL]).is_err() {
                            break;
                        }
                        let _ = writer.flush();
                    }
                    if event_tx
                        .send(ProcessEvent::Heartbeat {
                            task_id: task_id.clone(),
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            })
        };

        let info = Arc::new(ProcInfo {
            writer,
            output,
            alive,
            killer: Mutex::new(killer),
            heartbeat,
            _master: Mutex::new(pair.master),
        });
        self.procs.lock().insert(task_id.clone(), info);

        Ok(ProcessHandle { task_id, pid })
    }

    async fn send(&self, task_id: &TaskId, input: &str) -> Result<(), ProcessError> {
        self.write_bytes(task_id, input.as_bytes())
    }

    async fn send_interrupt(&self, task_id: &TaskId) -> Result<(), ProcessError> {
        self.write_bytes(task_id, &[INTERRUPT_BYTE])
    }

    async fn send_submission(&self, task_id: &TaskId) -> Result<(), ProcessError> {
        self.write_bytes(task_id, &[SUBMISSION_BYTE])
    }

    async fn kill(&self, task_id: &TaskId) -> Result<(), ProcessError> {
        let info = self.get(task_id)?;
        info.heartbeat.abort();
        if info.alive.load(Ordering::SeqCst) {
            info.killer
                .lock()
                .kill()
                .map_err(|e| ProcessError::KillFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_alive(&self, task_id: &TaskId) -> Result<bool, ProcessError> {
        let info = self.get(task_id)?;
        Ok(info.alive.load(Ordering::SeqCst))
    }

    async fn output(&self, task_id: &TaskId) -> Result<String, ProcessError> {
        let info = self.get(task_id)?;
        let output = info.output.lock();
        Ok(output.buf.clone())
    }
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
