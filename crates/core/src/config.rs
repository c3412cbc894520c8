// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor configuration, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Detector for interactive confirmation prompts the controller answers
/// automatically. All `contains` fragments must be present in the recent
/// stream window for `response` to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoApprovePattern {
    pub contains: Vec<String>,
    pub response: String,
}

impl AutoApprovePattern {
    /// The stock detector for file-creation confirmation prompts.
    pub fn create_file_default() -> Self {
        Self {
            contains: vec!["Do you want to create".to_string(), "1. Yes".to_string()],
            response: "1\n".to_string(),
        }
    }
}

fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_heartbeat_secs() -> u64 {
    180
}

fn default_stall_secs() -> u64 {
    30
}

fn default_cooldown_ms() -> u64 {
    5_000
}

fn default_observer_port() -> u16 {
    8080
}

fn default_task_timeout_secs() -> u64 {
    600
}

fn default_inject_delay_ms() -> u64 {
    75
}

fn default_auto_approve() -> bool {
    true
}

fn default_auto_approve_patterns() -> Vec<AutoApprovePattern> {
    vec![AutoApprovePattern::create_file_default()]
}

fn default_sensitive_operations() -> Vec<String> {
    vec![
        "delete".to_string(),
        "deploy".to_string(),
        "publish".to_string(),
        "push".to_string(),
    ]
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".overseer")
}

fn default_subject_command() -> String {
    "claude".to_string()
}

fn default_tick_ms() -> u64 {
    500
}

/// Runtime configuration for the supervision engine and daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Bounded worker pool size
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Heartbeat interval for the PTY keepalive
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Stall detector interval
    #[serde(default = "default_stall_secs")]
    pub stall_secs: u64,
    /// Detection cooldown per (rule, match) pair
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Observer WebSocket port
    #[serde(default = "default_observer_port")]
    pub observer_port: u16,
    /// Default task deadline when the submission carries none
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Inter-chunk delay when injecting remediation text
    #[serde(default = "default_inject_delay_ms")]
    pub inject_delay_ms: u64,
    /// Whether the confirmation-prompt responder is active
    #[serde(default = "default_auto_approve")]
    pub auto_approve: bool,
    #[serde(default = "default_auto_approve_patterns")]
    pub auto_approve_patterns: Vec<AutoApprovePattern>,
    /// Operation names that require explicit approval
    #[serde(default = "default_sensitive_operations")]
    pub sensitive_operations: Vec<String>,
    /// Root directory for the ledger, database and logs
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Subject process binary (the supervised LLM CLI)
    #[serde(default = "default_subject_command")]
    pub subject_command: String,
    /// Arguments passed before the prompt
    #[serde(default)]
    pub subject_args: Vec<String>,
    /// Supervision tick driving stall, deadline and budget checks
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            heartbeat_secs: default_heartbeat_secs(),
            stall_secs: default_stall_secs(),
            cooldown_ms: default_cooldown_ms(),
            observer_port: default_observer_port(),
            task_timeout_secs: default_task_timeout_secs(),
            inject_delay_ms: default_inject_delay_ms(),
            auto_approve: default_auto_approve(),
            auto_approve_patterns: default_auto_approve_patterns(),
            sensitive_operations: default_sensitive_operations(),
            state_dir: default_state_dir(),
            subject_command: default_subject_command(),
            subject_args: Vec::new(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl SupervisorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join("ledger.jsonl")
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("conversations.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.state_dir.join("workspace")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
