// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type and its mapping onto the surfaced error kinds.

use ov_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur in the supervision engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("admission rejected: {0}")]
    Validation(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("process error: {0}")]
    Process(#[from] ov_adapters::ProcessError),
    #[error("ledger error: {0}")]
    Ledger(#[from] ov_storage::LedgerError),
    #[error("storage error: {0}")]
    Storage(#[from] ov_storage::StoreError),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The error kind surfaced to callers and recorded on failed tasks.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Spawn(_) => ErrorKind::Spawn,
            EngineError::Process(_) => ErrorKind::Io,
            EngineError::Ledger(_) | EngineError::Storage(_) => ErrorKind::Persistence,
            EngineError::Pattern(_) | EngineError::Internal(_) => ErrorKind::Internal,
            EngineError::TaskNotFound(_) => ErrorKind::Validation,
            EngineError::Protocol(_) => ErrorKind::Protocol,
        }
    }
}
