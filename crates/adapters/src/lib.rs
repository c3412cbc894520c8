// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Process adapters for Overseer.
//!
//! The engine supervises subject processes through the [`ProcessAdapter`]
//! trait; the production implementation attaches a pseudo-terminal so the
//! subject buffers output line-by-line with echo semantics.

pub mod env;
pub mod process;

pub use process::{
    ProcessAdapter, ProcessError, ProcessEvent, ProcessHandle, PtyProcessAdapter, SpawnConfig,
    HEARTBEAT_SENTINEL, INTERRUPT_BYTE, SUBMISSION_BYTE,
};

#[cfg(any(test, feature = "test-support"))]
pub use process::{FakeProcessAdapter, FakeStep, ProcessCall};
