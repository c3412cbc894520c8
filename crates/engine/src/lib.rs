// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ov-engine: the Overseer supervision engine.
//!
//! Wires the stream parser, rule engine, thought monitor, intervention
//! controller, phase controller, aggregator and worker pool into a closed
//! loop around subject processes.

pub mod aggregator;
pub mod error;
pub mod hooks;
pub mod intervention;
pub mod monitor;
pub mod phase;
pub mod pool;
pub mod queue;
pub mod rules;
pub mod stream;
pub mod supervisor;
pub mod verify;

pub use aggregator::{AggregatorStats, ChildComplete, StreamAggregator};
pub use error::EngineError;
pub use hooks::{HookInput, HookOrchestrator, HookPoint, HookVerdict};
pub use intervention::{InterventionConfig, InterventionController, PendingApproval};
pub use monitor::{Detection, ThoughtMonitor};
pub use phase::{PhaseController, PhasePlan, PhaseTransition, ToolGate};
pub use pool::{PoolConfig, PoolEvent, WorkerPool};
pub use queue::{PortAllocator, PriorityQueue};
pub use rules::RuleEngine;
pub use stream::{StreamEvent, StreamEventKind, StreamParser};
pub use supervisor::Supervisor;
pub use verify::VerificationEngine;
