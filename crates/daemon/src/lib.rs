// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Overseer daemon library: the observer WebSocket channel and its wire
//! protocol. The `ovd` binary wires these around the supervision engine.

pub mod observer;
pub mod protocol;

pub use observer::Observer;
pub use protocol::{ClientMessage, Envelope, EnvelopeKind};
