// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use ov_adapters::{FakeProcessAdapter, FakeStep, ProcessCall};
use ov_core::{FakeClock, SupervisorConfig, TaskId};
use ov_engine::Supervisor;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub struct Fixture {
    pub supervisor: Supervisor<FakeProcessAdapter, FakeClock>,
    pub adapter: FakeProcessAdapter,
    pub clock: FakeClock,
    pub lines: Arc<Mutex<Vec<String>>>,
    _dir: tempfile::TempDir,
}

/// Supervisor over the fake adapter with fast ticks and a captured sink.
pub fn fixture(script: Vec<FakeStep>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SupervisorConfig::default();
    config.state_dir = dir.path().to_path_buf();
    config.tick_ms = 20;
    config.inject_delay_ms = 0;

    let adapter = FakeProcessAdapter::new().with_script(script);
    let clock = FakeClock::new();
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let lines = Arc::clone(&lines);
        move |line: &str| lines.lock().push(line.to_string())
    };
    let supervisor =
        Supervisor::with_output_sink(config, adapter.clone(), clock.clone(), sink).unwrap();

    Fixture {
        supervisor,
        adapter,
        clock,
        lines,
        _dir: dir,
    }
}

/// Script for a subject that creates one file and exits cleanly.
pub fn creates_file_script(path: &str) -> Vec<FakeStep> {
    vec![
        FakeStep::Chunk(format!("Created {path}\n")),
        FakeStep::Exit(0),
    ]
}

/// Poll until the condition holds (virtual time friendly).
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within the polling window");
}

/// Whether the subject process for a task has been spawned.
pub fn spawned(adapter: &FakeProcessAdapter, task_id: &TaskId) -> bool {
    adapter
        .calls()
        .iter()
        .any(|c| matches!(c, ProcessCall::Spawn { task_id: id, .. } if id == task_id))
}
