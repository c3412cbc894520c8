// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor: the mediator wiring admission, the pool, the ledger, the
//! store and the intervention controller together.
//!
//! Outer layers (the observer channel, the tool host) talk to the
//! supervisor only; they never reach the controller or the adapters
//! directly.

use crate::aggregator::{should_colorize, AggregatorStats, StreamAggregator};
use crate::error::EngineError;
use crate::hooks::HookOrchestrator;
use crate::intervention::{InterventionConfig, InterventionController};
use crate::pool::{PoolConfig, PoolDeps, PoolEvent, WorkerPool};
use crate::rules::RuleEngine;
use crate::verify::VerificationEngine;
use ov_adapters::ProcessAdapter;
use ov_core::{
    Action, ActionId, ActionKind, Clock, ConversationId, Event, SubmitOptions, SupervisorConfig,
    Task, TaskId, TaskResult, UuidIdGen, VerificationReport, WorkerId,
};
use ov_core::IdGen;
use ov_storage::{ConversationStore, Ledger, LedgerStats, StoreStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Combined counters for status queries.
#[derive(Debug, Clone)]
pub struct SupervisorStats {
    pub ledger: LedgerStats,
    pub store: StoreStats,
    pub aggregator: AggregatorStats,
}

/// Top-level handle over the supervision engine.
pub struct Supervisor<P: ProcessAdapter, C: Clock> {
    config: SupervisorConfig,
    ledger: Arc<Ledger<C>>,
    store: Arc<ConversationStore>,
    rules: Arc<RuleEngine<C>>,
    hooks: Arc<HookOrchestrator>,
    controller: Arc<InterventionController<P>>,
    pool: Arc<WorkerPool<P, C>>,
    verifier: VerificationEngine,
}

impl<P: ProcessAdapter, C: Clock> Supervisor<P, C> {
    /// Build a supervisor with aggregated output going to stdout.
    pub fn new(config: SupervisorConfig, adapter: P, clock: C) -> Result<Self, EngineError> {
        Self::with_output_sink(config, adapter, clock, |line| println!("{}", line))
    }

    /// Build a supervisor with a custom aggregated-output sink.
    pub fn with_output_sink<F>(
        config: SupervisorConfig,
        adapter: P,
        clock: C,
        sink: F,
    ) -> Result<Self, EngineError>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let ledger = Arc::new(Ledger::open(&config.ledger_path(), clock.clone())?);
        let store = Arc::new(ConversationStore::open(&config.db_path())?);
        let rules = Arc::new(RuleEngine::with_builtins(clock.clone())?);
        let hooks = Arc::new(HookOrchestrator::with_admission_validator()?);
        let aggregator = Arc::new(StreamAggregator::new(
            clock.clone(),
            should_colorize(),
            sink,
        ));

        let (controller_tx, controller_rx) = mpsc::channel(256);
        let controller = InterventionController::new(
            adapter.clone(),
            InterventionConfig::from(&config),
            controller_tx,
        );

        Self::spawn_controller_forwarder(
            controller_rx,
            Arc::clone(&ledger),
            Arc::clone(&store),
            clock.clone(),
        );

        let pool = WorkerPool::new(
            adapter,
            clock,
            PoolConfig::from(&config),
            PoolDeps {
                ledger: Arc::clone(&ledger),
                store: Arc::clone(&store),
                rules: Arc::clone(&rules),
                hooks: Arc::clone(&hooks),
                controller: Arc::clone(&controller),
                aggregator,
            },
        )?;

        let verifier = VerificationEngine::new(Arc::clone(&store))?;

        Ok(Self {
            config,
            ledger,
            store,
            rules,
            hooks,
            controller,
            pool,
            verifier,
        })
    }

    /// Route controller-originated events into the ledger and the store.
    fn spawn_controller_forwarder(
        mut rx: mpsc::Receiver<Event>,
        ledger: Arc<Ledger<C>>,
        store: Arc<ConversationStore>,
        clock: C,
    ) {
        let worker_id = WorkerId::new("controller");
        let idgen = UuidIdGen;
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                ledger.log(&worker_id, event.clone());
                if let Event::InterventionSent { task_id, message } = &event {
                    let action = Action::new(
                        ActionId::new(idgen.next()),
                        ConversationId::new(task_id.as_str()),
                        ActionKind::Intervention,
                        message.as_str(),
                        clock.iso_now(),
                    );
                    if let Err(e) = store.log_action(&action) {
                        tracing::warn!(%task_id, error = %e, "intervention persistence failed");
                    }
                }
            }
        });
    }

    /// Admit a task. Returns synchronously with the task id; results stream
    /// through [`Supervisor::events`].
    pub fn submit(&self, prompt: &str, options: SubmitOptions) -> Result<TaskId, EngineError> {
        self.pool.submit_task(prompt, options)
    }

    /// Inject observer-provided text into a running task.
    pub async fn intervene(&self, task_id: &TaskId, text: &str) -> Result<(), EngineError> {
        self.pool.intervene(task_id, text).await
    }

    /// Abort a task. Idempotent; the reason is reported verbatim.
    pub async fn abort(&self, task_id: &TaskId, reason: &str) -> Result<(), EngineError> {
        self.pool.abort(task_id, reason).await
    }

    /// Pause interventions for a task (reads continue).
    pub async fn pause(&self, task_id: &TaskId, reason: &str) -> Result<(), EngineError> {
        self.controller.pause(task_id, reason).await
    }

    /// Resume a paused task and drain queued injections.
    pub async fn resume(&self, task_id: &TaskId) -> Result<(), EngineError> {
        self.controller.resume(task_id).await
    }

    /// Resolve a pending approval.
    pub async fn approve(
        &self,
        task_id: &TaskId,
        op_id: &str,
        approved: bool,
        modifications: Option<&str>,
    ) -> Result<(), EngineError> {
        self.controller
            .approve(task_id, op_id, approved, modifications)
            .await
    }

    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.pool.task(task_id)
    }

    /// Subscribe to pool events (streams, completions, tool invocations).
    pub fn events(&self) -> broadcast::Receiver<PoolEvent> {
        self.pool.subscribe()
    }

    /// Wait for a task's final result.
    pub async fn wait(
        &self,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<TaskResult, EngineError> {
        self.pool.wait_result(task_id, timeout).await
    }

    /// Offline verification of one conversation.
    pub fn verify(&self, id: &ConversationId) -> Result<VerificationReport, EngineError> {
        self.verifier.verify(id)
    }

    /// Offline verification of a conversation and all descendants.
    pub fn verify_tree(&self, id: &ConversationId) -> Result<VerificationReport, EngineError> {
        self.verifier.verify_tree(id)
    }

    /// Observer port for an agent (idempotent per agent id).
    pub fn allocate_port(&self, agent_id: &str, parent_agent_id: Option<&str>) -> u16 {
        self.pool.allocate_port(agent_id, parent_agent_id)
    }

    pub fn stats(&self) -> Result<SupervisorStats, EngineError> {
        Ok(SupervisorStats {
            ledger: self.ledger.stats(),
            store: self.store.stats()?,
            aggregator: self.pool_aggregator_stats(),
        })
    }

    fn pool_aggregator_stats(&self) -> AggregatorStats {
        // The aggregator lives inside the pool deps; stats flow through it
        self.pool.aggregator_stats()
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<Ledger<C>> {
        &self.ledger
    }

    pub fn rules(&self) -> &Arc<RuleEngine<C>> {
        &self.rules
    }

    pub fn hooks(&self) -> &Arc<HookOrchestrator> {
        &self.hooks
    }

    /// Abort all live tasks and refuse further admissions.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
