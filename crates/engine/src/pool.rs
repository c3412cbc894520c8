// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pool: bounded parallelism over supervised subject processes.
//!
//! Each worker owns one PTY at a time and drives a single-threaded
//! cooperative read-loop: PTY bytes flow through the stream parser and
//! thought monitor, detections flow to the intervention controller, and
//! everything is recorded in the ledger and conversation store.

use crate::aggregator::{AggregatorStats, ChildComplete, StreamAggregator};
use crate::error::EngineError;
use crate::hooks::{HookInput, HookOrchestrator, HookPoint};
use crate::intervention::InterventionController;
use crate::monitor::ThoughtMonitor;
use crate::phase::{PhaseController, PhasePlan, PhaseTransition, ToolGate};
use crate::queue::{PortAllocator, PriorityQueue};
use crate::rules::RuleEngine;
use crate::stream::{StreamEventKind, StreamParser};
use crate::verify::VerificationEngine;
use ov_adapters::{ProcessAdapter, ProcessEvent, SpawnConfig};
use ov_core::{
    iso_ms, Action, ActionId, ActionKind, Clock, Conversation, ConversationId, ErrorKind, Event,
    IdGen, RuleAction, SpawnPattern, StreamChunk, SubmitOptions, SupervisorConfig, Task, TaskId,
    TaskResult, TaskStatus, UuidIdGen, Violation, WorkerId,
};
use ov_storage::{ConversationStore, Ledger};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Sentinel prefix a subject prints to request out-of-band tool execution.
const TOOL_INVOCATION_PREFIX: &str = "TOOL_INVOCATION:";

/// Window of recent output scanned for confirmation prompts.
const PROMPT_WINDOW: usize = 1024;

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_workers: usize,
    /// Subject binary; the task prompt is appended as the final argument
    pub command: String,
    pub args: Vec<String>,
    pub workspace: PathBuf,
    pub heartbeat: Duration,
    pub stall_after: Duration,
    pub cooldown: Duration,
    pub default_timeout: Duration,
    /// Supervision tick for stall, deadline and phase-budget checks
    pub tick: Duration,
}

impl From<&SupervisorConfig> for PoolConfig {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            command: config.subject_command.clone(),
            args: config.subject_args.clone(),
            workspace: config.workspace_dir(),
            heartbeat: Duration::from_secs(ov_adapters::env::heartbeat_secs(
                config.heartbeat_secs,
            )),
            stall_after: Duration::from_secs(ov_adapters::env::stall_secs(config.stall_secs)),
            cooldown: Duration::from_millis(config.cooldown_ms),
            default_timeout: Duration::from_secs(config.task_timeout_secs),
            tick: Duration::from_millis(config.tick_ms),
        }
    }
}

/// Events announced by the pool.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    TaskStream {
        task_id: TaskId,
        chunk: String,
    },
    TaskComplete {
        result: TaskResult,
    },
    TaskError {
        task_id: TaskId,
        kind: ErrorKind,
        error: String,
    },
    /// The subject requested out-of-band tool execution
    ToolInvocation {
        task_id: TaskId,
        payload: serde_json::Value,
    },
    ChildComplete(ChildComplete),
}

/// Shared dependencies handed to the pool.
pub struct PoolDeps<P: ProcessAdapter, C: Clock> {
    pub ledger: Arc<Ledger<C>>,
    pub store: Arc<ConversationStore>,
    pub rules: Arc<RuleEngine<C>>,
    pub hooks: Arc<HookOrchestrator>,
    pub controller: Arc<InterventionController<P>>,
    pub aggregator: Arc<StreamAggregator<C>>,
}

/// Bounded pool of worker executors.
pub struct WorkerPool<P: ProcessAdapter, C: Clock> {
    adapter: P,
    clock: C,
    config: PoolConfig,
    ledger: Arc<Ledger<C>>,
    store: Arc<ConversationStore>,
    rules: Arc<RuleEngine<C>>,
    hooks: Arc<HookOrchestrator>,
    controller: Arc<InterventionController<P>>,
    aggregator: Arc<StreamAggregator<C>>,
    verifier: VerificationEngine,
    idgen: UuidIdGen,
    queue: Mutex<PriorityQueue>,
    tasks: Mutex<HashMap<TaskId, Task>>,
    options: Mutex<HashMap<TaskId, SubmitOptions>>,
    results: Mutex<HashMap<TaskId, TaskResult>>,
    /// Client-initiated aborts, keyed by task with the verbatim reason
    aborts: Mutex<HashMap<TaskId, String>>,
    ports: Mutex<PortAllocator>,
    active: AtomicUsize,
    next_worker: AtomicU64,
    shutting_down: AtomicBool,
    events: broadcast::Sender<PoolEvent>,
}

/// Per-task supervision state owned by one worker for one run.
struct WorkerCtx<C: Clock> {
    task_id: TaskId,
    conversation_id: ConversationId,
    worker_id: WorkerId,
    parser: StreamParser<C>,
    monitor: ThoughtMonitor<C>,
    phases: PhaseController<C>,
    phased: bool,
    prompt_window: String,
    files_created: Vec<String>,
    commands_executed: u64,
    pending_failure: Option<(ErrorKind, String)>,
}

impl<P: ProcessAdapter, C: Clock> WorkerPool<P, C> {
    pub fn new(
        adapter: P,
        clock: C,
        config: PoolConfig,
        deps: PoolDeps<P, C>,
    ) -> Result<Arc<Self>, EngineError> {
        std::fs::create_dir_all(&config.workspace)
            .map_err(|e| EngineError::Internal(format!("workspace dir: {}", e)))?;
        let verifier = VerificationEngine::new(Arc::clone(&deps.store))?;
        let (events, _) = broadcast::channel(1024);
        Ok(Arc::new(Self {
            adapter,
            clock,
            config,
            ledger: deps.ledger,
            store: deps.store,
            rules: deps.rules,
            hooks: deps.hooks,
            controller: deps.controller,
            aggregator: deps.aggregator,
            verifier,
            idgen: UuidIdGen,
            queue: Mutex::new(PriorityQueue::new()),
            tasks: Mutex::new(HashMap::new()),
            options: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            aborts: Mutex::new(HashMap::new()),
            ports: Mutex::new(PortAllocator::new()),
            active: AtomicUsize::new(0),
            next_worker: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            events,
        }))
    }

    /// Subscribe to pool events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Current state of a task.
    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.tasks.lock().get(task_id).cloned()
    }

    /// Snapshot of the admission queue.
    pub fn queued(&self) -> Vec<Task> {
        self.queue.lock().snapshot()
    }

    /// Allocate (or look up) the observer port for an agent.
    pub fn allocate_port(&self, agent_id: &str, parent_agent_id: Option<&str>) -> u16 {
        self.ports.lock().allocate_port(agent_id, parent_agent_id)
    }

    /// Aggregator totals.
    pub fn aggregator_stats(&self) -> AggregatorStats {
        self.aggregator.stats()
    }

    fn supervisor_worker() -> WorkerId {
        WorkerId::new("supervisor")
    }

    /// Admit a task: validate, persist, enqueue, and schedule.
    pub fn submit_task(
        self: &Arc<Self>,
        prompt: &str,
        options: SubmitOptions,
    ) -> Result<TaskId, EngineError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(EngineError::Validation("pool is shutting down".to_string()));
        }

        let payload = self
            .hooks
            .run(HookInput {
                point: HookPoint::PreAdmission,
                task_id: None,
                payload: json!({ "prompt": prompt }),
            })
            .and_then(|payload| {
                self.hooks.run(HookInput {
                    point: HookPoint::PreSpawn,
                    task_id: None,
                    payload,
                })
            })
            .map_err(EngineError::Validation)?;

        // A hook may have rewritten the prompt
        let prompt = payload
            .get("prompt")
            .and_then(|v| v.as_str())
            .unwrap_or(prompt)
            .to_string();

        let task_id = TaskId::new(self.idgen.next());
        let epoch_ms = self.clock.epoch_ms();
        let mut task = Task::new(task_id.clone(), prompt.clone(), options.priority, epoch_ms)
            .with_acceptance(options.acceptance.clone());
        if let Some(parent) = &options.parent {
            task = task.with_parent(parent.clone());
        }

        let conversation = self.build_conversation(&task)?;
        self.store.create_conversation(&conversation)?;
        self.hooks.notify(
            HookPoint::ConversationCreated,
            Some(&task_id),
            json!({ "conversation_id": conversation.id.as_str(), "depth": conversation.depth }),
        );

        self.ledger.log(
            &Self::supervisor_worker(),
            Event::TaskQueued {
                id: task_id.clone(),
                parent: options.parent.clone(),
                prompt: prompt.clone(),
                priority: options.priority,
            },
        );

        let fan_out = match options.spawn_pattern {
            SpawnPattern::Parallel => options.spawn_count.unwrap_or(1).saturating_sub(1),
            SpawnPattern::Single => 0,
        };

        self.tasks.lock().insert(task_id.clone(), task.clone());
        self.options.lock().insert(task_id.clone(), options.clone());
        self.queue.lock().enqueue(task);
        self.pump();

        // Parallel fan-out: siblings carry the primary task as parent and
        // are scheduled independently.
        for _ in 0..fan_out {
            let sibling = SubmitOptions {
                parent: Some(task_id.clone()),
                spawn_pattern: SpawnPattern::Single,
                spawn_count: None,
                ..options.clone()
            };
            self.submit_task(&prompt, sibling)?;
        }

        Ok(task_id)
    }

    fn build_conversation(&self, task: &Task) -> Result<Conversation, EngineError> {
        let id = ConversationId::new(task.id.as_str());
        let started_at = iso_ms(task.created_at_ms);
        let conversation = match &task.parent_id {
            Some(parent) => {
                let parent_conv = self
                    .store
                    .get_conversation(&ConversationId::new(parent.as_str()))?;
                match parent_conv {
                    Some(parent_conv) => {
                        Conversation::child_of(&parent_conv, id, task.prompt.clone(), started_at)
                    }
                    None => Conversation::root(id, task.prompt.clone(), started_at),
                }
            }
            None => Conversation::root(id, task.prompt.clone(), started_at),
        };
        Ok(conversation)
    }

    /// Assign queued tasks to free workers.
    fn pump(self: &Arc<Self>) {
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            if self.active.load(Ordering::SeqCst) >= self.config.max_workers {
                return;
            }
            let Some(task) = self.queue.lock().dequeue() else {
                return;
            };
            self.active.fetch_add(1, Ordering::SeqCst);
            let pool = Arc::clone(self);
            tokio::spawn(async move {
                pool.run_task(task).await;
                pool.active.fetch_sub(1, Ordering::SeqCst);
                pool.pump();
            });
        }
    }

    /// Client-initiated abort. Idempotent.
    pub async fn abort(&self, task_id: &TaskId, reason: &str) -> Result<(), EngineError> {
        {
            let tasks = self.tasks.lock();
            let task = tasks
                .get(task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
            if task.is_terminal() {
                return Ok(());
            }
            let mut aborts = self.aborts.lock();
            if aborts.contains_key(task_id) {
                return Ok(());
            }
            aborts.insert(task_id.clone(), reason.to_string());
        }

        // A task still waiting in the queue never reaches a worker; settle it
        // here instead of killing a process that does not exist.
        let dequeued = !self.queue.lock().remove(|t| t.id == *task_id).is_empty();
        if dequeued {
            let epoch_ms = self.clock.epoch_ms();
            self.update_task(task_id, |t| {
                t.error = Some(reason.to_string());
                t.transition(TaskStatus::Aborted, epoch_ms);
            });
            if let Err(e) = self.store.update_conversation(
                &ConversationId::new(task_id.as_str()),
                Some(TaskStatus::Aborted),
                None,
            ) {
                tracing::warn!(%task_id, error = %e, "status persistence failed");
            }
            self.ledger.log(
                &Self::supervisor_worker(),
                Event::TaskAborted {
                    id: task_id.clone(),
                    reason: reason.to_string(),
                },
            );
            let result = self.build_result(
                task_id,
                Some((ErrorKind::ViolationInterrupt, reason.to_string())),
                String::new(),
            );
            self.results.lock().insert(task_id.clone(), result.clone());
            let _ = self.events.send(PoolEvent::TaskComplete { result });
            return Ok(());
        }

        self.controller.abort(task_id, reason).await
    }

    /// Observer-initiated injection into a running task.
    pub async fn intervene(&self, task_id: &TaskId, text: &str) -> Result<(), EngineError> {
        {
            let tasks = self.tasks.lock();
            let task = tasks
                .get(task_id)
                .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
            if task.is_terminal() {
                return Err(EngineError::TaskNotFound(format!(
                    "{} already terminal",
                    task_id
                )));
            }
        }
        self.aggregator.record_intervention(task_id);
        self.controller.inject(task_id, text).await
    }

    /// Wait for a task's final result.
    pub async fn wait_result(
        &self,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<TaskResult, EngineError> {
        let mut rx = self.subscribe();
        if let Some(result) = self.results.lock().get(task_id) {
            return Ok(result.clone());
        }
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let event = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .map_err(|_| {
                    EngineError::Internal(format!("timed out waiting for {}", task_id))
                })?;
            match event {
                Ok(PoolEvent::TaskComplete { result }) if result.id == *task_id => {
                    return Ok(result)
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(result) = self.results.lock().get(task_id) {
                        return Ok(result.clone());
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EngineError::Internal("pool event channel closed".into()))
                }
            }
        }
    }

    /// Abort every live task and refuse new admissions.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let live: Vec<TaskId> = {
            let tasks = self.tasks.lock();
            tasks
                .iter()
                .filter(|(_, t)| !t.is_terminal())
                .map(|(id, _)| id.clone())
                .collect()
        };
        for task_id in live {
            {
                let mut aborts = self.aborts.lock();
                aborts.entry(task_id.clone()).or_insert_with(|| "shutdown".to_string());
            }
            if let Err(e) = self.controller.abort(&task_id, "shutdown").await {
                tracing::warn!(%task_id, error = %e, "abort during shutdown failed");
            }
        }
        self.ledger.log(&Self::supervisor_worker(), Event::Shutdown);
    }

    fn update_task(&self, task_id: &TaskId, f: impl FnOnce(&mut Task)) {
        if let Some(task) = self.tasks.lock().get_mut(task_id) {
            f(task);
        }
    }

    fn log_action(
        &self,
        ctx: &WorkerCtx<C>,
        kind: ActionKind,
        content: &str,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) {
        let mut action = Action::new(
            ActionId::new(self.idgen.next()),
            ctx.conversation_id.clone(),
            kind,
            content,
            self.clock.iso_now(),
        );
        action.metadata = metadata;
        if let Err(e) = self.store.log_action(&action) {
            tracing::warn!(task_id = %ctx.task_id, error = %e, "action persistence failed");
        }
        self.hooks.notify(
            HookPoint::ActionLogged,
            Some(&ctx.task_id),
            json!({ "kind": kind.as_str(), "content": content }),
        );
    }

    /// Drive one task from spawn to terminal status.
    async fn run_task(self: &Arc<Self>, task: Task) {
        let task_id = task.id.clone();
        let worker_n = self.next_worker.fetch_add(1, Ordering::SeqCst);
        let worker_id = WorkerId::new(format!("worker-{}", worker_n));
        let options = self
            .options
            .lock()
            .get(&task_id)
            .cloned()
            .unwrap_or_default();

        let timeout = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.default_timeout);

        let plan = if options.phased {
            PhasePlan::standard(&self.config.workspace)
        } else {
            PhasePlan::single_execution(&self.config.workspace, timeout)
        };

        let (parser, monitor) = match (
            StreamParser::new(self.clock.clone()),
            ThoughtMonitor::new(
                task_id.clone(),
                self.clock.clone(),
                self.config.stall_after,
                self.config.cooldown,
            ),
        ) {
            (Ok(parser), Ok(monitor)) => (parser, monitor),
            _ => {
                self.finalize_unspawned(
                    &task_id,
                    &worker_id,
                    ErrorKind::Internal,
                    "pattern compilation failed",
                )
                .await;
                return;
            }
        };

        let mut ctx = WorkerCtx {
            task_id: task_id.clone(),
            conversation_id: ConversationId::new(task_id.as_str()),
            worker_id: worker_id.clone(),
            parser,
            monitor,
            phases: PhaseController::new(
                task_id.clone(),
                task.prompt.clone(),
                plan,
                self.clock.clone(),
            ),
            phased: options.phased,
            prompt_window: String::new(),
            files_created: Vec::new(),
            commands_executed: 0,
            pending_failure: None,
        };

        self.controller.register_task(&task_id);
        self.update_task(&task_id, |t| {
            t.worker_id = Some(worker_id.clone());
        });
        self.transition(&ctx, TaskStatus::Running);
        self.ledger.log(
            &worker_id,
            Event::TaskStarted {
                id: task_id.clone(),
                worker_id: worker_id.clone(),
            },
        );
        self.log_action(&ctx, ActionKind::TaskStarted, &task.prompt, None);
        self.aggregator.attach(&task_id);

        // Phased tasks get the research prompt; simple tasks get theirs as-is
        let initial = ctx.phases.start();
        let subject_prompt = match (&initial, options.phased) {
            (Some((phase, prompt)), true) => {
                self.ledger.log(
                    &worker_id,
                    Event::PhaseStarted {
                        task_id: task_id.clone(),
                        phase: *phase,
                    },
                );
                prompt.clone()
            }
            _ => match &options.system_prompt {
                Some(system) => format!("{}\n\n{}", system, task.prompt),
                None => task.prompt.clone(),
            },
        };

        let (event_tx, mut event_rx) = mpsc::channel(256);
        let mut args = self.config.args.clone();
        args.push(subject_prompt);
        let spawn_config = SpawnConfig::new(task_id.clone(), &self.config.command)
            .with_args(args)
            .with_cwd(self.config.workspace.clone())
            .with_heartbeat(self.config.heartbeat);

        // One worker-level retry on spawn failure, then propagate
        let mut spawned = self.adapter.spawn(spawn_config.clone(), event_tx.clone()).await;
        if let Err(e) = &spawned {
            tracing::warn!(%task_id, error = %e, "spawn failed, retrying once");
            spawned = self.adapter.spawn(spawn_config, event_tx.clone()).await;
        }
        if let Err(e) = spawned {
            self.finalize_unspawned(&task_id, &worker_id, ErrorKind::Spawn, &e.to_string())
                .await;
            return;
        }
        drop(event_tx);

        let deadline = self.clock.now() + timeout;
        let mut tick = tokio::time::interval(self.config.tick);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let (exit_code, _signal) = loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(ProcessEvent::Data { bytes, .. }) => {
                            self.handle_data(&mut ctx, &bytes).await;
                        }
                        Some(ProcessEvent::Heartbeat { .. }) => {
                            tracing::trace!(%task_id, "keepalive heartbeat");
                        }
                        Some(ProcessEvent::Exit { exit_code, signal, .. }) => {
                            break (exit_code, signal);
                        }
                        None => break (None, None),
                    }
                }
                _ = tick.tick() => {
                    self.on_tick(&mut ctx, deadline).await;
                }
            }
        };

        self.finalize(&mut ctx, &task, exit_code).await;
    }

    /// Handle one raw PTY byte window.
    async fn handle_data(self: &Arc<Self>, ctx: &mut WorkerCtx<C>, bytes: &str) {
        self.aggregator.push(&ctx.task_id, bytes);
        self.ledger.log_chunk(&ctx.worker_id, &ctx.task_id, bytes);

        let chunk = StreamChunk {
            id: ov_core::ChunkId::new(self.idgen.next()),
            conversation_id: ctx.conversation_id.clone(),
            chunk: bytes.to_string(),
            parsed: None,
            timestamp: self.clock.iso_now(),
        };
        if let Err(e) = self.store.log_stream(&chunk) {
            tracing::warn!(task_id = %ctx.task_id, error = %e, "chunk persistence failed");
        }

        let _ = self.events.send(PoolEvent::TaskStream {
            task_id: ctx.task_id.clone(),
            chunk: bytes.to_string(),
        });

        // Confirmation prompts are answered off the rolling window
        ctx.prompt_window.push_str(bytes);
        if ctx.prompt_window.len() > PROMPT_WINDOW {
            let excess = ctx.prompt_window.len() - PROMPT_WINDOW;
            let cut = (excess..ctx.prompt_window.len())
                .find(|i| ctx.prompt_window.is_char_boundary(*i))
                .unwrap_or(0);
            ctx.prompt_window.drain(..cut);
        }
        if self
            .controller
            .observe_output(&ctx.task_id, &ctx.prompt_window)
            .await
        {
            ctx.prompt_window.clear();
        }

        let stream_events = ctx.parser.feed(bytes);
        for event in stream_events {
            self.handle_stream_event(ctx, event).await;
        }

        let detections = ctx.monitor.process_chunk(bytes);
        for detection in detections {
            self.handle_detection(ctx, detection).await;
        }
    }

    async fn handle_stream_event(
        self: &Arc<Self>,
        ctx: &mut WorkerCtx<C>,
        event: crate::stream::StreamEvent,
    ) {
        self.hooks.notify(
            HookPoint::StreamEvent,
            Some(&ctx.task_id),
            json!({ "kind": format!("{:?}", event.kind), "content": event.content }),
        );

        match event.kind {
            StreamEventKind::TaskStarted => {
                self.log_action(ctx, ActionKind::TaskStarted, &event.content, None);
            }
            StreamEventKind::TaskCompleted => {
                self.log_action(ctx, ActionKind::TaskCompleted, &event.content, None);
            }
            StreamEventKind::FileCreated | StreamEventKind::FileModified => {
                let path = event
                    .metadata
                    .get("path")
                    .cloned()
                    .unwrap_or_else(|| event.content.clone());
                let kind = if event.kind == StreamEventKind::FileCreated {
                    ActionKind::FileCreated
                } else {
                    ActionKind::FileModified
                };
                self.log_action(ctx, kind, &path, None);
                self.ledger.log(
                    &ctx.worker_id,
                    if kind == ActionKind::FileCreated {
                        Event::FileCreated {
                            task_id: ctx.task_id.clone(),
                            path: path.clone(),
                        }
                    } else {
                        Event::FileModified {
                            task_id: ctx.task_id.clone(),
                            path: path.clone(),
                        }
                    },
                );
                ctx.files_created.push(path.clone());
                if let Some(transition) = ctx.phases.on_artifact_observed(Path::new(&path)) {
                    self.handle_phase_transition(ctx, transition).await;
                }
            }
            StreamEventKind::CommandExecuted => {
                let command = event
                    .metadata
                    .get("command")
                    .cloned()
                    .unwrap_or_else(|| event.content.clone());
                ctx.commands_executed += 1;
                self.log_action(ctx, ActionKind::CommandExecuted, &command, None);
                self.ledger.log(
                    &ctx.worker_id,
                    Event::CommandExecuted {
                        task_id: ctx.task_id.clone(),
                        command,
                    },
                );
            }
            StreamEventKind::ErrorOccurred => {
                self.log_action(ctx, ActionKind::Error, &event.content, None);
                self.ledger.log(
                    &ctx.worker_id,
                    Event::ErrorOccurred {
                        task_id: ctx.task_id.clone(),
                        message: event.content.clone(),
                    },
                );
            }
            StreamEventKind::CodeBlock => {
                let language = event.metadata.get("language").cloned();
                self.log_action(ctx, ActionKind::CodeBlock, &event.content, None);
                self.ledger.log(
                    &ctx.worker_id,
                    Event::CodeBlock {
                        task_id: ctx.task_id.clone(),
                        language,
                        body: event.content.clone(),
                    },
                );
                let violations = self.rules.check_block(&ctx.task_id, &event.content);
                self.handle_violations(ctx, violations).await;
            }
            StreamEventKind::OutputChunk => {
                if let Some(rest) = event.content.strip_prefix(TOOL_INVOCATION_PREFIX) {
                    self.handle_tool_invocation(ctx, rest.trim()).await;
                    return;
                }
                self.log_action(ctx, ActionKind::OutputChunk, &event.content, None);
                let violations = self.rules.check_line(&ctx.task_id, &event.content);
                self.handle_violations(ctx, violations).await;
            }
        }
    }

    /// The bridge by which a subject requests out-of-band tool execution.
    async fn handle_tool_invocation(self: &Arc<Self>, ctx: &mut WorkerCtx<C>, raw: &str) {
        let payload: serde_json::Value = match serde_json::from_str(raw) {
            Ok(payload) => payload,
            Err(e) => {
                // Malformed invocations are a protocol error on the
                // conversation, never a terminal failure
                self.log_action(
                    ctx,
                    ActionKind::Error,
                    &format!("protocol: malformed tool invocation: {}", e),
                    None,
                );
                return;
            }
        };

        if let Some(tool) = payload.get("tool").and_then(|v| v.as_str()) {
            if let ToolGate::Forbidden { remediation } = ctx.phases.tool_allowed(tool) {
                self.ledger.log(
                    &ctx.worker_id,
                    Event::ViolationDetected {
                        task_id: ctx.task_id.clone(),
                        rule_id: "forbidden-tool".to_string(),
                        severity: ov_core::Severity::Error,
                        excerpt: tool.to_string(),
                    },
                );
                self.send_intervention(ctx, &remediation).await;
                return;
            }
        }

        self.ledger.log(
            &ctx.worker_id,
            Event::ToolInvocation {
                task_id: ctx.task_id.clone(),
                payload: payload.clone(),
            },
        );
        let _ = self.events.send(PoolEvent::ToolInvocation {
            task_id: ctx.task_id.clone(),
            payload,
        });
    }

    async fn handle_violations(self: &Arc<Self>, ctx: &mut WorkerCtx<C>, violations: Vec<Violation>) {
        if violations.is_empty() {
            return;
        }
        for violation in &violations {
            self.ledger.log(
                &ctx.worker_id,
                Event::ViolationDetected {
                    task_id: ctx.task_id.clone(),
                    rule_id: violation.rule_id.clone(),
                    severity: violation.severity,
                    excerpt: violation.matched.clone(),
                },
            );
            self.hooks.notify(
                HookPoint::Violation,
                Some(&ctx.task_id),
                json!({ "rule_id": violation.rule_id, "severity": violation.severity }),
            );
        }

        let worst = violations
            .iter()
            .max_by_key(|v| v.severity)
            .map(|v| v.rule_id.clone());
        let action = worst.and_then(|id| self.rules.rule_action(&id));
        if matches!(action, Some(RuleAction::Interrupt | RuleAction::Redirect)) {
            if let Some(remediation) = self.rules.generate_intervention(&violations) {
                let rule_id = violations
                    .iter()
                    .max_by_key(|v| v.severity)
                    .map(|v| v.rule_id.clone());
                let mut metadata = HashMap::new();
                if let Some(rule_id) = rule_id {
                    metadata.insert("rule_id".to_string(), json!(rule_id));
                }
                self.log_action(
                    ctx,
                    ActionKind::Intervention,
                    &remediation,
                    Some(metadata),
                );
                self.send_intervention(ctx, &remediation).await;
            }
        }
    }

    async fn handle_detection(
        self: &Arc<Self>,
        ctx: &mut WorkerCtx<C>,
        detection: crate::monitor::Detection,
    ) {
        match detection.action {
            RuleAction::Log => {
                tracing::debug!(
                    task_id = %ctx.task_id,
                    pattern = %detection.pattern_id,
                    matched = %detection.matched,
                    "monitor signal"
                );
                return;
            }
            RuleAction::Warn => {
                self.ledger.log(
                    &ctx.worker_id,
                    Event::ViolationDetected {
                        task_id: ctx.task_id.clone(),
                        rule_id: detection.pattern_id.clone(),
                        severity: detection.severity,
                        excerpt: detection.matched.clone(),
                    },
                );
                return;
            }
            RuleAction::Interrupt | RuleAction::Redirect => {}
        }

        self.ledger.log(
            &ctx.worker_id,
            Event::ViolationDetected {
                task_id: ctx.task_id.clone(),
                rule_id: detection.pattern_id.clone(),
                severity: detection.severity,
                excerpt: detection.matched.clone(),
            },
        );

        // Prefer the rule engine's remediation template for the line that
        // triggered the detection; fall back to a generic redirect.
        let rule_violations = self.rules.check_line(&ctx.task_id, &detection.context);
        let remediation = self
            .rules
            .generate_intervention(&rule_violations)
            .unwrap_or_else(|| match detection.pattern_id.as_str() {
                "research-loop" | "research-loop-file" => {
                    "You are looping on research. Stop reading and start writing the \
                     implementation files now."
                        .to_string()
                }
                _ => format!(
                    "Detected '{}'. Stop narrating and produce working files now.",
                    detection.matched
                ),
            });

        let mut metadata = HashMap::new();
        metadata.insert("rule_id".to_string(), json!(detection.pattern_id));
        self.log_action(ctx, ActionKind::Intervention, &remediation, Some(metadata));
        self.send_intervention(ctx, &remediation).await;
    }

    async fn send_intervention(self: &Arc<Self>, ctx: &WorkerCtx<C>, remediation: &str) {
        self.aggregator.record_intervention(&ctx.task_id);
        if let Err(e) = self.controller.redirect(&ctx.task_id, remediation).await {
            tracing::warn!(task_id = %ctx.task_id, error = %e, "intervention write failed");
        }
    }

    /// Supervision tick: stall, deadline, and phase budgets.
    async fn on_tick(self: &Arc<Self>, ctx: &mut WorkerCtx<C>, deadline: std::time::Instant) {
        if ctx.pending_failure.is_none() {
            if let Some(stall) = ctx.monitor.check_stall() {
                self.ledger.log(
                    &ctx.worker_id,
                    Event::ViolationDetected {
                        task_id: ctx.task_id.clone(),
                        rule_id: stall.pattern_id.clone(),
                        severity: stall.severity,
                        excerpt: stall.matched.clone(),
                    },
                );
                ctx.pending_failure = Some((ErrorKind::Stall, stall.matched.clone()));
                if let Err(e) = self.controller.abort(&ctx.task_id, &stall.matched).await {
                    tracing::warn!(task_id = %ctx.task_id, error = %e, "stall abort failed");
                }
                return;
            }

            if self.clock.now() >= deadline {
                let message = "task deadline exceeded".to_string();
                ctx.pending_failure = Some((ErrorKind::Timeout, message.clone()));
                if let Err(e) = self.controller.abort(&ctx.task_id, &message).await {
                    tracing::warn!(task_id = %ctx.task_id, error = %e, "timeout abort failed");
                }
                return;
            }
        }

        if let Some(transition) = ctx.phases.on_tick() {
            self.handle_phase_transition(ctx, transition).await;
        }
    }

    async fn handle_phase_transition(self: &Arc<Self>, ctx: &mut WorkerCtx<C>, transition: PhaseTransition) {
        if !ctx.phased {
            return;
        }
        let outcome = transition
            .finished
            .outcome
            .unwrap_or(ov_core::PhaseOutcome::Interrupted);
        self.ledger.log(
            &ctx.worker_id,
            Event::PhaseCompleted {
                task_id: ctx.task_id.clone(),
                phase: transition.finished.phase,
                outcome,
            },
        );
        self.hooks.notify(
            HookPoint::PhaseTransition,
            Some(&ctx.task_id),
            json!({ "finished": transition.finished.phase.as_str() }),
        );

        if let Some((phase, prompt)) = transition.next {
            self.ledger.log(
                &ctx.worker_id,
                Event::PhaseStarted {
                    task_id: ctx.task_id.clone(),
                    phase,
                },
            );
            self.send_intervention(ctx, &prompt).await;
        }
    }

    fn transition(&self, ctx: &WorkerCtx<C>, status: TaskStatus) {
        let epoch_ms = self.clock.epoch_ms();
        self.update_task(&ctx.task_id, |t| {
            t.transition(status, epoch_ms);
        });
        if let Err(e) = self
            .store
            .update_conversation(&ctx.conversation_id, Some(status), None)
        {
            tracing::warn!(task_id = %ctx.task_id, error = %e, "status persistence failed");
        }
        self.hooks.notify(
            HookPoint::TaskStatusUpdated,
            Some(&ctx.task_id),
            json!({ "status": status.to_string() }),
        );
    }

    /// Fail a task that never got a subject process.
    async fn finalize_unspawned(
        self: &Arc<Self>,
        task_id: &TaskId,
        worker_id: &WorkerId,
        kind: ErrorKind,
        error: &str,
    ) {
        let epoch_ms = self.clock.epoch_ms();
        self.update_task(task_id, |t| {
            t.error = Some(error.to_string());
            t.transition(TaskStatus::Failed, epoch_ms);
        });
        let conversation_id = ConversationId::new(task_id.as_str());
        if let Err(e) =
            self.store
                .update_conversation(&conversation_id, Some(TaskStatus::Failed), None)
        {
            tracing::warn!(%task_id, error = %e, "status persistence failed");
        }
        self.ledger.log(
            worker_id,
            Event::TaskFailed {
                id: task_id.clone(),
                kind,
                error: error.to_string(),
            },
        );
        self.aggregator.complete(task_id);
        self.controller.forget_task(task_id);

        let _ = self.events.send(PoolEvent::TaskError {
            task_id: task_id.clone(),
            kind,
            error: error.to_string(),
        });
        let result = self.build_result(task_id, Some((kind, error.to_string())), String::new());
        self.results.lock().insert(task_id.clone(), result.clone());
        let _ = self.events.send(PoolEvent::TaskComplete { result });
    }

    /// Final accounting for a task whose subject process exited.
    async fn finalize(self: &Arc<Self>, ctx: &mut WorkerCtx<C>, task: &Task, exit_code: Option<i32>) {
        self.controller.mark_exited(&ctx.task_id);

        if let Some(complete) = self.aggregator.complete(&ctx.task_id) {
            let _ = self.events.send(PoolEvent::ChildComplete(complete));
        }

        let abort_reason = self.aborts.lock().get(&ctx.task_id).cloned();

        let failure: Option<(ErrorKind, String)> = if let Some(reason) = abort_reason {
            // Client aborts win: the task reports the reason verbatim
            self.transition(ctx, TaskStatus::Aborted);
            self.update_task(&ctx.task_id, |t| t.error = Some(reason.clone()));
            self.ledger.log(
                &ctx.worker_id,
                Event::TaskAborted {
                    id: ctx.task_id.clone(),
                    reason: reason.clone(),
                },
            );
            Some((ErrorKind::ViolationInterrupt, reason))
        } else if let Some((kind, message)) = ctx.pending_failure.take() {
            self.fail(ctx, kind, &message);
            Some((kind, message))
        } else if exit_code == Some(0) {
            match self.acceptance_unmet(task, ctx) {
                Some(missing) => {
                    let message = format!("acceptance criteria not met: {}", missing);
                    self.fail(ctx, ErrorKind::Validation, &message);
                    Some((ErrorKind::Validation, message))
                }
                None => {
                    self.transition(ctx, TaskStatus::Completed);
                    let duration_ms = self
                        .task(&ctx.task_id)
                        .and_then(|t| t.duration_ms())
                        .unwrap_or_default();
                    self.ledger.log(
                        &ctx.worker_id,
                        Event::TaskCompleted {
                            id: ctx.task_id.clone(),
                            duration_ms,
                        },
                    );
                    self.log_action(ctx, ActionKind::TaskCompleted, "completed", None);
                    None
                }
            }
        } else {
            let message = match exit_code {
                Some(code) => format!("subject process exited with code {}", code),
                None => "subject process ended without an exit code".to_string(),
            };
            self.fail(ctx, ErrorKind::Io, &message);
            Some((ErrorKind::Io, message))
        };

        if !ctx.phases.is_done() {
            ctx.phases.interrupt();
        }

        self.hooks.notify(
            HookPoint::PostExecution,
            Some(&ctx.task_id),
            json!({ "exit_code": exit_code, "failed": failure.is_some() }),
        );

        let response = self
            .adapter
            .output(&ctx.task_id)
            .await
            .unwrap_or_default();

        if let Some((kind, error)) = &failure {
            let _ = self.events.send(PoolEvent::TaskError {
                task_id: ctx.task_id.clone(),
                kind: *kind,
                error: error.clone(),
            });
        }

        let result = self.build_result(&ctx.task_id, failure, response);
        self.results
            .lock()
            .insert(ctx.task_id.clone(), result.clone());
        let _ = self.events.send(PoolEvent::TaskComplete { result });

        self.controller.forget_task(&ctx.task_id);
    }

    fn fail(&self, ctx: &WorkerCtx<C>, kind: ErrorKind, message: &str) {
        self.transition(ctx, TaskStatus::Failed);
        self.update_task(&ctx.task_id, |t| t.error = Some(message.to_string()));
        self.ledger.log(
            &ctx.worker_id,
            Event::TaskFailed {
                id: ctx.task_id.clone(),
                kind,
                error: message.to_string(),
            },
        );
        let mut metadata = HashMap::new();
        metadata.insert("rule_id".to_string(), json!(kind.to_string()));
        self.log_action(ctx, ActionKind::Error, message, Some(metadata));
    }

    /// First unmet acceptance criterion, if any.
    fn acceptance_unmet(&self, task: &Task, ctx: &WorkerCtx<C>) -> Option<String> {
        for pattern in &task.acceptance.expected_files {
            if !ctx.files_created.iter().any(|f| f.contains(pattern.as_str())) {
                return Some(format!("expected file '{}' was not produced", pattern));
            }
        }
        if task.acceptance.must_execute && ctx.commands_executed == 0 {
            return Some("no command was executed".to_string());
        }
        None
    }

    fn build_result(
        &self,
        task_id: &TaskId,
        failure: Option<(ErrorKind, String)>,
        response: String,
    ) -> TaskResult {
        let task = self.task(task_id);
        let (prompt, started, ended) = task
            .as_ref()
            .map(|t| {
                (
                    t.prompt.clone(),
                    t.started_at_ms.unwrap_or(t.created_at_ms),
                    t.ended_at_ms.unwrap_or_else(|| self.clock.epoch_ms()),
                )
            })
            .unwrap_or_else(|| (String::new(), 0, self.clock.epoch_ms()));

        let verification = self
            .verifier
            .verify(&ConversationId::new(task_id.as_str()))
            .ok();

        TaskResult {
            id: task_id.clone(),
            prompt,
            response,
            error: failure.map(|(kind, message)| format!("{}: {}", kind, message)),
            duration_ms: ended.saturating_sub(started),
            start_time: iso_ms(started),
            end_time: iso_ms(ended),
            verification,
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
