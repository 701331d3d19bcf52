//! The execution engine: the step loop behind every front end.
//!
//! One engine serves one session and runs at most one request at a time.
//! Each step streams a model turn and either finishes the run (final text),
//! dispatches the requested tool calls through the pipeline, or counts a
//! thinking-only step. Compaction runs between steps once the context is
//! over budget. [`ExecutionEngine::interrupt`] cancels cooperatively: the
//! run stops at the next chunk or step boundary.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use quill_core::agent::{AgentSpec, ExecutionResult};
use quill_core::error::ProviderError;
use quill_core::event::{EngineEvent, EventBus};
use quill_core::hook::{HookContext, HookPoint};
use quill_core::message::{Message, ToolCallRequest};
use quill_core::provider::{Provider, ProviderRequest, ToolDefinition, Usage};
use quill_core::session::Session;
use quill_core::tool::ToolRegistry;
use quill_security::ApprovalGate;
use quill_session::SessionStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::compaction::Compactor;
use crate::context::{ContextStore, estimate_messages_tokens};
use crate::hooks::HookRegistry;
use crate::pipeline::ToolInvocationPipeline;
use crate::toolcall::filter_valid;
use crate::turn::{Turn, TurnAccumulator};

const BUSY_MESSAGE: &str = "engine is busy: a run is already in progress";

/// Resets the running flag however a run ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-run counters.
#[derive(Debug, Default)]
struct RunProgress {
    steps: u32,
    tokens_used: u64,
    thinking_steps: u32,
}

enum StreamOutcome {
    Complete(Turn),
    Interrupted(Turn),
}

pub struct ExecutionEngine {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    agent: AgentSpec,
    context: Arc<ContextStore>,
    pipeline: ToolInvocationPipeline,
    compactor: Compactor,
    events: Arc<EventBus>,
    hooks: Arc<HookRegistry>,
    session: Mutex<Session>,
    sessions: Option<Arc<SessionStore>>,
    running: AtomicBool,
    /// Token of the active run; replaced when a run begins
    cancel: Mutex<CancellationToken>,
    run_counter: AtomicU32,
}

impl ExecutionEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        agent: AgentSpec,
        tools: Arc<ToolRegistry>,
        approval: Arc<ApprovalGate>,
        session: Session,
    ) -> Self {
        let model = model.into();
        let context = ContextStore::new().with_checkpoint_limit(agent.max_checkpoints);
        Self {
            compactor: Compactor::new(provider.clone(), model.clone()),
            provider,
            model,
            temperature: 0.7,
            max_tokens: None,
            agent,
            context: Arc::new(context),
            pipeline: ToolInvocationPipeline::new(tools, approval),
            events: Arc::new(EventBus::default()),
            hooks: Arc::new(HookRegistry::default()),
            session: Mutex::new(session),
            sessions: None,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            run_counter: AtomicU32::new(0),
        }
    }

    /// Use `context` instead of a fresh in-memory store.
    pub fn with_context(mut self, context: Arc<ContextStore>) -> Self {
        self.context = context;
        self
    }

    /// Save the session through `sessions` whenever it is touched.
    pub fn with_session_store(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Fire `hooks` around user input, tool calls and failed runs.
    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.pipeline.set_hooks(hooks.clone());
        self.hooks = hooks;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    pub fn approval_gate(&self) -> &Arc<ApprovalGate> {
        self.pipeline.approval_gate()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn agent(&self) -> &AgentSpec {
        &self.agent
    }

    pub fn session(&self) -> Session {
        self.lock_session().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the active run to stop. Does nothing while idle.
    pub fn interrupt(&self) {
        let cancel = self.lock_cancel();
        if self.is_running() {
            info!("Interrupt requested");
            cancel.cancel();
        }
    }

    /// Claim the engine for a run.
    fn begin(&self) -> Option<CancellationToken> {
        let mut cancel = self.lock_cancel();
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let token = CancellationToken::new();
        *cancel = token.clone();
        Some(token)
    }

    pub async fn run(&self, input: &str) -> ExecutionResult {
        self.run_with_context(input, None).await
    }

    /// Run `input` to completion. `extra_context`, when given, is recorded
    /// as a system message right after the user message.
    pub async fn run_with_context(&self, input: &str, extra_context: Option<&str>) -> ExecutionResult {
        let Some(token) = self.begin() else {
            warn!("Run rejected, engine busy");
            return ExecutionResult::error(BUSY_MESSAGE);
        };
        let _guard = RunGuard(&self.running);

        let result = match AssertUnwindSafe(self.execute(input, extra_context, &token))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(reason = %reason, "Run panicked");
                ExecutionResult::error(format!("internal error: {reason}"))
            }
        };

        if let Some(error) = result.error_message() {
            self.hooks.fire(&HookContext::error(error)).await;
        }

        info!(
            outcome = result.outcome(),
            steps = result.steps_executed(),
            tokens = result.tokens_used(),
            "Run finished"
        );
        self.events.publish(EngineEvent::RunFinished {
            outcome: result.outcome().to_string(),
        });
        result
    }

    /// Roll the context back to where the most recent run started.
    /// Returns false while a run is active or when there is nothing to undo.
    pub async fn undo_last_run(&self) -> bool {
        if self.is_running() {
            return false;
        }
        let Some(id) = self.context.latest_checkpoint().await else {
            return false;
        };
        let restored = self.context.restore_checkpoint(id).await;
        self.context.discard_checkpoint(id).await;
        if restored {
            info!(run = id, "Undid run");
        }
        restored
    }

    async fn execute(
        &self,
        input: &str,
        extra_context: Option<&str>,
        token: &CancellationToken,
    ) -> ExecutionResult {
        let run_id = self.run_counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.touch_session();
        self.context.close_unanswered_calls().await;
        self.context.create_checkpoint(run_id).await;

        self.hooks
            .fire(&HookContext::user_input(HookPoint::PreUserInput, input))
            .await;
        self.context.add_message(Message::user(input)).await;
        if let Some(extra) = extra_context.filter(|e| !e.trim().is_empty()) {
            self.context.add_message(Message::system(extra)).await;
        }
        self.hooks
            .fire(&HookContext::user_input(HookPoint::PostUserInput, input))
            .await;

        debug!(
            run = run_id,
            agent = %self.agent.name,
            max_steps = self.agent.max_steps,
            "Run started"
        );

        let tools = self.pipeline.registry().definitions();
        let mut progress = RunProgress::default();

        for step in 1..=self.agent.max_steps {
            if token.is_cancelled() {
                return self.interrupted(step, &progress);
            }

            if self.context.token_count().await > self.agent.max_context_tokens {
                self.compact().await;
            }

            progress.steps = step;
            self.events.publish(EngineEvent::StepBegin { step });
            debug!(step, "Step begin");

            let turn = match self.stream_turn(&tools, token).await {
                Ok(StreamOutcome::Complete(turn)) => turn,
                Ok(StreamOutcome::Interrupted(partial)) => {
                    if !partial.content.is_empty() {
                        self.context.add_message(Message::assistant(partial.content)).await;
                    }
                    return self.interrupted(step, &progress);
                }
                Err(e) => {
                    error!(step, error = %e, "Model stream failed");
                    return ExecutionResult::error(e.to_string())
                        .with_progress(progress.steps, progress.tokens_used);
                }
            };

            let calls = filter_valid(turn.tool_calls);
            if calls.is_empty() {
                self.context.add_message(Message::assistant(turn.content.clone())).await;
                self.record_usage(turn.usage, 0, &mut progress).await;

                if !turn.content.trim().is_empty() {
                    return ExecutionResult::success(turn.content, progress.steps, progress.tokens_used);
                }
                self.thinking_step(&mut progress);
                continue;
            }

            progress.thinking_steps = 0;
            self.context
                .add_message(Message::assistant_with_tools(turn.content, calls.clone()))
                .await;
            let results = self.dispatch(&calls).await;
            let appended = estimate_messages_tokens(&results);
            self.context.add_messages(results).await;
            self.record_usage(turn.usage, appended, &mut progress).await;
        }

        warn!(max_steps = self.agent.max_steps, "Step limit reached");
        ExecutionResult::error(format!("exceeded maximum steps ({})", self.agent.max_steps))
            .with_progress(progress.steps, progress.tokens_used)
    }

    /// Stream one model turn, publishing text as it arrives.
    async fn stream_turn(
        &self,
        tools: &[ToolDefinition],
        token: &CancellationToken,
    ) -> Result<StreamOutcome, ProviderError> {
        let request = ProviderRequest::new(self.model.clone(), self.context.history().await)
            .with_system_prompt(self.agent.system_prompt.clone())
            .with_tools(tools.to_vec())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let mut rx = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(StreamOutcome::Interrupted(Turn::default())),
            rx = self.provider.stream(request) => rx?,
        };

        let mut acc = TurnAccumulator::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(StreamOutcome::Interrupted(acc.finish())),
                next = rx.recv() => next,
            };
            let Some(chunk) = next else { break };
            if let Some(text) = acc.push(chunk?) {
                self.events.publish(EngineEvent::ContentDelta { text });
            }
            if acc.is_done() {
                break;
            }
        }
        Ok(StreamOutcome::Complete(acc.finish()))
    }

    /// Run each call in order; one tool message per call.
    async fn dispatch(&self, calls: &[ToolCallRequest]) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            self.events.publish(EngineEvent::ToolCallStarted {
                id: call.id.clone(),
                name: call.name.clone(),
            });
            let result = self.pipeline.invoke(call).await;
            self.events.publish(EngineEvent::ToolCallFinished {
                id: call.id.clone(),
                name: call.name.clone(),
                ok: result.ok,
            });
            results.push(Message::tool_result(&call.id, result.to_content()));
        }
        results
    }

    /// Update the context token count after a step. `appended` covers
    /// messages added after the model reported its usage.
    async fn record_usage(&self, usage: Option<Usage>, appended: u64, progress: &mut RunProgress) {
        let count = match usage.filter(|u| u.total_tokens > 0) {
            Some(usage) => {
                progress.tokens_used += u64::from(usage.total_tokens);
                u64::from(usage.total_tokens) + appended
            }
            None => {
                let estimate = estimate_messages_tokens(&self.context.history().await);
                progress.tokens_used += estimate;
                estimate
            }
        };
        self.context.set_token_count(count).await;
        self.events.publish(EngineEvent::TokenUsage { count });
    }

    fn thinking_step(&self, progress: &mut RunProgress) {
        progress.thinking_steps += 1;
        debug!(
            thinking_steps = progress.thinking_steps,
            max = self.agent.max_thinking_steps,
            "Thinking-only step"
        );
        if progress.thinking_steps >= self.agent.max_thinking_steps {
            let message = format!(
                "No answer or tool call after {} consecutive steps; still working ({} of {} steps used)",
                progress.thinking_steps, progress.steps, self.agent.max_steps
            );
            warn!(thinking_steps = progress.thinking_steps, "Bounded thinking reached");
            self.events.publish(EngineEvent::StatusUpdate { message });
            progress.thinking_steps = 0;
        }
    }

    async fn compact(&self) {
        self.events.publish(EngineEvent::CompactionBegin);
        let outcome = self.compactor.compact(&self.context).await;
        self.events.publish(EngineEvent::CompactionEnd {
            compacted: outcome.is_compacted(),
        });
    }

    fn interrupted(&self, step: u32, progress: &RunProgress) -> ExecutionResult {
        info!(step, "Run interrupted");
        self.events.publish(EngineEvent::StepInterrupted { step });
        ExecutionResult::interrupted().with_progress(progress.steps, progress.tokens_used)
    }

    fn touch_session(&self) {
        let snapshot = {
            let mut session = self.lock_session();
            session.touch();
            session.clone()
        };
        if let Some(sessions) = &self.sessions
            && let Err(e) = sessions.save(&snapshot)
        {
            warn!(session = %snapshot.id, error = %e, "Failed to save session");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
