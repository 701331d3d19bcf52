//! `quill chat`: interactive REPL or single-message mode.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quill_agent::{ContextStore, ExecutionEngine};
use quill_config::{AppConfig, CommandConfig, CompositeStep, ExecutionSpec, StepAction};
use quill_core::agent::ExecutionResult;
use quill_core::interaction::HumanInteraction;
use quill_core::provider::Provider;
use quill_core::tool::ToolContext;
use quill_security::{ApprovalGate, AuditLogger};
use quill_session::SessionStore;
use tokio::sync::Notify;
use tracing::{info, warn};

use super::custom::{self, ScriptJob};
use super::hooks;
use crate::terminal::{self, LineReader, TerminalInteraction};

/// How long to wait for the renderer to print a run's last event.
const RENDER_FLUSH: Duration = Duration::from_secs(2);

pub async fn run(
    session_dir: Option<PathBuf>,
    yolo: bool,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if yolo {
        config.approval.yolo = true;
    }

    let work_dir = match session_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    if !work_dir.is_dir() {
        return Err(format!("Not a directory: {}", work_dir.display()).into());
    }

    let provider = quill_providers::build_from_config(&config.provider)?;
    let store = Arc::new(SessionStore::new(AppConfig::sessions_dir()));
    let input = LineReader::stdin();
    let interaction: Arc<dyn HumanInteraction> = Arc::new(TerminalInteraction::new(input.clone()));

    let engine = Arc::new(build_engine(&config, provider, store, &work_dir, Some(interaction))?);
    let finished = Arc::new(Notify::new());
    let renderer = terminal::spawn_renderer(engine.events(), finished.clone());
    let chat = Chat::new(engine, config.commands.clone()).with_render_signal(finished);

    match message {
        Some(msg) => {
            let result = chat.prompt(&msg).await;
            renderer.abort();
            if !result.is_success() {
                return Err(result.error_message().unwrap_or("interrupted").to_string().into());
            }
        }
        None => {
            chat.banner(&config);
            chat.repl(&input).await;
            renderer.abort();
            println!();
        }
    }
    Ok(())
}

/// Wire the engine for `work_dir`: session, persisted context, tools and
/// approval gate.
pub fn build_engine(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    store: Arc<SessionStore>,
    work_dir: &Path,
    interaction: Option<Arc<dyn HumanInteraction>>,
) -> Result<ExecutionEngine, Box<dyn std::error::Error>> {
    let session = store.get_or_create(work_dir)?;
    let context = Arc::new(
        ContextStore::restore(store.history_log(&session.id)).with_checkpoint_limit(config.agent.max_checkpoints),
    );

    let tool_ctx = ToolContext {
        work_dir: session.work_dir.clone(),
        default_timeout: Duration::from_secs(config.tools.timeout_secs),
        allowed_roots: config.tools.allowed_roots.clone(),
        forbidden_paths: config.tools.forbidden_paths.clone(),
    };
    let audit = Arc::new(AuditLogger::tracing());
    let registry = Arc::new(quill_tools::build_registry(
        &quill_tools::audited_providers(audit.clone()),
        &config.agent,
        &tool_ctx,
    ));
    let gate = Arc::new(ApprovalGate::new(config.approval.yolo, interaction).with_audit(audit));

    let hook_registry = Arc::new(hooks::build_hooks(config, &session.work_dir));

    info!(
        session = %session.id,
        work_dir = %session.work_dir.display(),
        tools = registry.len(),
        yolo = config.approval.yolo,
        "Chat session ready"
    );

    let mut engine = ExecutionEngine::new(
        provider,
        config.provider.model.clone(),
        config.agent.clone(),
        registry,
        gate,
        session,
    )
    .with_context(context)
    .with_hooks(hook_registry)
    .with_session_store(store)
    .with_temperature(config.provider.temperature);
    if let Some(max_tokens) = config.provider.max_tokens {
        engine = engine.with_max_tokens(max_tokens);
    }
    Ok(engine)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Exit,
    Undo,
    Clear,
    Approvals,
    Tokens,
    Commands,
}

impl Builtin {
    const ALL: [(Builtin, &'static str, &'static str); 6] = [
        (Builtin::Exit, "exit", "leave the chat"),
        (Builtin::Undo, "undo", "roll back the last exchange"),
        (Builtin::Clear, "clear", "forget the conversation"),
        (Builtin::Approvals, "approvals", "show session approvals; `/approvals clear` forgets them"),
        (Builtin::Tokens, "tokens", "show context size"),
        (Builtin::Commands, "commands", "list commands"),
    ];

    fn parse(word: &str) -> Option<Self> {
        match word {
            "quit" | "q" => Some(Builtin::Exit),
            "help" => Some(Builtin::Commands),
            _ => Self::ALL.iter().find(|(_, name, _)| *name == word).map(|(b, _, _)| *b),
        }
    }
}

/// Split `/word rest` into `("word", "rest")`.
fn split_command(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('/')?;
    Some(match rest.split_once(char::is_whitespace) {
        Some((word, args)) => (word, args.trim()),
        None => (rest, ""),
    })
}

pub struct Chat {
    engine: Arc<ExecutionEngine>,
    commands: Vec<CommandConfig>,
    work_dir: PathBuf,
    rendered: Option<Arc<Notify>>,
}

impl Chat {
    pub fn new(engine: Arc<ExecutionEngine>, commands: Vec<CommandConfig>) -> Self {
        let work_dir = engine.session().work_dir;
        Self {
            engine,
            commands,
            work_dir,
            rendered: None,
        }
    }

    /// Wait for the event renderer after each run so output and prompt
    /// don't interleave.
    pub fn with_render_signal(mut self, rendered: Arc<Notify>) -> Self {
        self.rendered = Some(rendered);
        self
    }

    fn banner(&self, config: &AppConfig) {
        let session = self.engine.session();
        println!();
        println!("  quill ({} / {})", config.provider.name, config.provider.model);
        println!("  Session:  {}", session.id);
        println!("  Work dir: {}", session.work_dir.display());
        if config.approval.yolo {
            println!("  Approval: all tool calls auto-approved");
        }
        println!("  Type /commands for help, /exit or Ctrl+D to quit.");
    }

    pub async fn repl(&self, input: &LineReader) {
        loop {
            terminal::prompt("\n  you > ");
            let line = tokio::select! {
                line = input.next_line() => line,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };
            if self.handle_line(&line).await == Flow::Exit {
                break;
            }
        }
    }

    fn command(&self, word: &str) -> Option<&CommandConfig> {
        self.commands.iter().find(|c| c.enabled && c.matches(word))
    }

    /// Handle one REPL line: a built-in, a custom command, or a prompt.
    pub async fn handle_line(&self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }

        let Some((word, args)) = split_command(line) else {
            self.report(&self.prompt(line).await);
            return Flow::Continue;
        };

        if let Some(builtin) = Builtin::parse(word) {
            return self.builtin(builtin, args).await;
        }
        match self.command(word) {
            Some(command) => {
                if !self.run_custom(command, args).await {
                    eprintln!("  /{} failed", command.name);
                }
            }
            None => eprintln!("  Unknown command: /{word} (try /commands)"),
        }
        Flow::Continue
    }

    async fn builtin(&self, builtin: Builtin, args: &str) -> Flow {
        match builtin {
            Builtin::Exit => return Flow::Exit,
            Builtin::Undo => {
                if self.engine.undo_last_run().await {
                    println!("  Undid the last exchange.");
                } else {
                    println!("  Nothing to undo.");
                }
            }
            Builtin::Clear => {
                self.engine.context().clear().await;
                println!("  Context cleared.");
            }
            Builtin::Approvals => {
                let gate = self.engine.approval_gate();
                if args == "clear" {
                    gate.clear_session_approvals();
                    println!("  Session approvals cleared.");
                } else if gate.is_auto_approve_mode() {
                    println!("  All tool calls are auto-approved.");
                } else {
                    println!("  {} action(s) approved for this session.", gate.session_approval_count());
                }
            }
            Builtin::Tokens => {
                let context = self.engine.context();
                println!(
                    "  {} tokens in {} messages (compaction at {})",
                    context.token_count().await,
                    context.len().await,
                    self.engine.agent().max_context_tokens
                );
            }
            Builtin::Commands => {
                for (_, name, help) in Builtin::ALL {
                    println!("  /{name:<12} {help}");
                }
                for command in self.commands.iter().filter(|c| c.enabled) {
                    println!("  /{:<12} {} [{}]", command.name, command.description, command.execution.kind());
                }
            }
        }
        Flow::Continue
    }

    /// Run one prompt; Ctrl+C interrupts it.
    pub async fn prompt(&self, text: &str) -> ExecutionResult {
        let run = self.engine.run(text);
        tokio::pin!(run);
        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                _ = tokio::signal::ctrl_c() => self.engine.interrupt(),
            }
        };
        if let Some(rendered) = &self.rendered {
            let _ = tokio::time::timeout(RENDER_FLUSH, rendered.notified()).await;
        }
        result
    }

    fn report(&self, result: &ExecutionResult) {
        if result.is_interrupted() {
            eprintln!("  [interrupted]");
        } else if let Some(error) = result.error_message() {
            eprintln!("  Error: {error}");
        }
    }

    /// Run a custom command. Returns whether it succeeded.
    pub async fn run_custom(&self, command: &CommandConfig, args: &str) -> bool {
        info!(command = %command.name, kind = command.execution.kind(), "Running custom command");
        match &command.execution {
            ExecutionSpec::Script {
                script,
                script_file,
                working_dir,
                timeout_secs,
                env,
            } => {
                let script = match custom::load_script(script.as_deref(), script_file.as_deref(), &self.work_dir) {
                    Ok(script) => script,
                    Err(e) => {
                        eprintln!("  {e}");
                        return false;
                    }
                };
                let job = ScriptJob {
                    script,
                    working_dir: custom::resolve_dir(&self.work_dir, working_dir.as_deref()),
                    timeout: Duration::from_secs(*timeout_secs),
                    env: custom::script_env(env, args),
                };
                self.run_script(&job).await
            }
            ExecutionSpec::Agent { task } => {
                let result = self.prompt(&custom::agent_task(task, args)).await;
                self.report(&result);
                result.is_success()
            }
            ExecutionSpec::Composite { timeout_secs, steps } => {
                let limit = Duration::from_secs(*timeout_secs);
                match tokio::time::timeout(limit, self.run_steps(steps, args, limit)).await {
                    Ok(ok) => ok,
                    Err(_) => {
                        warn!(command = %command.name, timeout_secs, "Composite command timed out");
                        eprintln!("  /{} timed out after {timeout_secs}s", command.name);
                        false
                    }
                }
            }
        }
    }

    async fn run_script(&self, job: &ScriptJob) -> bool {
        let outcome = custom::run_script(job).await;
        let output = outcome.output.trim_end();
        if !output.is_empty() {
            println!("{output}");
        }
        outcome.success
    }

    /// Steps run in order; a failed step stops the command unless it is
    /// marked `continue_on_failure`.
    async fn run_steps(&self, steps: &[CompositeStep], args: &str, limit: Duration) -> bool {
        let mut all_ok = true;
        for (i, step) in steps.iter().enumerate() {
            if let Some(description) = &step.description {
                println!("  [{}/{}] {description}", i + 1, steps.len());
            }
            let ok = match &step.action {
                StepAction::Command { command } => self.run_step_line(command).await,
                StepAction::Script { script } => {
                    let job = ScriptJob {
                        script: script.clone(),
                        working_dir: self.work_dir.clone(),
                        timeout: limit,
                        env: custom::script_env(&Default::default(), args),
                    };
                    self.run_script(&job).await
                }
            };
            if !ok {
                all_ok = false;
                if !step.continue_on_failure {
                    warn!(step = i + 1, "Composite step failed, stopping");
                    return false;
                }
            }
        }
        all_ok
    }

    /// A composite `command` step: a built-in or a prompt. Custom commands
    /// are not expanded here, so commands cannot recurse.
    async fn run_step_line(&self, line: &str) -> bool {
        match split_command(line.trim()) {
            Some((word, args)) => match Builtin::parse(word) {
                Some(Builtin::Exit) => {
                    warn!("Ignoring /exit inside a composite command");
                    true
                }
                Some(builtin) => self.builtin(builtin, args).await == Flow::Continue,
                None => {
                    eprintln!("  /{word} cannot run inside a composite command");
                    false
                }
            },
            None => {
                let result = self.prompt(line).await;
                self.report(&result);
                result.is_success()
            }
        }
    }
}
