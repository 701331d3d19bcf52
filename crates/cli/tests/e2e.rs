//! End-to-end tests: scripted model turns driving the real engine, the
//! built-in tools, the approval gate and on-disk sessions.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quill_agent::testing::{ScriptedProvider, ScriptedTurn};
use quill_agent::{ContextStore, ExecutionEngine};
use quill_core::agent::AgentSpec;
use quill_core::error::InteractionError;
use quill_core::interaction::{ConfirmationResponse, HumanInteraction};
use quill_core::message::{Message, Role};
use quill_core::session::Session;
use quill_core::tool::ToolContext;
use quill_security::ApprovalGate;
use quill_session::SessionStore;

// ── Helpers ──────────────────────────────────────────────────────────────

struct FixedAnswer {
    answer: ConfirmationResponse,
    asked: AtomicUsize,
}

impl FixedAnswer {
    fn new(answer: ConfirmationResponse) -> Arc<Self> {
        Arc::new(Self {
            answer,
            asked: AtomicUsize::new(0),
        })
    }

    fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HumanInteraction for FixedAnswer {
    async fn request_confirmation(&self, _prompt: &str) -> Result<ConfirmationResponse, InteractionError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

fn tool_context(work_dir: &Path) -> ToolContext {
    ToolContext {
        work_dir: work_dir.to_path_buf(),
        default_timeout: Duration::from_secs(10),
        allowed_roots: vec![work_dir.display().to_string()],
        forbidden_paths: vec![],
    }
}

fn engine_for(provider: Arc<ScriptedProvider>, session: Session, gate: ApprovalGate) -> ExecutionEngine {
    let agent = AgentSpec::default();
    let registry = quill_tools::build_registry(
        &quill_tools::default_providers(),
        &agent,
        &tool_context(&session.work_dir),
    );
    ExecutionEngine::new(provider, "test-model", agent, Arc::new(registry), Arc::new(gate), session)
}

fn engine(provider: Arc<ScriptedProvider>, work_dir: &Path, gate: ApprovalGate) -> ExecutionEngine {
    engine_for(provider, Session::new(work_dir), gate)
}

fn tool_messages(history: &[Message]) -> Vec<&Message> {
    history.iter().filter(|m| m.role == Role::Tool).collect()
}

// ── Tool round trips ─────────────────────────────────────────────────────

#[tokio::test]
async fn reads_a_file_and_answers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "alpha\nbeta\n").unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(&[("c1", "read_file", r#"{"path":"notes.txt"}"#)], 40),
        ScriptedTurn::text("The file lists alpha and beta.", 60),
    ]));
    let engine = engine(provider.clone(), dir.path(), ApprovalGate::new(false, None));

    let result = engine.run("what is in notes.txt?").await;
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.response(), Some("The file lists alpha and beta."));
    assert_eq!(result.steps_executed(), 2);

    let history = engine.context().history().await;
    let tools = tool_messages(&history);
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(tools[0].content, "alpha\nbeta\n");

    // The second request carries the tool observation.
    let second = &provider.requests()[1];
    assert_eq!(second.messages.last().unwrap().role, Role::Tool);
    assert!(!second.tools.is_empty());
}

#[tokio::test]
async fn positional_arguments_are_repaired() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "alpha\nbeta\ngamma\n").unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(&[("c1", "read_file", r#""notes.txt", 2, 1"#)], 40),
        ScriptedTurn::text("beta", 50),
    ]));
    let engine = engine(provider, dir.path(), ApprovalGate::yolo());

    assert!(engine.run("line two?").await.is_success());
    let history = engine.context().history().await;
    assert_eq!(tool_messages(&history)[0].content, "     2\tbeta\n");
}

#[tokio::test]
async fn rejected_write_leaves_disk_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let human = FixedAnswer::new(ConfirmationResponse::Rejected);

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(&[("w1", "write_file", r#"{"path":"out.txt","content":"x"}"#)], 40),
        ScriptedTurn::text("Understood, not writing.", 50),
    ]));
    let engine = engine(provider, dir.path(), ApprovalGate::interactive(human.clone()));

    let result = engine.run("write out.txt").await;
    assert!(result.is_success());
    assert_eq!(human.asked(), 1);
    assert!(!dir.path().join("out.txt").exists());

    let history = engine.context().history().await;
    assert_eq!(tool_messages(&history)[0].content, "tool call rejected by user");
}

#[tokio::test]
async fn always_approval_covers_later_writes() {
    let dir = tempfile::tempdir().unwrap();
    let human = FixedAnswer::new(ConfirmationResponse::ApprovedForSession);

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(
            &[
                ("w1", "write_file", r#"{"path":"a.txt","content":"1"}"#),
                ("w2", "write_file", r#"{"path":"sub/b.txt","content":"2"}"#),
            ],
            40,
        ),
        ScriptedTurn::text("Both written.", 50),
    ]));
    let engine = engine(provider, dir.path(), ApprovalGate::interactive(human.clone()));

    assert!(engine.run("write two files").await.is_success());
    assert_eq!(human.asked(), 1);
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "1");
    assert_eq!(std::fs::read_to_string(dir.path().join("sub/b.txt")).unwrap(), "2");
}

#[tokio::test]
async fn paths_outside_the_work_dir_are_denied() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let target = outside.path().join("secret.txt");
    std::fs::write(&target, "top secret").unwrap();

    let arguments = serde_json::json!({ "path": target.display().to_string() }).to_string();
    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(&[("c1", "read_file", arguments.as_str())], 40),
        ScriptedTurn::text("I cannot read that.", 50),
    ]));
    let engine = engine(provider, dir.path(), ApprovalGate::yolo());

    assert!(engine.run("read the secret").await.is_success());
    let history = engine.context().history().await;
    let observed = &tool_messages(&history)[0].content;
    assert!(observed.contains("Permission denied"), "{observed}");
    assert!(!observed.contains("top secret"));
}

#[cfg(unix)]
#[tokio::test]
async fn bash_runs_in_the_session_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "").unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(&[("b1", "bash", r#"{"command":"ls"}"#)], 40),
        ScriptedTurn::text("There is a marker file.", 50),
    ]));
    let engine = engine(provider, dir.path(), ApprovalGate::yolo());

    assert!(engine.run("what files are here?").await.is_success());
    let history = engine.context().history().await;
    assert!(tool_messages(&history)[0].content.contains("marker.txt"));
}

// ── Sessions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn conversation_survives_a_restart() {
    let work = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();

    let first_id = {
        let store = Arc::new(SessionStore::new(root.path()));
        let session = store.get_or_create(work.path()).unwrap();
        let context = Arc::new(ContextStore::restore(store.history_log(&session.id)));
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text("Noted.", 25)]));

        let engine = engine_for(provider, session.clone(), ApprovalGate::yolo())
            .with_context(context)
            .with_session_store(store);

        assert!(engine.run("remember the number 7").await.is_success());
        session.id
    };

    // A new process: fresh store over the same root.
    let store = SessionStore::new(root.path());
    let session = store.get_or_create(work.path()).unwrap();
    assert_eq!(session.id, first_id);
    assert!(session.last_activity_at >= session.created_at);

    let context = ContextStore::restore(store.history_log(&session.id));
    let history = context.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "remember the number 7");
    assert_eq!(history[1].content, "Noted.");
    assert_eq!(context.token_count().await, 25);
}
