//! Terminal I/O: the shared stdin line reader, the approval prompt, and
//! rendering of engine events.

use std::io::{BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use quill_core::error::InteractionError;
use quill_core::event::{EngineEvent, EventBus};
use quill_core::interaction::{ConfirmationResponse, HumanInteraction};
use tokio::sync::{Mutex, Notify, broadcast, mpsc};
use tokio::task::JoinHandle;

/// Lines typed by the user, shared by the REPL and the approval prompt.
///
/// Stdin is read on a detached thread so a pending read never holds up
/// process exit.
pub struct LineReader {
    rx: Mutex<mpsc::Receiver<String>>,
}

impl LineReader {
    pub fn stdin() -> Arc<Self> {
        let (tx, rx) = mpsc::channel(16);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        Arc::new(Self::new(rx))
    }

    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx: Mutex::new(rx) }
    }

    /// The next line, or `None` at end of input.
    pub async fn next_line(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

pub fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Asks for approval on the terminal: `[y]es / [n]o / [a]lways`.
pub struct TerminalInteraction {
    input: Arc<LineReader>,
}

impl TerminalInteraction {
    pub fn new(input: Arc<LineReader>) -> Self {
        Self { input }
    }
}

fn parse_answer(answer: &str) -> Option<ConfirmationResponse> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(ConfirmationResponse::Approved),
        "a" | "always" => Some(ConfirmationResponse::ApprovedForSession),
        "" | "n" | "no" => Some(ConfirmationResponse::Rejected),
        "m" | "modify" => Some(ConfirmationResponse::NeedsModification),
        _ => None,
    }
}

#[async_trait]
impl HumanInteraction for TerminalInteraction {
    async fn request_confirmation(&self, prompt_text: &str) -> Result<ConfirmationResponse, InteractionError> {
        println!();
        println!("  Approval needed: {prompt_text}");
        loop {
            prompt("  Allow? [y]es / [n]o / [a]lways > ");
            let line = self.input.next_line().await.ok_or(InteractionError::Closed)?;
            if let Some(answer) = parse_answer(&line) {
                return Ok(answer);
            }
            println!("  Please answer y, n or a.");
        }
    }
}

/// Status line for an event, or `None` for events shown another way.
fn describe(event: &EngineEvent) -> Option<String> {
    match event {
        EngineEvent::ToolCallStarted { name, .. } => Some(format!("  [{name}] running")),
        EngineEvent::ToolCallFinished { name, ok, .. } => {
            Some(format!("  [{name}] {}", if *ok { "done" } else { "failed" }))
        }
        EngineEvent::StatusUpdate { message } => Some(format!("  [status] {message}")),
        EngineEvent::CompactionBegin => Some("  [compacting context]".into()),
        EngineEvent::CompactionEnd { compacted: false } => Some("  [compaction skipped]".into()),
        EngineEvent::StepInterrupted { step } => Some(format!("  [interrupted at step {step}]")),
        EngineEvent::StepBegin { .. }
        | EngineEvent::ContentDelta { .. }
        | EngineEvent::CompactionEnd { compacted: true }
        | EngineEvent::TokenUsage { .. }
        | EngineEvent::RunFinished { .. } => None,
    }
}

/// Print engine events as they arrive. `finished` is notified after each
/// run's final event has been printed.
pub fn spawn_renderer(events: &EventBus, finished: Arc<Notify>) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        let mut mid_line = false;
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Renderer lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event.as_ref() {
                EngineEvent::ContentDelta { text } => {
                    prompt(text);
                    mid_line = !text.ends_with('\n');
                }
                EngineEvent::RunFinished { .. } => {
                    if mid_line {
                        println!();
                        mid_line = false;
                    }
                    finished.notify_one();
                }
                other => {
                    if let Some(line) = describe(other) {
                        if mid_line {
                            println!();
                            mid_line = false;
                        }
                        eprintln!("{line}");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers() {
        assert_eq!(parse_answer("Y"), Some(ConfirmationResponse::Approved));
        assert_eq!(parse_answer(" always "), Some(ConfirmationResponse::ApprovedForSession));
        assert_eq!(parse_answer(""), Some(ConfirmationResponse::Rejected));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[tokio::test]
    async fn prompt_retries_until_understood() {
        let (tx, rx) = mpsc::channel(4);
        tx.send("what".to_string()).await.unwrap();
        tx.send("a".to_string()).await.unwrap();
        let interaction = TerminalInteraction::new(Arc::new(LineReader::new(rx)));
        let answer = interaction.request_confirmation("Execute command: ls").await.unwrap();
        assert_eq!(answer, ConfirmationResponse::ApprovedForSession);
    }

    #[tokio::test]
    async fn closed_input_is_an_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let interaction = TerminalInteraction::new(Arc::new(LineReader::new(rx)));
        assert!(matches!(
            interaction.request_confirmation("x").await,
            Err(InteractionError::Closed)
        ));
    }

    #[test]
    fn quiet_events_are_not_described() {
        assert!(describe(&EngineEvent::TokenUsage { count: 5 }).is_none());
        assert!(
            describe(&EngineEvent::ToolCallFinished {
                id: "1".into(),
                name: "bash".into(),
                ok: false
            })
            .unwrap()
            .contains("failed")
        );
    }
}
