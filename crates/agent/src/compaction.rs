//! Token-budget compaction.
//!
//! Older history is summarized by one model call; the most recent
//! user/assistant exchanges are always kept verbatim after the summary.

use std::fmt::Write as _;
use std::sync::Arc;

use quill_core::error::ProviderError;
use quill_core::message::Message;
use quill_core::provider::{Provider, ProviderRequest};
use tracing::{debug, info, warn};

use crate::context::{ContextStore, estimate_messages_tokens};

/// User/assistant messages kept out of the summary.
pub const PRESERVED_MESSAGES: usize = 2;

const COMPACTION_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that compacts conversation context.";

const COMPACTION_INSTRUCTION: &str = "Summarize the conversation below so that work can continue \
from the summary alone. Keep file paths, commands that were run and their outcomes, decisions \
made, and any open tasks. Reply with the summary only.";

const SUMMARY_PREFIX: &str = "Previous context has been compacted. Here is the compaction output:\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Not enough history to compact safely
    Skipped,
    Compacted,
    /// History left unchanged
    Failed(String),
}

impl CompactionOutcome {
    pub fn is_compacted(&self) -> bool {
        matches!(self, Self::Compacted)
    }
}

pub struct Compactor {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Compactor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Summarize everything before the preserved tail of `store`.
    ///
    /// Never fails the caller: on any error the history is left as it was.
    pub async fn compact(&self, store: &ContextStore) -> CompactionOutcome {
        let history = store.history().await;
        let Some(boundary) = preserved_boundary(&history) else {
            debug!(messages = history.len(), "Too little history to compact");
            return CompactionOutcome::Skipped;
        };
        if boundary == 0 {
            return CompactionOutcome::Skipped;
        }

        let (older, tail) = history.split_at(boundary);
        let summary = match self.summarize(older).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => {
                warn!("Compaction produced no output, keeping history");
                return CompactionOutcome::Failed("empty summary".into());
            }
            Err(e) => {
                warn!(error = %e, "Compaction failed, keeping history");
                return CompactionOutcome::Failed(e.to_string());
            }
        };

        let mut compacted = Vec::with_capacity(tail.len() + 1);
        compacted.push(Message::assistant(format!("{SUMMARY_PREFIX}{}", summary.trim())));
        compacted.extend_from_slice(tail);
        let tokens = estimate_messages_tokens(&compacted);

        info!(
            before = history.len(),
            after = compacted.len(),
            tokens,
            "Compacted context"
        );
        store.replace_history(compacted, tokens).await;
        CompactionOutcome::Compacted
    }

    async fn summarize(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let prompt = format!("{COMPACTION_INSTRUCTION}\n\n{}", render_transcript(messages));
        let request = ProviderRequest::new(self.model.clone(), vec![Message::user(prompt)])
            .with_system_prompt(COMPACTION_SYSTEM_PROMPT);

        let mut rx = self.provider.stream(request).await?;
        let mut summary = String::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(text) = chunk.content {
                summary.push_str(&text);
            }
            if chunk.done {
                break;
            }
        }
        Ok(summary)
    }
}

/// Index of the first preserved message, or `None` when fewer than
/// [`PRESERVED_MESSAGES`] exchange messages exist.
fn preserved_boundary(history: &[Message]) -> Option<usize> {
    let mut seen = 0;
    for (index, message) in history.iter().enumerate().rev() {
        if message.is_exchange() {
            seen += 1;
            if seen == PRESERVED_MESSAGES {
                return Some(index);
            }
        }
    }
    None
}

fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for (i, message) in messages.iter().enumerate() {
        let _ = writeln!(out, "## Message {}", i + 1);
        let _ = writeln!(out, "Role: {}", message.role);
        let _ = writeln!(out, "Content: {}", message.content);
        for call in &message.tool_calls {
            let _ = writeln!(out, "Tool call: {}({})", call.name, call.arguments);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, ScriptedTurn};
    use quill_core::message::Role;

    async fn store_with(messages: Vec<Message>) -> ContextStore {
        let store = ContextStore::new();
        store.add_messages(messages).await;
        store.set_token_count(9_000).await;
        store
    }

    fn long_history() -> Vec<Message> {
        vec![
            Message::user("find the bug"),
            Message::assistant("looking"),
            Message::tool_result("c1", "src/lib.rs"),
            Message::user("fix it"),
            Message::assistant("fixed"),
        ]
    }

    #[tokio::test]
    async fn keeps_summary_then_tail() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text("bug in lib.rs", 20)]));
        let store = store_with(long_history()).await;

        let outcome = Compactor::new(provider.clone(), "m").compact(&store).await;
        assert_eq!(outcome, CompactionOutcome::Compacted);

        let history = store.history().await;
        assert_eq!(history.len(), 1 + PRESERVED_MESSAGES);
        assert_eq!(history[0].role, Role::Assistant);
        assert!(history[0].content.starts_with(SUMMARY_PREFIX));
        assert!(history[0].content.ends_with("bug in lib.rs"));
        assert_eq!(history[1].content, "fix it");
        assert_eq!(history[2].content, "fixed");
        assert!(store.token_count().await < 9_000);

        let request = &provider.requests()[0];
        assert!(request.tools.is_empty());
        assert_eq!(request.system_prompt.as_deref(), Some(COMPACTION_SYSTEM_PROMPT));
        assert!(request.messages[0].content.contains("## Message 3\nRole: tool"));
    }

    #[tokio::test]
    async fn tool_messages_after_boundary_are_preserved() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text("summary", 5)]));
        let store = store_with(vec![
            Message::user("a"),
            Message::assistant("b"),
            Message::user("c"),
            Message::tool_result("c1", "out"),
        ])
        .await;

        assert!(Compactor::new(provider, "m").compact(&store).await.is_compacted());
        let history = store.history().await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[1].content, "b");
        assert_eq!(history[3].role, Role::Tool);
    }

    #[tokio::test]
    async fn too_few_exchanges_skip() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let store = store_with(vec![Message::user("only one"), Message::tool_result("c", "x")]).await;

        let outcome = Compactor::new(provider.clone(), "m").compact(&store).await;
        assert_eq!(outcome, CompactionOutcome::Skipped);
        assert_eq!(provider.call_count(), 0);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn nothing_before_tail_skips() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let store = store_with(vec![Message::user("q"), Message::assistant("a")]).await;

        assert_eq!(
            Compactor::new(provider, "m").compact(&store).await,
            CompactionOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn failure_keeps_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::fail("connection reset")]));
        let store = store_with(long_history()).await;
        let before = store.history().await;

        let outcome = Compactor::new(provider, "m").compact(&store).await;
        assert!(matches!(outcome, CompactionOutcome::Failed(ref e) if e.contains("connection reset")));
        assert_eq!(store.history().await, before);
        assert_eq!(store.token_count().await, 9_000);
    }

    #[tokio::test]
    async fn empty_summary_keeps_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::empty(3)]));
        let store = store_with(long_history()).await;

        let outcome = Compactor::new(provider, "m").compact(&store).await;
        assert!(matches!(outcome, CompactionOutcome::Failed(_)));
        assert_eq!(store.len().await, 5);
    }
}
