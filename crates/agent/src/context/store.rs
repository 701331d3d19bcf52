//! The context store: exclusive owner of a session's message history.
//!
//! All state sits behind one `RwLock`, so a reader sees either the history
//! before a replacement or after it, never a mix. When a [`HistoryLog`] is
//! attached every mutation is appended to it; a failed write is logged and
//! the in-memory state stays authoritative.
//!
//! Only the newest `checkpoint_limit` checkpoints are kept.

use std::collections::{BTreeMap, HashSet};

use quill_core::message::{Message, Role};
use quill_session::{HistoryLog, HistoryRecord};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Checkpoints kept when no limit is configured.
pub const DEFAULT_CHECKPOINT_LIMIT: usize = 20;

/// Recorded for a tool call whose result never made it into the history.
pub const INTERRUPTED_TOOL_CALL: &str = "tool call interrupted before it returned a result";

#[derive(Debug, Clone)]
struct Checkpoint {
    history: Vec<Message>,
    token_count: u64,
}

#[derive(Debug, Default)]
struct ContextState {
    history: Vec<Message>,
    token_count: u64,
    checkpoints: BTreeMap<u32, Checkpoint>,
}

#[derive(Debug)]
pub struct ContextStore {
    state: RwLock<ContextState>,
    log: Option<HistoryLog>,
    checkpoint_limit: usize,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self {
            state: RwLock::default(),
            log: None,
            checkpoint_limit: DEFAULT_CHECKPOINT_LIMIT,
        }
    }
}

impl ContextStore {
    /// An in-memory store with no persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store backed by `log`, starting from whatever the log replays to.
    ///
    /// Tool calls left unanswered by a previous process are closed with an
    /// error result, and the repaired history is written back.
    pub fn restore(log: HistoryLog) -> Self {
        let restored = log.replay().unwrap_or_else(|e| {
            warn!(path = %log.path().display(), error = %e, "Could not read history log, starting empty");
            Default::default()
        });
        let mut history = restored.messages;
        let closed = close_unanswered_calls(&mut history);
        if closed > 0 {
            warn!(path = %log.path().display(), closed, "Closed tool calls left without results");
            if let Err(e) = log.append(&snapshot_records(&history, restored.token_count)) {
                warn!(error = %e, "Failed to append to history log");
            }
        }
        debug!(
            path = %log.path().display(),
            messages = history.len(),
            tokens = restored.token_count,
            "Context restored"
        );
        Self {
            state: RwLock::new(ContextState {
                history,
                token_count: restored.token_count,
                checkpoints: BTreeMap::new(),
            }),
            log: Some(log),
            checkpoint_limit: DEFAULT_CHECKPOINT_LIMIT,
        }
    }

    /// Keep at most `limit` checkpoints, evicting the oldest first.
    pub fn with_checkpoint_limit(mut self, limit: usize) -> Self {
        self.checkpoint_limit = limit;
        self
    }

    /// Append `records` to the log. Callers hold the state lock, so the log
    /// sees mutations in the same order as memory; the file write itself
    /// runs on the blocking pool.
    async fn persist(&self, records: Vec<HistoryRecord>) {
        let Some(log) = self.log.clone() else {
            return;
        };
        match tokio::task::spawn_blocking(move || log.append(&records)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to append to history log"),
            Err(e) => warn!(error = %e, "History log writer did not finish"),
        }
    }

    async fn persist_snapshot(&self, history: &[Message], token_count: u64) {
        if self.log.is_some() {
            self.persist(snapshot_records(history, token_count)).await;
        }
    }

    /// A copy of the history in order.
    pub async fn history(&self) -> Vec<Message> {
        self.state.read().await.history.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.history.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.history.is_empty()
    }

    pub async fn add_message(&self, message: Message) {
        self.add_messages(vec![message]).await;
    }

    /// Append messages in the given order.
    pub async fn add_messages(&self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        let mut state = self.state.write().await;
        let records: Vec<HistoryRecord> = match self.log {
            Some(_) => messages
                .iter()
                .cloned()
                .map(|message| HistoryRecord::Message { message })
                .collect(),
            None => Vec::new(),
        };
        state.history.extend(messages);
        self.persist(records).await;
    }

    pub async fn token_count(&self) -> u64 {
        self.state.read().await.token_count
    }

    pub async fn set_token_count(&self, count: u64) {
        let mut state = self.state.write().await;
        if state.token_count != count {
            state.token_count = count;
            self.persist(vec![HistoryRecord::TokenCount { count }]).await;
        }
    }

    /// Snapshot the current history and token count under `id`,
    /// replacing any earlier checkpoint with the same id. The oldest
    /// checkpoints are evicted once the limit is exceeded.
    pub async fn create_checkpoint(&self, id: u32) {
        let mut state = self.state.write().await;
        let checkpoint = Checkpoint {
            history: state.history.clone(),
            token_count: state.token_count,
        };
        state.checkpoints.insert(id, checkpoint);
        while state.checkpoints.len() > self.checkpoint_limit {
            state.checkpoints.pop_first();
        }
        debug!(id, messages = state.history.len(), "Checkpoint created");
    }

    /// Roll back to checkpoint `id`, discarding everything appended after it
    /// and every checkpoint newer than it. Unknown ids change nothing.
    pub async fn restore_checkpoint(&self, id: u32) -> bool {
        let mut state = self.state.write().await;
        let Some(checkpoint) = state.checkpoints.get(&id).cloned() else {
            return false;
        };
        state.checkpoints.retain(|k, _| *k <= id);
        state.history = checkpoint.history;
        state.token_count = checkpoint.token_count;
        self.persist_snapshot(&state.history, state.token_count).await;
        debug!(id, messages = state.history.len(), "Checkpoint restored");
        true
    }

    /// Id of the most recent checkpoint.
    pub async fn latest_checkpoint(&self) -> Option<u32> {
        self.state.read().await.checkpoints.keys().next_back().copied()
    }

    /// Forget checkpoint `id` without touching the history.
    pub async fn discard_checkpoint(&self, id: u32) -> bool {
        self.state.write().await.checkpoints.remove(&id).is_some()
    }

    /// Swap the whole history in one step (used by compaction).
    pub async fn replace_history(&self, messages: Vec<Message>, token_count: u64) {
        let mut state = self.state.write().await;
        state.history = messages;
        state.token_count = token_count;
        self.persist_snapshot(&state.history, token_count).await;
    }

    /// Give every tool call without a result an interrupted-error result.
    /// Returns how many calls were closed.
    pub async fn close_unanswered_calls(&self) -> usize {
        let mut state = self.state.write().await;
        let closed = close_unanswered_calls(&mut state.history);
        if closed > 0 {
            warn!(closed, "Closed tool calls left without results");
            self.persist_snapshot(&state.history, state.token_count).await;
        }
        closed
    }

    /// Drop history, token count and checkpoints.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = ContextState::default();
        self.persist_snapshot(&[], 0).await;
    }
}

fn snapshot_records(history: &[Message], token_count: u64) -> Vec<HistoryRecord> {
    let mut records = Vec::with_capacity(history.len() + 2);
    records.push(HistoryRecord::Reset);
    records.extend(history.iter().cloned().map(|message| HistoryRecord::Message { message }));
    records.push(HistoryRecord::TokenCount { count: token_count });
    records
}

/// Insert an error tool result right after the answered results of each
/// assistant turn whose calls did not all get one.
fn close_unanswered_calls(history: &mut Vec<Message>) -> usize {
    let mut closed = 0;
    let mut i = 0;
    while i < history.len() {
        if history[i].role != Role::Assistant || history[i].tool_calls.is_empty() {
            i += 1;
            continue;
        }

        let mut pending: Vec<String> = history[i].tool_calls.iter().map(|c| c.id.clone()).collect();
        i += 1;
        while i < history.len() && history[i].role == Role::Tool {
            if let Some(id) = &history[i].tool_call_id {
                pending.retain(|p| p != id);
            }
            i += 1;
        }

        let mut seen = HashSet::new();
        for id in pending.into_iter().filter(|id| seen.insert(id.clone())) {
            history.insert(i, Message::tool_result(id, INTERRUPTED_TOOL_CALL));
            i += 1;
            closed += 1;
        }
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::message::ToolCallRequest;

    #[tokio::test]
    async fn appends_in_order() {
        let store = ContextStore::new();
        store.add_message(Message::user("one")).await;
        store
            .add_messages(vec![Message::assistant("two"), Message::user("three")])
            .await;

        let texts: Vec<String> = store.history().await.into_iter().map(|m| m.content).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn restore_checkpoint_discards_later_history() {
        let store = ContextStore::new();
        store.add_message(Message::user("kept")).await;
        store.set_token_count(10).await;
        store.create_checkpoint(1).await;

        store.add_message(Message::assistant("dropped")).await;
        store.set_token_count(99).await;
        store.create_checkpoint(2).await;

        assert!(store.restore_checkpoint(1).await);
        let history = store.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "kept");
        assert_eq!(store.token_count().await, 10);
        assert_eq!(store.latest_checkpoint().await, Some(1));
    }

    #[tokio::test]
    async fn unknown_checkpoint_leaves_history() {
        let store = ContextStore::new();
        store.add_message(Message::user("hello")).await;
        assert!(!store.restore_checkpoint(42).await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn replace_history_swaps_atomically() {
        let store = ContextStore::new();
        store.add_messages(vec![Message::user("a"), Message::assistant("b")]).await;
        store.replace_history(vec![Message::assistant("summary")], 5).await;

        let history = store.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Assistant);
        assert_eq!(store.token_count().await, 5);
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let store = ContextStore::new();
        store.add_message(Message::user("x")).await;
        store.create_checkpoint(1).await;
        store.clear().await;
        assert!(store.is_empty().await);
        assert_eq!(store.latest_checkpoint().await, None);
    }

    #[tokio::test]
    async fn checkpoints_are_capped() {
        let store = ContextStore::new().with_checkpoint_limit(3);
        for id in 1..=10 {
            store.add_message(Message::user(format!("turn {id}"))).await;
            store.create_checkpoint(id).await;
        }

        assert_eq!(store.state.read().await.checkpoints.len(), 3);
        assert_eq!(store.latest_checkpoint().await, Some(10));
        assert!(!store.restore_checkpoint(7).await);
        assert!(store.restore_checkpoint(8).await);
        assert_eq!(store.len().await, 8);
    }

    #[tokio::test]
    async fn unanswered_calls_are_closed_in_place() {
        let store = ContextStore::new();
        store
            .add_messages(vec![
                Message::user("go"),
                Message::assistant_with_tools(
                    "",
                    vec![
                        ToolCallRequest::new("c1", "bash", "{}"),
                        ToolCallRequest::new("c2", "bash", "{}"),
                    ],
                ),
                Message::tool_result("c1", "ok"),
                Message::user("next"),
            ])
            .await;

        assert_eq!(store.close_unanswered_calls().await, 1);
        let history = store.history().await;
        assert_eq!(history.len(), 5);
        assert_eq!(history[3].role, Role::Tool);
        assert_eq!(history[3].tool_call_id.as_deref(), Some("c2"));
        assert_eq!(history[3].content, INTERRUPTED_TOOL_CALL);
        assert_eq!(history[4].content, "next");

        assert_eq!(store.close_unanswered_calls().await, 0);
    }

    #[tokio::test]
    async fn restore_closes_calls_cut_off_by_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history.jsonl"));

        let store = ContextStore::restore(log.clone());
        store
            .add_messages(vec![
                Message::user("run the tests"),
                Message::assistant_with_tools("", vec![ToolCallRequest::new("c1", "bash", "{}")]),
            ])
            .await;
        drop(store);

        let reopened = ContextStore::restore(log.clone());
        let roles: Vec<Role> = reopened.history().await.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);

        // the repair was written back
        let again = log.replay().unwrap();
        assert_eq!(again.messages.len(), 3);
        assert_eq!(again.messages[2].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn log_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history.jsonl"));

        let store = ContextStore::restore(log.clone());
        store.add_messages(vec![Message::user("a"), Message::assistant("b")]).await;
        store.set_token_count(30).await;
        store.create_checkpoint(1).await;
        store.add_message(Message::user("c")).await;
        store.restore_checkpoint(1).await;
        store.add_message(Message::user("d")).await;

        let reopened = ContextStore::restore(log);
        let texts: Vec<String> = reopened.history().await.into_iter().map(|m| m.content).collect();
        assert_eq!(texts, vec!["a", "b", "d"]);
        assert_eq!(reopened.token_count().await, 30);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_log_in_memory_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history.jsonl"));
        let store = std::sync::Arc::new(ContextStore::restore(log.clone()));

        let writers: Vec<_> = (0..8)
            .map(|w| {
                let store = store.clone();
                tokio::spawn(async move {
                    for i in 0..25 {
                        store.add_message(Message::user(format!("{w}-{i}"))).await;
                        store.set_token_count(i).await;
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let in_memory: Vec<String> = store.history().await.into_iter().map(|m| m.content).collect();
        let on_disk: Vec<String> = log.replay().unwrap().messages.into_iter().map(|m| m.content).collect();
        assert_eq!(in_memory.len(), 200);
        assert_eq!(on_disk, in_memory);
    }
}
