//! Engine event stream.
//!
//! The engine publishes what it is doing (step boundaries, streamed text,
//! tool calls, compaction, status warnings) on an [`EventBus`]. Front ends
//! subscribe and render; the engine never waits on a subscriber.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything the engine reports while a run is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    StepBegin { step: u32 },

    /// A piece of assistant text, in stream order
    ContentDelta { text: String },

    ToolCallStarted { id: String, name: String },

    ToolCallFinished { id: String, name: String, ok: bool },

    /// A user-visible notice, e.g. the bounded-thinking warning
    StatusUpdate { message: String },

    CompactionBegin,

    CompactionEnd { compacted: bool },

    /// Context size after a step
    TokenUsage { count: u64 },

    StepInterrupted { step: u32 },

    RunFinished { outcome: String },
}

impl EngineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StepBegin { .. } => "step_begin",
            Self::ContentDelta { .. } => "content_delta",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolCallFinished { .. } => "tool_call_finished",
            Self::StatusUpdate { .. } => "status_update",
            Self::CompactionBegin => "compaction_begin",
            Self::CompactionEnd { .. } => "compaction_end",
            Self::TokenUsage { .. } => "token_usage",
            Self::StepInterrupted { .. } => "step_interrupted",
            Self::RunFinished { .. } => "run_finished",
        }
    }
}

/// A broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. A slow
/// subscriber lags and loses events; it never blocks the engine.
pub struct EventBus {
    sender: broadcast::Sender<Arc<EngineEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EngineEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
