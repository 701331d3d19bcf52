//! Scripted provider for exercising the engine without a model.
//!
//! Each call to `stream` consumes the next [`ScriptedTurn`]. Requests are
//! recorded so tests can inspect what the engine sent.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use quill_core::error::ProviderError;
use quill_core::message::Message;
use quill_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta, Usage,
};
use tokio::sync::mpsc;

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream these chunks, then close the stream
    Chunks(Vec<StreamChunk>),
    /// Fail the `stream` call itself
    Fail(ProviderError),
    /// Fail partway through the stream after sending these chunks
    Break(Vec<StreamChunk>, ProviderError),
    /// Open a stream that never yields, until the receiver goes away
    Stall,
}

fn usage(total_tokens: u32) -> Usage {
    Usage {
        prompt_tokens: total_tokens.saturating_sub(10),
        completion_tokens: total_tokens.min(10),
        total_tokens,
    }
}

impl ScriptedTurn {
    /// A plain text answer, streamed a word at a time.
    pub fn text(text: &str, total_tokens: u32) -> Self {
        let mut chunks: Vec<StreamChunk> = text
            .split_inclusive(' ')
            .map(StreamChunk::text)
            .collect();
        chunks.push(StreamChunk::done(Some(usage(total_tokens))));
        Self::Chunks(chunks)
    }

    /// A turn requesting the given `(id, name, arguments)` calls. Each call's
    /// arguments arrive split over two fragments.
    pub fn tool_calls(calls: &[(&str, &str, &str)], total_tokens: u32) -> Self {
        let mut chunks = Vec::new();
        for (index, (id, name, arguments)) in calls.iter().enumerate() {
            let split = arguments.len() / 2;
            let split = (0..=split).rev().find(|i| arguments.is_char_boundary(*i)).unwrap_or(0);
            chunks.push(StreamChunk::tool_call(ToolCallDelta {
                index,
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: arguments[..split].to_string(),
            }));
            chunks.push(StreamChunk::tool_call(ToolCallDelta {
                index,
                id: None,
                name: None,
                arguments: arguments[split..].to_string(),
            }));
        }
        chunks.push(StreamChunk::done(Some(usage(total_tokens))));
        Self::Chunks(chunks)
    }

    /// A turn with neither text nor tool calls.
    pub fn empty(total_tokens: u32) -> Self {
        Self::Chunks(vec![StreamChunk::done(Some(usage(total_tokens)))])
    }

    pub fn fail(message: &str) -> Self {
        Self::Fail(ProviderError::Network(message.to_string()))
    }
}

pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ProviderRequest>>,
    chunk_delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            chunk_delay: None,
        }
    }

    /// Pause between chunks.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<ProviderRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.recorded().clone()
    }

    pub fn call_count(&self) -> usize {
        self.recorded().len()
    }

    /// Turns not yet consumed.
    pub fn remaining(&self) -> usize {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn next_turn(&self, request: ProviderRequest) -> Result<ScriptedTurn, ProviderError> {
        self.recorded().push(request);
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: "scripted provider exhausted".into(),
            })
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        let chunks = match self.next_turn(request)? {
            ScriptedTurn::Chunks(chunks) => chunks,
            ScriptedTurn::Fail(e) | ScriptedTurn::Break(_, e) => return Err(e),
            ScriptedTurn::Stall => return Err(ProviderError::Timeout("scripted stall".into())),
        };
        let content: String = chunks.iter().filter_map(|c| c.content.as_deref()).collect();
        Ok(ProviderResponse {
            message: Message::assistant(content),
            usage: chunks.iter().find_map(|c| c.usage),
            model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let turn = self.next_turn(request)?;
        let (tx, rx) = mpsc::channel(16);
        let delay = self.chunk_delay;

        tokio::spawn(async move {
            let (chunks, failure) = match turn {
                ScriptedTurn::Chunks(chunks) => (chunks, None),
                ScriptedTurn::Break(chunks, e) => (chunks, Some(e)),
                ScriptedTurn::Fail(e) => (Vec::new(), Some(e)),
                ScriptedTurn::Stall => {
                    tx.closed().await;
                    return;
                }
            };
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            if let Some(e) = failure {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(rx)
    }
}
