//! Assembles one streamed model turn from its chunks.

use quill_core::message::ToolCallRequest;
use quill_core::provider::{StreamChunk, ToolCallDelta, Usage};

#[derive(Debug)]
struct PartialCall {
    index: usize,
    id: Option<String>,
    name: String,
    arguments: String,
}

impl PartialCall {
    fn from_delta(delta: ToolCallDelta) -> Self {
        Self {
            index: delta.index,
            id: delta.id,
            name: delta.name.unwrap_or_default(),
            arguments: delta.arguments,
        }
    }

    /// Whether `delta` opens a call rather than continuing this one.
    fn is_superseded_by(&self, delta: &ToolCallDelta) -> bool {
        if delta.index != self.index {
            return true;
        }
        match (&delta.id, &delta.name) {
            (Some(id), _) => self.id.as_ref().is_some_and(|own| own != id),
            (None, Some(name)) => !self.name.is_empty() && &self.name != name,
            (None, None) => false,
        }
    }
}

/// A finished turn.
#[derive(Debug, Default)]
pub struct Turn {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Default)]
pub struct TurnAccumulator {
    content: String,
    calls: Vec<PartialCall>,
    usage: Option<Usage>,
    done: bool,
}

impl TurnAccumulator {
    /// Fold one chunk into the turn. Returns the text it carried, if any.
    pub fn push(&mut self, chunk: StreamChunk) -> Option<String> {
        for delta in chunk.tool_calls {
            self.push_delta(delta);
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
        self.done |= chunk.done;

        let text = chunk.content.filter(|t| !t.is_empty())?;
        self.content.push_str(&text);
        Some(text)
    }

    fn push_delta(&mut self, delta: ToolCallDelta) {
        match self.calls.last_mut() {
            Some(tail) if !tail.is_superseded_by(&delta) => {
                if tail.id.is_none() {
                    tail.id = delta.id;
                }
                if tail.name.is_empty()
                    && let Some(name) = delta.name
                {
                    tail.name = name;
                }
                tail.arguments.push_str(&delta.arguments);
            }
            _ => self.calls.push(PartialCall::from_delta(delta)),
        }
    }

    /// The provider marked the stream finished.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn finish(self) -> Turn {
        Turn {
            content: self.content,
            tool_calls: self
                .calls
                .into_iter()
                .map(|c| ToolCallRequest::new(c.id.unwrap_or_default(), c.name, c.arguments))
                .collect(),
            usage: self.usage,
        }
    }
}
