//! Agent configuration and run outcome types.

use serde::{Deserialize, Serialize};

/// A configured persona: system prompt, tool allowlist and step limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Tool names the agent may use. Empty allows every registered tool.
    #[serde(default)]
    pub tools: Vec<String>,

    /// Hard cap on model turns per run
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Consecutive turns without a tool call or answer before a warning
    #[serde(default = "default_max_thinking_steps")]
    pub max_thinking_steps: u32,

    /// Context size that triggers compaction
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u64,

    /// Runs that can be undone; older run checkpoints are dropped
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
}

fn default_name() -> String {
    "quill".into()
}
fn default_system_prompt() -> String {
    "You are quill, a coding assistant working inside the user's project directory. \
     Use the available tools to inspect and change files, run commands when needed, \
     and answer concisely once the task is done."
        .into()
}
fn default_max_steps() -> u32 {
    100
}
fn default_max_thinking_steps() -> u32 {
    5
}
fn default_max_context_tokens() -> u64 {
    128_000
}
fn default_max_checkpoints() -> usize {
    20
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            name: default_name(),
            system_prompt: default_system_prompt(),
            tools: Vec::new(),
            max_steps: default_max_steps(),
            max_thinking_steps: default_max_thinking_steps(),
            max_context_tokens: default_max_context_tokens(),
            max_checkpoints: default_max_checkpoints(),
        }
    }
}

impl AgentSpec {
    pub fn allows_tool(&self, name: &str) -> bool {
        self.tools.is_empty() || self.tools.iter().any(|t| t == name)
    }
}

/// Terminal outcome of one engine run.
///
/// Built only through [`ExecutionResult::success`], [`ExecutionResult::error`]
/// and [`ExecutionResult::interrupted`]: exactly one of `success` and
/// `interrupted` is set, and `error` is present only on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    success: bool,
    response: Option<String>,
    steps_executed: u32,
    tokens_used: u64,
    error: Option<String>,
    interrupted: bool,
}

impl ExecutionResult {
    pub fn success(response: impl Into<String>, steps_executed: u32, tokens_used: u64) -> Self {
        Self {
            success: true,
            response: Some(response.into()),
            steps_executed,
            tokens_used,
            error: None,
            interrupted: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            steps_executed: 0,
            tokens_used: 0,
            error: Some(message.into()),
            interrupted: false,
        }
    }

    pub fn interrupted() -> Self {
        Self {
            success: false,
            response: None,
            steps_executed: 0,
            tokens_used: 0,
            error: None,
            interrupted: true,
        }
    }

    /// Attach progress counters to a failed or interrupted result.
    pub fn with_progress(mut self, steps_executed: u32, tokens_used: u64) -> Self {
        self.steps_executed = steps_executed;
        self.tokens_used = tokens_used;
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn steps_executed(&self) -> u32 {
        self.steps_executed
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    /// Short outcome label used in events and logs.
    pub fn outcome(&self) -> &'static str {
        if self.success {
            "completed"
        } else if self.interrupted {
            "interrupted"
        } else {
            "failed"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_defaults() {
        let spec = AgentSpec::default();
        assert_eq!(spec.max_steps, 100);
        assert_eq!(spec.max_thinking_steps, 5);
        assert!(spec.allows_tool("anything"));
    }

    #[test]
    fn spec_allowlist() {
        let spec = AgentSpec {
            tools: vec!["read_file".into()],
            ..AgentSpec::default()
        };
        assert!(spec.allows_tool("read_file"));
        assert!(!spec.allows_tool("bash"));
    }

    #[test]
    fn result_flags_are_exclusive() {
        let ok = ExecutionResult::success("done", 1, 42);
        assert!(ok.is_success() && !ok.is_interrupted() && ok.error_message().is_none());

        let err = ExecutionResult::error("boom").with_progress(3, 10);
        assert!(!err.is_success() && !err.is_interrupted());
        assert_eq!(err.error_message(), Some("boom"));
        assert_eq!(err.steps_executed(), 3);

        let stop = ExecutionResult::interrupted();
        assert!(!stop.is_success() && stop.is_interrupted() && stop.error_message().is_none());
        assert_eq!(stop.outcome(), "interrupted");
    }
}
