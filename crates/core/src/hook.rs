//! Lifecycle hooks: user code run around user input and tool calls.
//!
//! A hook observes; it cannot veto or rewrite. A failing hook is logged by
//! whoever fires it and the run carries on.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HookError;

/// Where in a run a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Before the user input is recorded
    PreUserInput,
    /// After the user input is recorded
    PostUserInput,
    /// After approval, right before the tool runs
    PreToolCall,
    /// After the tool returned a result
    PostToolCall,
    /// The run ended with an error
    OnError,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreUserInput => "pre_user_input",
            Self::PostUserInput => "post_user_input",
            Self::PreToolCall => "pre_tool_call",
            Self::PostToolCall => "post_tool_call",
            Self::OnError => "on_error",
        }
    }

    pub fn is_tool_point(&self) -> bool {
        matches!(self, Self::PreToolCall | Self::PostToolCall)
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hook gets to see. Fields not relevant to the point are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct HookContext {
    pub point: HookPoint,
    pub input: Option<String>,
    pub tool_name: Option<String>,
    pub tool_arguments: Option<String>,
    pub tool_result: Option<String>,
    pub error: Option<String>,
}

impl HookContext {
    fn at(point: HookPoint) -> Self {
        Self {
            point,
            input: None,
            tool_name: None,
            tool_arguments: None,
            tool_result: None,
            error: None,
        }
    }

    pub fn user_input(point: HookPoint, input: &str) -> Self {
        Self {
            input: Some(input.to_string()),
            ..Self::at(point)
        }
    }

    pub fn tool_call(point: HookPoint, name: &str, arguments: &str) -> Self {
        Self {
            tool_name: Some(name.to_string()),
            tool_arguments: Some(arguments.to_string()),
            ..Self::at(point)
        }
    }

    pub fn with_tool_result(mut self, result: impl Into<String>) -> Self {
        self.tool_result = Some(result.into());
        self
    }

    pub fn error(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::at(HookPoint::OnError)
        }
    }
}

#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    fn point(&self) -> HookPoint;

    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// Extra filter on top of the point, e.g. by tool name.
    fn applies_to(&self, _ctx: &HookContext) -> bool {
        true
    }

    async fn run(&self, ctx: &HookContext) -> Result<(), HookError>;
}
