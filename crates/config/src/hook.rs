//! Hooks declared in `config.toml`.
//!
//! A hook runs a shell script at one point of a run. Only script execution
//! is accepted: an agent task fired from inside a run would re-enter the
//! engine that is firing it.

use serde::{Deserialize, Serialize};

pub use quill_core::hook::HookPoint;

use crate::ConfigError;
use crate::execution::ExecutionSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "crate::default_true")]
    pub enabled: bool,
    pub on: HookPoint,
    /// Tool names this hook is limited to; empty means every tool
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    /// Higher runs first
    #[serde(default)]
    pub priority: i32,
    pub execution: ExecutionSpec,
}

impl HookConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.name.trim().is_empty() {
            return invalid("hook name must not be empty".into());
        }
        if !matches!(self.execution, ExecutionSpec::Script { .. }) {
            return invalid(format!(
                "hook '{}': only script execution is supported, got {}",
                self.name,
                self.execution.kind()
            ));
        }
        if !self.tools.is_empty() && !self.on.is_tool_point() {
            return invalid(format!(
                "hook '{}': 'tools' only applies to pre_tool_call and post_tool_call",
                self.name
            ));
        }
        self.execution
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("hook '{}': {e}", self.name)))
    }

    /// Whether the hook fires for a call to `tool`.
    pub fn covers_tool(&self, tool: &str) -> bool {
        self.tools.is_empty() || self.tools.iter().any(|t| t == tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> HookConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn script_hook_parses() {
        let hook = parse(
            r#"
name = "fmt"
on = "post_tool_call"
tools = ["write_file"]
priority = 5
[execution]
type = "script"
script = "cargo fmt"
"#,
        );
        assert!(hook.enabled);
        assert_eq!(hook.on, HookPoint::PostToolCall);
        assert!(hook.validate().is_ok());
        assert!(hook.covers_tool("write_file"));
        assert!(!hook.covers_tool("bash"));
    }

    #[test]
    fn agent_hooks_are_rejected() {
        let hook = parse(
            r#"
name = "recurse"
on = "on_error"
[execution]
type = "agent"
task = "fix it"
"#,
        );
        let err = hook.validate().unwrap_err().to_string();
        assert!(err.contains("only script execution"), "{err}");
    }

    #[test]
    fn tool_filter_needs_a_tool_point() {
        let hook = parse(
            r#"
name = "notify"
on = "pre_user_input"
tools = ["bash"]
[execution]
type = "script"
script = "true"
"#,
        );
        assert!(hook.validate().is_err());
    }

    #[test]
    fn unknown_point_fails_to_parse() {
        let parsed: Result<HookConfig, _> = toml::from_str(
            r#"
name = "x"
on = "before_lunch"
[execution]
type = "script"
script = "true"
"#,
        );
        assert!(parsed.is_err());
    }
}
