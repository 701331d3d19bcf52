//! Execution specs for custom REPL commands.
//!
//! Each command names one way of executing: a shell script, a task handed
//! to the agent, or a composite list of steps. The kind is a serde tag, so an
//! unknown kind fails at parse time and the runner matches exhaustively.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionSpec {
    /// Run a shell script, inline or from a file
    Script {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script_file: Option<String>,
        /// Defaults to the session work dir
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
    },
    /// Hand a task to the agent
    Agent { task: String },
    /// Run steps in order
    Composite {
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        steps: Vec<CompositeStep>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeStep {
    #[serde(flatten)]
    pub action: StepAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Keep going when this step fails
    #[serde(default)]
    pub continue_on_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// A REPL line: a built-in slash command or a prompt for the agent
    Command { command: String },
    /// A shell script
    Script { script: String },
}

impl ExecutionSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Script { .. } => "script",
            Self::Agent { .. } => "agent",
            Self::Composite { .. } => "composite",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));
        match self {
            Self::Script {
                script,
                script_file,
                timeout_secs,
                ..
            } => {
                let has_script = script.as_deref().is_some_and(|s| !s.trim().is_empty());
                let has_file = script_file.as_deref().is_some_and(|s| !s.trim().is_empty());
                if has_script == has_file {
                    return invalid("script execution needs exactly one of 'script' or 'script_file'".into());
                }
                if *timeout_secs == 0 {
                    return invalid("script timeout_secs must be at least 1".into());
                }
            }
            Self::Agent { task } => {
                if task.trim().is_empty() {
                    return invalid("agent execution needs a non-empty 'task'".into());
                }
            }
            Self::Composite { timeout_secs, steps } => {
                if steps.is_empty() {
                    return invalid("composite execution needs at least one step".into());
                }
                if *timeout_secs == 0 {
                    return invalid("composite timeout_secs must be at least 1".into());
                }
                for (i, step) in steps.iter().enumerate() {
                    let body = match &step.action {
                        StepAction::Command { command } => command,
                        StepAction::Script { script } => script,
                    };
                    if body.trim().is_empty() {
                        return invalid(format!("composite step {} has an empty body", i + 1));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A custom `/name` command available in the REPL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default = "crate::default_true")]
    pub enabled: bool,
    pub execution: ExecutionSpec,
}

impl CommandConfig {
    /// Whether `/word` invokes this command.
    pub fn matches(&self, word: &str) -> bool {
        self.name == word || self.aliases.iter().any(|a| a == word)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) || name.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "invalid command name '{}'",
                self.name
            )));
        }
        self.execution
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("command '{}': {e}", self.name)))
    }
}
