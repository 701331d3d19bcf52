//! Configuration loading, validation, and management for quill.
//!
//! Loads configuration from `~/.quill/config.toml` (or `$QUILL_HOME`) with
//! environment variable overrides. Validates all settings at startup; an
//! invalid file is an error, never silently replaced by defaults.

pub mod execution;
pub mod hook;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use execution::{CommandConfig, CompositeStep, ExecutionSpec, StepAction};
pub use hook::{HookConfig, HookPoint};
pub use quill_core::agent::AgentSpec;

/// The root configuration structure.
///
/// Maps directly to `config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub agent: AgentSpec,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Custom REPL commands
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandConfig>,

    /// Scripts fired at points of a run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<HookConfig>,
}

/// Which model endpoint to talk to.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// openai, openrouter, ollama, deepseek, groq, or any name with a `base_url`
    #[serde(default = "default_provider")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Overrides the well-known URL for `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-response completion limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
pub(crate) fn default_true() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider(),
            api_key: None,
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("approval", &self.approval)
            .field("tools", &self.tools)
            .field("commands", &self.commands)
            .field("hooks", &self.hooks)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Approve every tool call without asking
    #[serde(default)]
    pub yolo: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default per-call timeout
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    /// Roots file tools may touch. Empty allows everything not forbidden.
    #[serde(default)]
    pub allowed_roots: Vec<String>,

    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,
}

fn default_tool_timeout() -> u64 {
    60
}

fn default_forbidden_paths() -> Vec<String> {
    vec![
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
        "/etc/shadow".into(),
        "/etc/sudoers".into(),
    ]
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            allowed_roots: Vec::new(),
            forbidden_paths: default_forbidden_paths(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path, then apply environment
    /// overrides:
    /// - `QUILL_API_KEY`, falling back to `OPENAI_API_KEY` (only when the
    ///   file sets no key)
    /// - `QUILL_PROVIDER`, `QUILL_MODEL`, `QUILL_BASE_URL`
    /// - `QUILL_YOLO` (`1`, `true` or `yes`)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::read(&config_path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides read through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let set = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if self.provider.api_key.is_none() {
            self.provider.api_key = set("QUILL_API_KEY").or_else(|| set("OPENAI_API_KEY"));
        }
        if let Some(name) = set("QUILL_PROVIDER") {
            self.provider.name = name;
        }
        if let Some(model) = set("QUILL_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = set("QUILL_BASE_URL") {
            self.provider.base_url = Some(url);
        }
        if let Some(yolo) = set("QUILL_YOLO") {
            self.approval.yolo = matches!(yolo.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// The configuration directory: `$QUILL_HOME`, else `~/.quill`.
    pub fn config_dir() -> PathBuf {
        match std::env::var("QUILL_HOME") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => dirs_home().join(".quill"),
        }
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Where session directories live.
    pub fn sessions_dir() -> PathBuf {
        Self::config_dir().join("sessions")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::ValidationError(msg.into()));

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return fail("provider.temperature must be between 0.0 and 2.0");
        }
        if self.provider.model.trim().is_empty() {
            return fail("provider.model must not be empty");
        }
        if self.agent.max_steps == 0 {
            return fail("agent.max_steps must be at least 1");
        }
        if self.agent.max_thinking_steps == 0 {
            return fail("agent.max_thinking_steps must be at least 1");
        }
        if self.agent.max_context_tokens == 0 {
            return fail("agent.max_context_tokens must be at least 1");
        }
        if self.agent.max_checkpoints == 0 {
            return fail("agent.max_checkpoints must be at least 1");
        }
        if self.tools.timeout_secs == 0 {
            return fail("tools.timeout_secs must be at least 1");
        }

        let mut names = std::collections::HashSet::new();
        for command in &self.commands {
            command.validate()?;
            for word in std::iter::once(&command.name).chain(&command.aliases) {
                if !names.insert(word.as_str()) {
                    return Err(ConfigError::ValidationError(format!(
                        "command name '{word}' is defined twice"
                    )));
                }
            }
        }

        let mut hook_names = std::collections::HashSet::new();
        for hook in &self.hooks {
            hook.validate()?;
            if !hook_names.insert(hook.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "hook name '{}' is defined twice",
                    hook.name
                )));
            }
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `quill config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for quill_core::Error {
    fn from(e: ConfigError) -> Self {
        quill_core::Error::Config { message: e.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.name, "openai");
        assert_eq!(config.agent.max_steps, 100);
        assert_eq!(config.agent.max_thinking_steps, 5);
        assert_eq!(config.tools.timeout_secs, 60);
        assert!(!config.approval.yolo);
    }

    #[test]
    fn config_roundtrip_toml() {
        let toml_str = AppConfig::default_toml();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.model, "gpt-4o-mini");
        assert_eq!(parsed.agent.max_context_tokens, 128_000);
        assert_eq!(parsed.tools.forbidden_paths, default_forbidden_paths());
    }

    #[test]
    fn invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.provider.temperature = 5.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.max_steps = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.tools.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.max_checkpoints = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider.name, "openai");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\nmax_steps = ").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[provider]
name = "ollama"
model = "qwen2.5-coder"

[agent]
max_steps = 20
tools = ["read_file", "list_dir"]

[[commands]]
name = "review"
aliases = ["rv"]
description = "Review the working tree"
[commands.execution]
type = "agent"
task = "Review the uncommitted changes"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.provider.name, "ollama");
        assert_eq!(config.provider.temperature, 0.7);
        assert_eq!(config.agent.max_steps, 20);
        assert_eq!(config.agent.max_thinking_steps, 5);
        assert!(config.agent.allows_tool("list_dir"));
        assert!(!config.agent.allows_tool("bash"));
        assert!(config.commands[0].matches("rv"));
        assert!(config.commands[0].enabled);
    }

    #[test]
    fn invalid_command_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[[commands]]
name = "build"
[commands.execution]
type = "script"
"#,
        )
        .unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn duplicate_command_names_rejected() {
        let mut config = AppConfig::default();
        for name in ["a", "a"] {
            config.commands.push(CommandConfig {
                name: name.into(),
                description: String::new(),
                aliases: vec![],
                enabled: true,
                execution: ExecutionSpec::Agent { task: "x".into() },
            });
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn hooks_load_and_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let hook = r#"
[[hooks]]
name = "lint"
on = "post_tool_call"
tools = ["write_file"]
[hooks.execution]
type = "script"
script = "make lint"
"#;
        std::fs::write(&path, hook).unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.hooks.len(), 1);
        assert_eq!(config.hooks[0].on, HookPoint::PostToolCall);

        std::fs::write(&path, format!("{hook}{hook}")).unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-env"),
            ("QUILL_MODEL", "gpt-4.1"),
            ("QUILL_YOLO", "true"),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.provider.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.provider.model, "gpt-4.1");
        assert!(config.approval.yolo);
    }

    #[test]
    fn file_key_wins_over_env() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-file".into());
        config.apply_overrides(|k| (k == "QUILL_API_KEY").then(|| "sk-env".to_string()));
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("[REDACTED]"));
    }
}
