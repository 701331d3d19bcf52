//! Tool trait: the abstraction over assistant capabilities.
//!
//! Tools let the model act on the workspace: run shell commands, read and
//! write files, list directories. Tools are contributed by [`ToolProvider`]s,
//! collected into a [`ToolRegistry`], and invoked by the engine's tool
//! pipeline, which owns argument repair, approval and timeouts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::agent::AgentSpec;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Timeout applied to a tool call unless the tool asks for another one.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// The outcome of one tool call. Exactly one result is produced per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: None,
            error: Some(error.into()),
        }
    }

    /// The user declined the call.
    pub fn rejected() -> Self {
        Self::error("tool call rejected by user")
    }

    pub fn not_found(name: &str) -> Self {
        Self::error(format!("tool not found: {name}"))
    }

    /// Text placed into the tool message the model observes.
    pub fn to_content(&self) -> String {
        let text = if self.ok { &self.message } else { &self.error };
        text.clone().unwrap_or_default()
    }
}

/// Deserialize tool arguments into a tool's declared parameter struct.
///
/// Positional arrays produced by the argument normalizer deserialize into
/// the struct's fields in declaration order.
pub fn parse_arguments<P: DeserializeOwned>(
    tool_name: &str,
    arguments: &serde_json::Value,
) -> std::result::Result<P, ToolError> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| ToolError::InvalidArguments(format!("{tool_name}: {e}")))
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "bash", "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Whether a call must pass the approval gate before running.
    fn requires_approval(&self) -> bool {
        false
    }

    /// Label under which a session-wide approval is cached.
    fn approval_action(&self) -> String {
        self.name().to_string()
    }

    /// Human-readable summary shown when asking for approval.
    fn approval_description(&self, arguments: &serde_json::Value) -> String {
        format!("{} {}", self.name(), arguments)
    }

    fn timeout(&self, _arguments: &serde_json::Value) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }

    /// Check that `arguments` fit the declared parameter shape.
    ///
    /// Called before approval and execution; a failure means the tool is
    /// never invoked.
    fn validate_arguments(&self, _arguments: &serde_json::Value) -> std::result::Result<(), ToolError> {
        Ok(())
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Everything a provider needs to construct tools for one session.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Relative paths are resolved against this directory
    pub work_dir: PathBuf,
    pub default_timeout: Duration,
    pub allowed_roots: Vec<String>,
    pub forbidden_paths: Vec<String>,
}

impl ToolContext {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            allowed_roots: Vec::new(),
            forbidden_paths: Vec::new(),
        }
    }
}

/// A statically registered source of tools.
///
/// Providers are listed explicitly at startup; [`ToolRegistry::from_providers`]
/// asks each one whether it supports the agent and registers the tools of
/// supporting providers in priority order.
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, _agent: &AgentSpec) -> bool {
        true
    }

    /// Higher runs first. When two providers offer the same tool name, the
    /// higher-priority one wins.
    fn priority(&self) -> i32 {
        0
    }

    fn create_tools(&self, ctx: &ToolContext) -> Vec<Box<dyn Tool>>;
}

/// A registry of available tools, resolved by name.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Build the registry for `agent` from a static provider list.
    pub fn from_providers(providers: &[Box<dyn ToolProvider>], agent: &AgentSpec, ctx: &ToolContext) -> Self {
        let mut selected: Vec<&dyn ToolProvider> = providers
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| p.supports(agent))
            .collect();
        selected.sort_by_key(|p| std::cmp::Reverse(p.priority()));

        let mut registry = Self::new();
        for provider in selected {
            for tool in provider.create_tools(ctx) {
                if !agent.allows_tool(tool.name()) {
                    continue;
                }
                if !registry.register_if_absent(tool) {
                    tracing::debug!(provider = provider.name(), "Tool shadowed by a higher-priority provider");
                }
            }
        }
        registry
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Register a tool unless the name is taken. Returns whether it was added.
    pub fn register_if_absent(&mut self, tool: Box<dyn Tool>) -> bool {
        if self.tools.contains_key(tool.name()) {
            return false;
        }
        self.register(tool);
        true
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Tool definitions for the LLM, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct EchoParams {
        text: String,
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        fn validate_arguments(&self, arguments: &serde_json::Value) -> Result<(), ToolError> {
            parse_arguments::<EchoParams>(self.name(), arguments).map(|_| ())
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            let params: EchoParams = parse_arguments(self.name(), &arguments)?;
            Ok(ToolResult::success(params.text))
        }
    }

    struct LoudEcho;

    #[async_trait]
    impl Tool for LoudEcho {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes loudly"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::success("ECHO"))
        }
    }

    struct Fixed {
        name: &'static str,
        priority: i32,
        loud: bool,
    }

    impl ToolProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn create_tools(&self, _ctx: &ToolContext) -> Vec<Box<dyn Tool>> {
            if self.loud {
                vec![Box::new(LoudEcho)]
            } else {
                vec![Box::new(EchoTool)]
            }
        }
    }

    #[test]
    fn registry_register_and_resolve() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.resolve("echo").is_some());
        assert!(registry.resolve("nonexistent").is_none());
        assert_eq!(registry.definitions()[0].name, "echo");
    }

    #[test]
    fn positional_arguments_fill_fields_in_order() {
        let params: EchoParams = parse_arguments("echo", &serde_json::json!(["hello"])).unwrap();
        assert_eq!(params.text, "hello");

        let err = parse_arguments::<EchoParams>("echo", &serde_json::json!({"txt": 1})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn higher_priority_provider_wins_name_clash() {
        let providers: Vec<Box<dyn ToolProvider>> = vec![
            Box::new(Fixed { name: "low", priority: 0, loud: false }),
            Box::new(Fixed { name: "high", priority: 10, loud: true }),
        ];
        let registry = ToolRegistry::from_providers(&providers, &AgentSpec::default(), &ToolContext::new("."));
        assert_eq!(registry.len(), 1);
        let result = registry.resolve("echo").unwrap().execute(serde_json::json!({})).await.unwrap();
        assert_eq!(result.message.as_deref(), Some("ECHO"));
    }

    #[test]
    fn allowlist_filters_tools() {
        let providers: Vec<Box<dyn ToolProvider>> = vec![Box::new(Fixed { name: "p", priority: 0, loud: false })];
        let agent = AgentSpec {
            tools: vec!["bash".into()],
            ..AgentSpec::default()
        };
        let registry = ToolRegistry::from_providers(&providers, &agent, &ToolContext::new("."));
        assert!(registry.is_empty());
    }

    #[test]
    fn result_content_picks_message_or_error() {
        assert_eq!(ToolResult::success("fine").to_content(), "fine");
        assert_eq!(ToolResult::error("boom").to_content(), "boom");
        assert!(!ToolResult::rejected().ok);
        assert!(ToolResult::not_found("x").to_content().contains("tool not found"));
    }
}
