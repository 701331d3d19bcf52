//! Built-in tools for quill.
//!
//! [`CoreToolProvider`] contributes the workspace tools every agent gets:
//! `bash`, `read_file`, `write_file` and `list_dir`. Tool registries are
//! assembled from an explicit provider list with [`build_registry`].

pub mod file_read;
pub mod file_write;
pub mod list_dir;
pub mod sandbox;
pub mod shell;

use std::sync::Arc;

use quill_core::agent::AgentSpec;
use quill_core::tool::{Tool, ToolContext, ToolProvider, ToolRegistry};
use quill_security::AuditLogger;
use tracing::debug;

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use list_dir::ListDirTool;
pub use sandbox::Sandbox;
pub use shell::BashTool;

/// Workspace tools: shell and file access scoped to the session work dir.
#[derive(Debug, Default)]
pub struct CoreToolProvider {
    audit: Option<Arc<AuditLogger>>,
}

impl CoreToolProvider {
    /// Record file tool path denials in `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }
}

impl ToolProvider for CoreToolProvider {
    fn name(&self) -> &str {
        "core"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn create_tools(&self, ctx: &ToolContext) -> Vec<Box<dyn Tool>> {
        let mut sandbox = Sandbox::from_context(ctx);
        if let Some(audit) = &self.audit {
            sandbox = sandbox.with_audit(audit.clone());
        }
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(FileReadTool::new(sandbox.clone())),
            Box::new(FileWriteTool::new(sandbox.clone())),
            Box::new(ListDirTool::new(sandbox)),
            Box::new(BashTool::from_context(ctx)),
        ];
        debug!(count = tools.len(), work_dir = %ctx.work_dir.display(), "Core tools created");
        tools
    }
}

/// The statically compiled provider list.
pub fn default_providers() -> Vec<Box<dyn ToolProvider>> {
    vec![Box::new(CoreToolProvider::default())]
}

/// [`default_providers`] with path denials recorded in `audit`.
pub fn audited_providers(audit: Arc<AuditLogger>) -> Vec<Box<dyn ToolProvider>> {
    vec![Box::new(CoreToolProvider::default().with_audit(audit))]
}

/// Build the registry for `agent` from `providers`.
pub fn build_registry(providers: &[Box<dyn ToolProvider>], agent: &AgentSpec, ctx: &ToolContext) -> ToolRegistry {
    ToolRegistry::from_providers(providers, agent, ctx)
}
