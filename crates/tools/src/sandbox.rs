//! Path scoping shared by the file tools.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quill_core::error::ToolError;
use quill_core::tool::ToolContext;
use quill_security::{AuditEvent, AuditLogger, AuditOutcome};

/// Resolves tool-supplied paths against the session work dir and the
/// configured allowed roots / forbidden prefixes. Denied paths are recorded
/// in the audit log when one is attached.
#[derive(Debug, Clone)]
pub struct Sandbox {
    work_dir: PathBuf,
    allowed_roots: Vec<String>,
    forbidden_paths: Vec<String>,
    audit: Option<Arc<AuditLogger>>,
}

impl Sandbox {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            allowed_roots: Vec::new(),
            forbidden_paths: Vec::new(),
            audit: None,
        }
    }

    pub fn with_restrictions(mut self, allowed_roots: Vec<String>, forbidden_paths: Vec<String>) -> Self {
        self.allowed_roots = allowed_roots;
        self.forbidden_paths = forbidden_paths;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn from_context(ctx: &ToolContext) -> Self {
        Self::new(&ctx.work_dir).with_restrictions(ctx.allowed_roots.clone(), ctx.forbidden_paths.clone())
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Resolve `raw` for `tool_name`. An empty path or `.` means the work dir.
    pub fn resolve(&self, tool_name: &str, raw: &str) -> Result<PathBuf, ToolError> {
        let raw = raw.trim();
        let raw = if raw.is_empty() { "." } else { raw };
        quill_security::resolve_path(&self.work_dir, raw, &self.allowed_roots, &self.forbidden_paths).map_err(|e| {
            let reason = e.to_string();
            if let Some(audit) = &self.audit {
                audit.log(
                    AuditEvent::PathDenied { path: raw.to_string() },
                    tool_name,
                    AuditOutcome::Denied,
                    Some(reason.clone()),
                );
            }
            ToolError::PermissionDenied {
                tool_name: tool_name.into(),
                reason,
            }
        })
    }
}
