//! File write tool: create or overwrite a file. Needs approval.

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;
use tracing::info;

use crate::sandbox::Sandbox;

#[derive(Debug, Deserialize)]
struct WriteParams {
    path: String,
    content: String,
}

pub struct FileWriteTool {
    sandbox: Sandbox,
}

impl FileWriteTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it and any missing parent directories. \
         Overwrites an existing file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn approval_description(&self, arguments: &serde_json::Value) -> String {
        match parse_arguments::<WriteParams>(self.name(), arguments) {
            Ok(p) => format!("Write file: {} ({} bytes)", p.path, p.content.len()),
            Err(_) => format!("Write file: {arguments}"),
        }
    }

    fn validate_arguments(&self, arguments: &serde_json::Value) -> Result<(), ToolError> {
        parse_arguments::<WriteParams>(self.name(), arguments).map(|_| ())
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let params: WriteParams = parse_arguments(self.name(), &arguments)?;
        let path = self.sandbox.resolve(self.name(), &params.path)?;

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::error(format!("Failed to create directory: {e}")));
        }

        match tokio::fs::write(&path, &params.content).await {
            Ok(()) => {
                info!(path = %path.display(), bytes = params.content.len(), "File written");
                Ok(ToolResult::success(format!(
                    "Wrote {} bytes to {}",
                    params.content.len(),
                    params.path
                )))
            }
            Err(e) => Ok(ToolResult::error(format!("Failed to write file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(Sandbox::new(dir.path()));

        let result = tool
            .execute(serde_json::json!({"path": "out/new.txt", "content": "hello"}))
            .await
            .unwrap();
        assert!(result.ok, "{result:?}");
        assert_eq!(std::fs::read_to_string(dir.path().join("out/new.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "old").unwrap();
        let tool = FileWriteTool::new(Sandbox::new(dir.path()));

        tool.execute(serde_json::json!({"path": "f.txt", "content": "new"}))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn outside_allowed_roots_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let tool = FileWriteTool::new(Sandbox::new(dir.path()).with_restrictions(vec![root], vec![]));

        let target = other.path().join("x.txt");
        let result = tool
            .execute(serde_json::json!({"path": target.to_string_lossy(), "content": "x"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
        assert!(!target.exists());
    }

    #[test]
    fn approval_describes_target() {
        let tool = FileWriteTool::new(Sandbox::new("/tmp"));
        assert!(tool.requires_approval());
        assert_eq!(
            tool.approval_description(&serde_json::json!({"path": "a.rs", "content": "fn main() {}"})),
            "Write file: a.rs (12 bytes)"
        );
    }
}
