//! File read tool: whole files or a line window.

use std::fmt::Write as _;

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;

use crate::sandbox::Sandbox;

#[derive(Debug, Deserialize)]
struct ReadParams {
    path: String,
    /// 1-based first line
    #[serde(default)]
    offset: Option<usize>,
    /// Number of lines
    #[serde(default)]
    limit: Option<usize>,
}

pub struct FileReadTool {
    sandbox: Sandbox,
}

impl FileReadTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

/// Number the selected lines, `cat -n` style.
fn window(content: &str, offset: Option<usize>, limit: Option<usize>) -> String {
    let start = offset.unwrap_or(1).max(1) - 1;
    let take = limit.unwrap_or(usize::MAX);
    let mut out = String::new();
    for (i, line) in content.lines().enumerate().skip(start).take(take) {
        let _ = writeln!(out, "{:>6}\t{line}", i + 1);
    }
    out
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file. Relative paths are resolved against the working directory. \
         Pass offset (1-based line) and limit to read part of a large file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "First line to read, 1-based"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read"
                }
            },
            "required": ["path"]
        })
    }

    fn validate_arguments(&self, arguments: &serde_json::Value) -> Result<(), ToolError> {
        parse_arguments::<ReadParams>(self.name(), arguments).map(|_| ())
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let params: ReadParams = parse_arguments(self.name(), &arguments)?;
        let path = self.sandbox.resolve(self.name(), &params.path)?;

        if path.is_dir() {
            return Ok(ToolResult::error(format!("Path is a directory, not a file: {}", params.path)));
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) if params.offset.is_none() && params.limit.is_none() => Ok(ToolResult::success(content)),
            Ok(content) => Ok(ToolResult::success(window(&content, params.offset, params.limit))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(ToolResult::error(format!("File not found: {}", params.path)))
            }
            Err(e) => Ok(ToolResult::error(format!("Failed to read file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_in(dir: &std::path::Path) -> FileReadTool {
        FileReadTool::new(Sandbox::new(dir))
    }

    #[test]
    fn tool_definition() {
        let tool = tool_in(std::path::Path::new("/tmp"));
        assert_eq!(tool.name(), "read_file");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path"]));
        assert!(!tool.requires_approval());
    }

    #[tokio::test]
    async fn reads_relative_to_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "Hello, world!\n").unwrap();

        let result = tool_in(dir.path())
            .execute(serde_json::json!({"path": "notes.txt"}))
            .await
            .unwrap();
        assert!(result.ok);
        assert_eq!(result.message.as_deref(), Some("Hello, world!\n"));
    }

    #[tokio::test]
    async fn window_numbers_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\nc\nd\n").unwrap();

        let result = tool_in(dir.path())
            .execute(serde_json::json!(["f.txt", 2, 2]))
            .await
            .unwrap();
        assert_eq!(result.message.as_deref(), Some("     2\tb\n     3\tc\n"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool_in(dir.path())
            .execute(serde_json::json!({"path": "nope.txt"}))
            .await
            .unwrap();
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[tokio::test]
    async fn directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool_in(dir.path())
            .execute(serde_json::json!({"path": "."}))
            .await
            .unwrap();
        assert!(!result.ok);
    }

    #[tokio::test]
    async fn forbidden_path_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(Sandbox::new(dir.path()).with_restrictions(vec![], vec!["/etc".into()]));
        let result = tool.execute(serde_json::json!({"path": "/etc/shadow"})).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[test]
    fn missing_path_fails_validation() {
        let tool = tool_in(std::path::Path::new("/tmp"));
        assert!(tool.validate_arguments(&serde_json::json!({"offset": 1})).is_err());
    }
}
