//! Directory listing tool.

use std::fmt::Write as _;
use std::path::Path;

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;

use crate::sandbox::Sandbox;

/// Recursion stops below this depth.
const MAX_DEPTH: usize = 3;

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    path: String,
    #[serde(default)]
    recursive: bool,
}

pub struct ListDirTool {
    sandbox: Sandbox,
}

impl ListDirTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes}B")
    } else if b < KB * KB {
        format!("{:.1}KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.1}MB", b / (KB * KB))
    } else {
        format!("{:.1}GB", b / (KB * KB * KB))
    }
}

async fn render(dir: &Path, recursive: bool, depth: usize, out: &mut String) -> std::io::Result<()> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.file_name());

    let indent = "  ".repeat(depth);
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let meta = entry.metadata().await?;
        if meta.is_dir() {
            let _ = writeln!(out, "{indent}[dir] {name}/");
            if recursive && depth < MAX_DEPTH {
                Box::pin(render(&entry.path(), true, depth + 1, out)).await?;
            }
        } else {
            let _ = writeln!(out, "{indent}[file] {name} ({})", format_size(meta.len()));
        }
    }
    Ok(())
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List files and subdirectories of a directory (default: the working directory). \
         Set recursive to descend a few levels."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Include subdirectories"
                }
            }
        })
    }

    fn validate_arguments(&self, arguments: &serde_json::Value) -> Result<(), ToolError> {
        parse_arguments::<ListParams>(self.name(), arguments).map(|_| ())
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let params: ListParams = parse_arguments(self.name(), &arguments)?;
        let path = self.sandbox.resolve(self.name(), &params.path)?;

        if !path.exists() {
            return Ok(ToolResult::error(format!("Directory not found: {}", params.path)));
        }
        if !path.is_dir() {
            return Ok(ToolResult::error(format!("Not a directory: {}", params.path)));
        }

        let mut out = String::new();
        match render(&path, params.recursive, 0, &mut out).await {
            Ok(()) if out.is_empty() => Ok(ToolResult::success("(empty directory)")),
            Ok(()) => Ok(ToolResult::success(out)),
            Err(e) => Ok(ToolResult::error(format!("Failed to list directory: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "x".repeat(2048)).unwrap();
        dir
    }

    #[tokio::test]
    async fn lists_sorted_entries() {
        let dir = populated();
        let tool = ListDirTool::new(Sandbox::new(dir.path()));

        let result = tool.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(result.message.as_deref(), Some("[file] Cargo.toml (2.0KB)\n[dir] src/\n"));
    }

    #[tokio::test]
    async fn recursive_indents_children() {
        let dir = populated();
        let tool = ListDirTool::new(Sandbox::new(dir.path()));

        let result = tool
            .execute(serde_json::json!({"path": ".", "recursive": true}))
            .await
            .unwrap();
        assert!(result.message.unwrap().contains("  [file] main.rs (12B)"));
    }

    #[tokio::test]
    async fn file_path_is_rejected() {
        let dir = populated();
        let tool = ListDirTool::new(Sandbox::new(dir.path()));

        let result = tool.execute(serde_json::json!({"path": "Cargo.toml"})).await.unwrap();
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("Not a directory"));
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(10), "10B");
        assert_eq!(format_size(1536), "1.5KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0MB");
    }
}
