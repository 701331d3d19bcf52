//! Shell tool: run a command in the session's working directory.
//!
//! Every call needs approval. The child is spawned with `kill_on_drop`, so
//! when the pipeline's timeout drops the future the process is killed.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{Tool, ToolContext, ToolResult, parse_arguments};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

/// Upper bound for a caller-supplied timeout.
const MAX_TIMEOUT_SECS: u64 = 600;

/// Output beyond this many bytes is cut.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct BashParams {
    command: String,
    /// Seconds
    #[serde(default)]
    timeout: Option<u64>,
}

pub struct BashTool {
    work_dir: PathBuf,
    default_timeout: Duration,
}

impl BashTool {
    pub fn new(work_dir: impl Into<PathBuf>, default_timeout: Duration) -> Self {
        Self {
            work_dir: work_dir.into(),
            default_timeout,
        }
    }

    pub fn from_context(ctx: &ToolContext) -> Self {
        Self::new(&ctx.work_dir, ctx.default_timeout)
    }

    fn command(&self, line: &str) -> Command {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", line]);
            cmd
        } else {
            let mut cmd = Command::new("bash");
            cmd.args(["-c", line]);
            cmd
        };
        cmd.current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n[output truncated]");
    }
    text
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in the working directory and return its combined output. \
         Optionally set a timeout in seconds (default 60)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds"
                }
            },
            "required": ["command"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn approval_description(&self, arguments: &serde_json::Value) -> String {
        match parse_arguments::<BashParams>(self.name(), arguments) {
            Ok(p) => format!("Execute command: {}", p.command),
            Err(_) => format!("Execute command: {arguments}"),
        }
    }

    fn timeout(&self, arguments: &serde_json::Value) -> Duration {
        parse_arguments::<BashParams>(self.name(), arguments)
            .ok()
            .and_then(|p| p.timeout)
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs.min(MAX_TIMEOUT_SECS)))
            .unwrap_or(self.default_timeout)
    }

    fn validate_arguments(&self, arguments: &serde_json::Value) -> Result<(), ToolError> {
        let params: BashParams = parse_arguments(self.name(), arguments)?;
        if params.command.trim().is_empty() {
            return Err(ToolError::InvalidArguments("bash: command is empty".into()));
        }
        Ok(())
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let params: BashParams = parse_arguments(self.name(), &arguments)?;
        debug!(command = %params.command, work_dir = %self.work_dir.display(), "Executing shell command");

        let output = self
            .command(&params.command)
            .output()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "bash".into(),
                reason: e.to_string(),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        let text = truncate(text);

        if output.status.success() {
            if text.trim().is_empty() {
                return Ok(ToolResult::success("Command completed with no output"));
            }
            return Ok(ToolResult::success(text));
        }

        let code = output.status.code().unwrap_or(-1);
        warn!(command = %params.command, exit_code = code, "Command failed");
        Ok(ToolResult::error(format!("Command failed with exit code {code}\n{text}")))
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    fn tool(dir: &std::path::Path) -> BashTool {
        BashTool::new(dir, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn runs_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();

        let result = tool(dir.path())
            .execute(serde_json::json!({"command": "ls"}))
            .await
            .unwrap();
        assert!(result.ok);
        assert!(result.message.unwrap().contains("marker.txt"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool(dir.path())
            .execute(serde_json::json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert!(!result.ok);
        let error = result.error.unwrap();
        assert!(error.contains("exit code 3"));
        assert!(error.contains("oops"));
    }

    #[tokio::test]
    async fn empty_output_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool(dir.path())
            .execute(serde_json::json!({"command": "true"}))
            .await
            .unwrap();
        assert_eq!(result.message.as_deref(), Some("Command completed with no output"));
    }

    #[tokio::test]
    async fn dropped_future_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let t = tool(dir.path());
        let args = serde_json::json!({"command": "sleep 5; touch late.txt", "timeout": 1});
        assert_eq!(t.timeout(&args), Duration::from_secs(1));

        let elapsed = tokio::time::timeout(Duration::from_millis(200), t.execute(args)).await;
        assert!(elapsed.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!dir.path().join("late.txt").exists());
    }

    #[test]
    fn approval_and_timeout_come_from_arguments() {
        let t = BashTool::new("/tmp", Duration::from_secs(60));
        let args = serde_json::json!({"command": "rm -rf build"});
        assert!(t.requires_approval());
        assert_eq!(t.approval_description(&args), "Execute command: rm -rf build");
        assert_eq!(t.timeout(&args), Duration::from_secs(60));
        assert_eq!(
            t.timeout(&serde_json::json!({"command": "x", "timeout": 10_000})),
            Duration::from_secs(MAX_TIMEOUT_SECS)
        );
    }

    #[test]
    fn empty_command_fails_validation() {
        let t = BashTool::new("/tmp", Duration::from_secs(60));
        assert!(t.validate_arguments(&serde_json::json!({"command": "  "})).is_err());
        assert!(t.validate_arguments(&serde_json::json!({})).is_err());
        assert!(t.validate_arguments(&serde_json::json!(["ls -la"])).is_ok());
    }

    #[test]
    fn long_output_is_truncated() {
        let text = truncate("x".repeat(MAX_OUTPUT_BYTES + 10));
        assert!(text.ends_with("[output truncated]"));
    }
}
