//! Running the script and agent halves of custom REPL commands.
//!
//! Arguments typed after `/name` reach a script as `ARGS` (the whole
//! string) and `ARG_1`, `ARG_2`, ... (whitespace-separated words).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

/// One script invocation.
#[derive(Debug, Clone)]
pub struct ScriptJob {
    pub script: String,
    pub working_dir: PathBuf,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub success: bool,
    pub timed_out: bool,
    pub output: String,
}

impl ScriptOutcome {
    fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            timed_out: false,
            output: output.into(),
        }
    }
}

/// Script source: inline text, or a file resolved against `work_dir`.
pub fn load_script(script: Option<&str>, script_file: Option<&str>, work_dir: &Path) -> Result<String, String> {
    match (script, script_file) {
        (Some(inline), _) if !inline.trim().is_empty() => Ok(inline.to_string()),
        (_, Some(file)) => {
            let path = work_dir.join(file);
            std::fs::read_to_string(&path).map_err(|e| format!("cannot read {}: {e}", path.display()))
        }
        _ => Err("no script to run".into()),
    }
}

pub fn resolve_dir(work_dir: &Path, working_dir: Option<&str>) -> PathBuf {
    match working_dir {
        Some(dir) if !dir.trim().is_empty() => work_dir.join(dir),
        _ => work_dir.to_path_buf(),
    }
}

/// Configured variables plus the argument variables, which win on conflict.
pub fn script_env(configured: &HashMap<String, String>, args: &str) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = configured.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    env.sort();
    env.push(("ARGS".into(), args.trim().to_string()));
    env.extend(
        args.split_whitespace()
            .enumerate()
            .map(|(i, word)| (format!("ARG_{}", i + 1), word.to_string())),
    );
    env
}

/// The prompt an agent command sends: the task, then any arguments.
pub fn agent_task(task: &str, args: &str) -> String {
    let args = args.trim();
    if args.is_empty() {
        task.to_string()
    } else {
        format!("{task}\n\n{args}")
    }
}

pub async fn run_script(job: &ScriptJob) -> ScriptOutcome {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", &job.script]);
        cmd
    } else {
        let mut cmd = Command::new("bash");
        cmd.args(["-c", &job.script]);
        cmd
    };
    cmd.current_dir(&job.working_dir)
        .envs(job.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(working_dir = %job.working_dir.display(), timeout_secs = job.timeout.as_secs(), "Running script");

    let output = match tokio::time::timeout(job.timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return ScriptOutcome::failed(format!("failed to start script: {e}")),
        Err(_) => {
            warn!(timeout_secs = job.timeout.as_secs(), "Script timed out");
            return ScriptOutcome {
                timed_out: true,
                ..ScriptOutcome::failed(format!("script timed out after {}s", job.timeout.as_secs()))
            };
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.status.success() {
        ScriptOutcome {
            success: true,
            timed_out: false,
            output: text,
        }
    } else {
        let code = output.status.code().unwrap_or(-1);
        ScriptOutcome::failed(format!("{text}exit code {code}"))
    }
}
