//! Script hooks from `[[hooks]]` in `config.toml`.
//!
//! The script sees the firing point as `QUILL_HOOK_POINT` and whatever the
//! point carries as `QUILL_INPUT`, `QUILL_TOOL_NAME`, `QUILL_TOOL_ARGS`,
//! `QUILL_TOOL_RESULT` or `QUILL_ERROR`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quill_agent::HookRegistry;
use quill_config::{AppConfig, ExecutionSpec, HookConfig};
use quill_core::error::HookError;
use quill_core::hook::{Hook, HookContext, HookPoint};
use tracing::{debug, info};

use super::custom::{self, ScriptJob};

pub struct ScriptHook {
    name: String,
    point: HookPoint,
    priority: i32,
    tools: Vec<String>,
    script: Option<String>,
    script_file: Option<String>,
    working_dir: PathBuf,
    timeout: Duration,
    env: HashMap<String, String>,
    work_dir: PathBuf,
}

impl ScriptHook {
    /// `None` for anything but script execution, which validation rejects.
    pub fn from_config(config: &HookConfig, work_dir: &Path) -> Option<Self> {
        let ExecutionSpec::Script {
            script,
            script_file,
            working_dir,
            timeout_secs,
            env,
        } = &config.execution
        else {
            return None;
        };
        Some(Self {
            name: config.name.clone(),
            point: config.on,
            priority: config.priority,
            tools: config.tools.clone(),
            script: script.clone(),
            script_file: script_file.clone(),
            working_dir: custom::resolve_dir(work_dir, working_dir.as_deref()),
            timeout: Duration::from_secs(*timeout_secs),
            env: env.clone(),
            work_dir: work_dir.to_path_buf(),
        })
    }

    fn job_env(&self, ctx: &HookContext) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        env.sort();
        env.push(("QUILL_HOOK_POINT".into(), ctx.point.as_str().into()));
        let carried = [
            ("QUILL_INPUT", &ctx.input),
            ("QUILL_TOOL_NAME", &ctx.tool_name),
            ("QUILL_TOOL_ARGS", &ctx.tool_arguments),
            ("QUILL_TOOL_RESULT", &ctx.tool_result),
            ("QUILL_ERROR", &ctx.error),
        ];
        env.extend(
            carried
                .into_iter()
                .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone()))),
        );
        env
    }
}

#[async_trait]
impl Hook for ScriptHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn point(&self) -> HookPoint {
        self.point
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn applies_to(&self, ctx: &HookContext) -> bool {
        match &ctx.tool_name {
            Some(tool) if !self.tools.is_empty() => self.tools.iter().any(|t| t == tool),
            _ => true,
        }
    }

    async fn run(&self, ctx: &HookContext) -> Result<(), HookError> {
        let script = custom::load_script(self.script.as_deref(), self.script_file.as_deref(), &self.work_dir)
            .map_err(|reason| HookError::Failed {
                hook: self.name.clone(),
                reason,
            })?;
        let job = ScriptJob {
            script,
            working_dir: self.working_dir.clone(),
            timeout: self.timeout,
            env: self.job_env(ctx),
        };

        let outcome = custom::run_script(&job).await;
        if outcome.timed_out {
            return Err(HookError::Timeout {
                hook: self.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            });
        }
        if !outcome.success {
            return Err(HookError::Failed {
                hook: self.name.clone(),
                reason: outcome.output.trim().to_string(),
            });
        }
        debug!(hook = %self.name, output = %outcome.output.trim(), "Hook script finished");
        Ok(())
    }
}

/// Registry of every enabled hook in `config`, run from `work_dir`.
pub fn build_hooks(config: &AppConfig, work_dir: &Path) -> HookRegistry {
    let mut registry = HookRegistry::new();
    for hook in config.hooks.iter().filter(|h| h.enabled) {
        if let Some(script_hook) = ScriptHook::from_config(hook, work_dir) {
            registry.register(Arc::new(script_hook));
        }
    }
    if !registry.is_empty() {
        info!(hooks = registry.len(), "Hooks registered");
    }
    registry
}
