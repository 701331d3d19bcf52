//! Tool invocation pipeline.
//!
//! Every requested call produces exactly one [`ToolResult`]; nothing in here
//! returns an error or lets a tool panic escape. Tool hooks fire only for
//! calls that actually run.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use quill_core::error::ToolError;
use quill_core::hook::{HookContext, HookPoint};
use quill_core::message::ToolCallRequest;
use quill_core::tool::{ToolRegistry, ToolResult};
use quill_security::ApprovalGate;
use tracing::{debug, warn};

use crate::hooks::HookRegistry;
use crate::toolcall::normalize;

pub struct ToolInvocationPipeline {
    registry: Arc<ToolRegistry>,
    approval: Arc<ApprovalGate>,
    hooks: Arc<HookRegistry>,
}

impl ToolInvocationPipeline {
    pub fn new(registry: Arc<ToolRegistry>, approval: Arc<ApprovalGate>) -> Self {
        Self {
            registry,
            approval,
            hooks: Arc::new(HookRegistry::default()),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    pub(crate) fn set_hooks(&mut self, hooks: Arc<HookRegistry>) {
        self.hooks = hooks;
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn approval_gate(&self) -> &Arc<ApprovalGate> {
        &self.approval
    }

    /// Resolve, repair, validate, approve and run one call.
    ///
    /// Arguments are checked against the tool's parameter shape before the
    /// approval prompt, so the prompt can describe the actual parameters and
    /// a malformed call never bothers the human.
    pub async fn invoke(&self, request: &ToolCallRequest) -> ToolResult {
        let Some(tool) = self.registry.resolve(&request.name) else {
            warn!(tool = %request.name, call_id = %request.id, "Tool not found");
            return ToolResult::not_found(&request.name);
        };

        let normalized = normalize(&request.arguments);
        if normalized != request.arguments {
            debug!(
                tool = %request.name,
                raw = %request.arguments,
                normalized = %normalized,
                "Repaired tool arguments"
            );
        }

        let arguments: serde_json::Value = match serde_json::from_str(&normalized) {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = %request.name, error = %e, "Unparseable tool arguments");
                return ToolResult::error(
                    ToolError::InvalidArguments(format!("{}: {e}", request.name)).to_string(),
                );
            }
        };

        if let Err(e) = tool.validate_arguments(&arguments) {
            warn!(tool = %request.name, error = %e, "Tool arguments rejected");
            return ToolResult::error(e.to_string());
        }

        if tool.requires_approval() {
            let action = tool.approval_action();
            let description = tool.approval_description(&arguments);
            let decision = self.approval.decide(&request.id, &action, &description).await;
            if !decision.is_approved() {
                debug!(tool = %request.name, call_id = %request.id, "Tool call rejected");
                return ToolResult::rejected();
            }
        }

        let hook_ctx = HookContext::tool_call(HookPoint::PreToolCall, &request.name, &normalized);
        self.hooks.fire(&hook_ctx).await;

        let limit = tool.timeout(&arguments);
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            limit,
            AssertUnwindSafe(tool.execute(arguments)).catch_unwind(),
        )
        .await;

        let result = match outcome {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                warn!(tool = %request.name, error = %e, "Tool execution failed");
                ToolResult::error(e.to_string())
            }
            Ok(Err(_)) => {
                warn!(tool = %request.name, "Tool panicked");
                ToolResult::error(
                    ToolError::ExecutionFailed {
                        tool_name: request.name.clone(),
                        reason: "tool panicked".into(),
                    }
                    .to_string(),
                )
            }
            Err(_) => {
                warn!(tool = %request.name, timeout_secs = limit.as_secs(), "Tool timed out");
                ToolResult::error(
                    ToolError::Timeout {
                        tool_name: request.name.clone(),
                        timeout_secs: limit.as_secs(),
                    }
                    .to_string(),
                )
            }
        };

        debug!(
            tool = %request.name,
            ok = result.ok,
            duration_ms = started.elapsed().as_millis() as u64,
            "Tool call finished"
        );

        let hook_ctx = HookContext {
            point: HookPoint::PostToolCall,
            ..hook_ctx
        }
        .with_tool_result(result.to_content());
        self.hooks.fire(&hook_ctx).await;
        result
    }
}
