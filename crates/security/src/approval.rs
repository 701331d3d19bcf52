//! Approval gate: decides whether a risky action may proceed.
//!
//! Policy, in order:
//! 1. YOLO mode approves everything.
//! 2. An action approved for the session is approved without asking.
//! 3. With no interaction channel configured the action is approved and a
//!    warning is logged.
//! 4. Otherwise the human is asked. Only an explicit approval proceeds;
//!    a failure while asking rejects.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use quill_core::interaction::{ApprovalDecision, ConfirmationResponse, HumanInteraction};
use tracing::{debug, info, warn};

use crate::audit::{ApprovalSource, AuditEvent, AuditLogger, AuditOutcome};

pub struct ApprovalGate {
    yolo: bool,
    /// Shared by every tool dispatch of the session
    session_approvals: Mutex<HashSet<String>>,
    interaction: Option<Arc<dyn HumanInteraction>>,
    audit: Option<Arc<AuditLogger>>,
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate")
            .field("yolo", &self.yolo)
            .field("session_approvals", &self.session_approval_count())
            .field("interactive", &self.interaction.is_some())
            .finish()
    }
}

impl ApprovalGate {
    pub fn new(yolo: bool, interaction: Option<Arc<dyn HumanInteraction>>) -> Self {
        Self {
            yolo,
            session_approvals: Mutex::new(HashSet::new()),
            interaction,
            audit: None,
        }
    }

    /// Approve every action without asking.
    pub fn yolo() -> Self {
        Self::new(true, None)
    }

    /// Ask `interaction` for every action not yet approved for the session.
    pub fn interactive(interaction: Arc<dyn HumanInteraction>) -> Self {
        Self::new(false, Some(interaction))
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    fn approvals(&self) -> MutexGuard<'_, HashSet<String>> {
        self.session_approvals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether the action requested by `call_id` may run.
    pub async fn decide(&self, call_id: &str, action: &str, description: &str) -> ApprovalDecision {
        if self.yolo {
            debug!(action, "YOLO mode, auto-approving");
            return self.record(call_id, action, ApprovalSource::Yolo, ApprovalDecision::Approve);
        }

        if self.approvals().contains(action) {
            debug!(action, "Action already approved for this session");
            return self.record(call_id, action, ApprovalSource::SessionCache, ApprovalDecision::Approve);
        }

        let Some(interaction) = &self.interaction else {
            warn!(action, "No interaction channel configured, auto-approving");
            return self.record(call_id, action, ApprovalSource::NoInteraction, ApprovalDecision::Approve);
        };

        let prompt = format_prompt(action, description);
        let decision = match interaction.request_confirmation(&prompt).await {
            Ok(ConfirmationResponse::Approved) => {
                info!(action, "Action approved by user");
                ApprovalDecision::Approve
            }
            Ok(ConfirmationResponse::ApprovedForSession) => {
                info!(action, "Action approved for the rest of the session");
                self.add_session_approval(action);
                ApprovalDecision::ApproveForSession
            }
            Ok(response) => {
                info!(action, ?response, "Action rejected by user");
                ApprovalDecision::Reject
            }
            Err(e) => {
                warn!(action, error = %e, "Approval request failed, rejecting");
                return self.record(
                    call_id,
                    action,
                    ApprovalSource::InteractionFailure,
                    ApprovalDecision::Reject,
                );
            }
        };
        self.record(call_id, action, ApprovalSource::Human, decision)
    }

    fn record(
        &self,
        call_id: &str,
        action: &str,
        source: ApprovalSource,
        decision: ApprovalDecision,
    ) -> ApprovalDecision {
        if let Some(audit) = &self.audit {
            let outcome = if decision.is_approved() {
                AuditOutcome::Success
            } else {
                AuditOutcome::Denied
            };
            audit.log(
                AuditEvent::Approval {
                    action: action.into(),
                    source,
                },
                call_id,
                outcome,
                Some(format!("{decision:?}")),
            );
        }
        decision
    }

    /// Stop asking for `action` for the rest of the session.
    pub fn add_session_approval(&self, action: &str) {
        self.approvals().insert(action.to_string());
        debug!(action, "Added session approval");
    }

    pub fn clear_session_approvals(&self) {
        self.approvals().clear();
        info!("Session approvals cleared");
        if let Some(audit) = &self.audit {
            audit.log(AuditEvent::SessionApprovalsCleared, "approval_gate", AuditOutcome::Success, None);
        }
    }

    pub fn session_approval_count(&self) -> usize {
        self.approvals().len()
    }

    pub fn is_auto_approve_mode(&self) -> bool {
        self.yolo
    }
}

fn format_prompt(action: &str, description: &str) -> String {
    let mut prompt = format!("Approval required\n  action:  {action}\n");
    if !description.is_empty() {
        prompt.push_str(&format!("  details: {description}\n"));
    }
    prompt.push_str("Allow this?");
    prompt
}
