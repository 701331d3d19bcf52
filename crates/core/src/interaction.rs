//! Human-in-the-loop contracts used by the approval gate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::InteractionError;

/// What the approval gate decided for one requested action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    /// Approve, and stop asking for this action for the rest of the session
    ApproveForSession,
    Reject,
}

impl ApprovalDecision {
    pub fn is_approved(&self) -> bool {
        !matches!(self, Self::Reject)
    }
}

/// A human's answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationResponse {
    Approved,
    /// Approved, and the same action may proceed without asking again
    ApprovedForSession,
    Rejected,
    NeedsModification,
}

/// A channel to the human operator.
///
/// Front ends implement this (terminal prompt, web dialog, IDE popup).
#[async_trait]
pub trait HumanInteraction: Send + Sync {
    async fn request_confirmation(&self, prompt: &str) -> Result<ConfirmationResponse, InteractionError>;
}
