//! Security module for quill: approval gating, path validation, and audit logging.
//!
//! Provides:
//! - **Approval**: decides whether a risky tool call may run (YOLO mode,
//!   session-cached approvals, human confirmation)
//! - **Path validation**: keeps file tools inside allowed roots
//! - **Audit logging**: structured record of approval decisions and denials

pub mod approval;
pub mod audit;
pub mod path;

pub use approval::ApprovalGate;
pub use audit::{ApprovalSource, AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use path::{resolve_path, validate_path, PathValidationError};
