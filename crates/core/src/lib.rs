//! # quill core
//!
//! Domain types, traits, and error definitions shared by every quill crate.
//! Nothing in here performs I/O: the engine, tools, providers and stores
//! implement against these definitions in their own crates.
//!
//! The dependency graph points inward. `quill-agent` wires the pieces
//! together through constructor injection; no component looks another one
//! up at runtime.

pub mod agent;
pub mod error;
pub mod event;
pub mod hook;
pub mod interaction;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

pub use agent::{AgentSpec, ExecutionResult};
pub use error::{Error, Result};
pub use event::{EngineEvent, EventBus};
pub use hook::{Hook, HookContext, HookPoint};
pub use interaction::{ApprovalDecision, ConfirmationResponse, HumanInteraction};
pub use message::{Message, Role, ToolCallRequest};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta};
pub use session::Session;
pub use tool::{Tool, ToolContext, ToolProvider, ToolRegistry, ToolResult};
