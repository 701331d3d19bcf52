//! The quill execution core.
//!
//! [`ExecutionEngine`] drives the think/act/observe loop for one session:
//!
//! 1. record the user input in the [`ContextStore`]
//! 2. stream a model turn
//! 3. dispatch requested tool calls, in order, through the
//!    [`ToolInvocationPipeline`] (argument repair, approval, timeout)
//! 4. loop until the model answers, the step limit is hit, or the run is
//!    interrupted
//!
//! When the context outgrows its token budget the [`Compactor`] summarizes
//! older history before the next step. Hooks in a [`HookRegistry`] fire
//! around user input and tool calls.

pub mod compaction;
pub mod context;
pub mod engine;
pub mod hooks;
pub mod pipeline;
pub mod toolcall;
pub mod turn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use compaction::{CompactionOutcome, Compactor, PRESERVED_MESSAGES};
pub use context::ContextStore;
pub use engine::ExecutionEngine;
pub use hooks::HookRegistry;
pub use pipeline::ToolInvocationPipeline;
pub use toolcall::{filter_valid, normalize};
