//! Conversation state for one session: ordered history, running token
//! count and checkpoints.

pub mod store;
pub mod token;

pub use store::ContextStore;
pub use token::{estimate_message_tokens, estimate_messages_tokens, estimate_tokens};
