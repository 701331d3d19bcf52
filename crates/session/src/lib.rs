//! Session persistence for quill.
//!
//! Each session lives in its own directory under the sessions root:
//!
//! ```text
//! <root>/<session-id>/session.json   metadata record
//! <root>/<session-id>/history.jsonl  append-only message log
//! ```
//!
//! - [`SessionStore`]: create, load, look up by working directory, list, delete
//! - [`HistoryLog`]: the append-only log replayed to restore a conversation

pub mod history;
pub mod store;

pub use history::{HistoryLog, HistoryRecord, RestoredHistory};
pub use store::SessionStore;
