//! Append-only JSONL log of a session's conversation.
//!
//! Each line is one [`HistoryRecord`]. Replaying the log from the top
//! rebuilds the message list and token count: `reset` discards everything
//! before it, which is how compaction and checkpoint restores are recorded
//! without rewriting earlier lines.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use quill_core::error::SessionError;
use quill_core::message::Message;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryRecord {
    Message { message: Message },
    TokenCount { count: u64 },
    Reset,
}

/// Conversation state rebuilt from a log.
#[derive(Debug, Default)]
pub struct RestoredHistory {
    pub messages: Vec<Message>,
    pub token_count: u64,
}

#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append records in order, creating the file and its directory on demand.
    pub fn append(&self, records: &[HistoryRecord]) -> Result<(), SessionError> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut buf = String::new();
        for record in records {
            let line = serde_json::to_string(record).map_err(|e| SessionError::Encoding(e.to_string()))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(buf.as_bytes()).map_err(|e| self.io_error(e))
    }

    /// Replay the log. A missing file is an empty history; corrupt lines
    /// are skipped.
    pub fn replay(&self) -> Result<RestoredHistory, SessionError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RestoredHistory::default()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut restored = RestoredHistory::default();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(line) {
                Ok(HistoryRecord::Message { message }) => restored.messages.push(message),
                Ok(HistoryRecord::TokenCount { count }) => restored.token_count = count,
                Ok(HistoryRecord::Reset) => restored = RestoredHistory::default(),
                Err(e) => warn!(line = lineno + 1, error = %e, "Skipping corrupted history record"),
            }
        }
        Ok(restored)
    }

    fn io_error(&self, e: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}
