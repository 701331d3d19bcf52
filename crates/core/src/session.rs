//! Session identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// The persistent identity binding a working directory to a conversation.
///
/// `id`, `work_dir` and `created_at` never change after creation;
/// `last_activity_at` moves forward on every interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub work_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            work_dir: work_dir.into(),
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Record activity now.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}
