//! Row models for the job queue and ledger tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of `forensic_jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRow {
    pub id: Uuid,
    pub user_id: String,
    pub audio_path: String,
    /// Stored as JSONB, submission order preserved.
    pub frame_paths: Vec<String>,
    pub status: String,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_reason: Option<String>,
}

/// Input structure for creating a new job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJobRow {
    pub user_id: String,
    pub audio_path: String,
    pub frame_paths: Vec<String>,
}

/// Result of a transactional proof commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The locked chain head no longer matched the record's `chain_prev`.
    StaleHead,
}
