//! ENF Proof Database Layer
//!
//! PostgreSQL integration for the job queue, the proof ledger and the
//! per-user chain heads.

pub mod connection;
pub mod models;
pub mod operations;

// Re-export commonly used types
pub use connection::{create_pool, test_connection};
pub use models::{CommitOutcome, JobRow, NewJobRow};
pub use operations::{
    claim_next_job, commit_proof, get_chain_head, get_job, insert_job, mark_done, mark_failed,
    proofs_for_user, requeue_job,
};
