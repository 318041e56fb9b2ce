//! Persistence gateway trait and implementations
//!
//! The worker and the intake path receive a `ProofStore` explicitly; there
//! is no global client. `MemoryStore` backs the tests, `PostgresStore`
//! delegates to the enfproof-db crate and keeps rendered artifacts on the
//! filesystem.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use enfproof_chain::ProofRecord;

use crate::job::{Job, JobStatus, NewJob};
use crate::service_config::{ArtifactsConfig, PostgresConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    /// Another proof for the same user committed since the chain head was
    /// read. The job must recompute against the fresh head.
    #[error("chain head moved for user {user_id}")]
    StaleChainHead { user_id: String },

    #[error("blob write failed: {0}")]
    Blob(String),
}

/// Capability set of the persistence gateway.
///
/// `claim_next_job` must be atomic against concurrent callers: no two
/// workers may receive the same job. `commit_proof` must serialize chain
/// growth per user.
#[async_trait]
pub trait ProofStore: Send + Sync {
    /// Create a job in `Queued` with a zero attempt count.
    async fn enqueue_job(&self, new: NewJob) -> Result<Job, StoreError>;

    /// Atomically claim the oldest claimable job and move it to
    /// `Processing`. Claimable: `Queued`, or `Processing` with a start
    /// timestamp older than `stale_after` (abandoned by a crashed worker).
    async fn claim_next_job(&self, stale_after: Duration) -> Result<Option<Job>, StoreError>;

    /// Return a job to `Queued` after a retryable failure.
    async fn requeue_job(
        &self,
        job_id: Uuid,
        attempt_count: i32,
        error_reason: &str,
    ) -> Result<(), StoreError>;

    /// Terminal success.
    async fn mark_done(&self, job_id: Uuid) -> Result<(), StoreError>;

    /// Terminal failure with the last error retained for audit.
    async fn mark_failed(
        &self,
        job_id: Uuid,
        attempt_count: i32,
        error_reason: &str,
    ) -> Result<(), StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    async fn get_chain_head(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    /// Insert the proof and advance the user's chain head in one atomic
    /// step, verifying the head still equals `record.chain_prev`.
    async fn commit_proof(&self, record: &ProofRecord) -> Result<(), StoreError>;

    /// Store an artifact blob, returning its locator.
    async fn store_blob(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError>;

    /// A user's proofs, oldest first.
    async fn user_proofs(&self, user_id: &str) -> Result<Vec<ProofRecord>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    jobs: Vec<Job>,
    heads: HashMap<String, String>,
    proofs: Vec<ProofRecord>,
    blobs: HashMap<String, (Vec<u8>, String)>,
}

/// In-memory store for tests and single-process experiments. Claim
/// atomicity comes from the mutex: the find-and-mark is one critical
/// section.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw blob access for assertions.
    pub fn blob(&self, locator: &str) -> Option<(Vec<u8>, String)> {
        self.inner.lock().unwrap().blobs.get(locator).cloned()
    }
}

#[async_trait]
impl ProofStore for MemoryStore {
    async fn enqueue_job(&self, new: NewJob) -> Result<Job, StoreError> {
        let job = Job {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            audio_path: new.audio_path,
            frame_paths: new.frame_paths,
            status: JobStatus::Queued,
            attempt_count: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error_reason: None,
        };
        self.inner.lock().unwrap().jobs.push(job.clone());
        Ok(job)
    }

    async fn claim_next_job(&self, stale_after: Duration) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let cutoff = now - stale_after;

        // Jobs are stored in creation order, so the first claimable one is
        // the oldest.
        let candidate = inner.jobs.iter_mut().find(|job| match job.status {
            JobStatus::Queued => true,
            JobStatus::Processing => job.started_at.map(|t| t < cutoff).unwrap_or(true),
            _ => false,
        });

        Ok(candidate.map(|job| {
            job.status = JobStatus::Processing;
            job.started_at = Some(now);
            job.clone()
        }))
    }

    async fn requeue_job(
        &self,
        job_id: Uuid,
        attempt_count: i32,
        error_reason: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let job = find_job(&mut inner.jobs, job_id)?;
        job.status = JobStatus::Queued;
        job.attempt_count = attempt_count;
        job.error_reason = Some(error_reason.to_string());
        Ok(())
    }

    async fn mark_done(&self, job_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let job = find_job(&mut inner.jobs, job_id)?;
        job.status = JobStatus::Done;
        job.finished_at = Some(Utc::now());
        job.error_reason = None;
        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        attempt_count: i32,
        error_reason: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let job = find_job(&mut inner.jobs, job_id)?;
        job.status = JobStatus::Failed;
        job.attempt_count = attempt_count;
        job.finished_at = Some(Utc::now());
        job.error_reason = Some(error_reason.to_string());
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn get_chain_head(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.heads.get(user_id).cloned())
    }

    async fn commit_proof(&self, record: &ProofRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let head = inner.heads.get(&record.user_id).cloned();
        if head.as_deref() != record.chain_prev.as_deref() {
            return Err(StoreError::StaleChainHead {
                user_id: record.user_id.clone(),
            });
        }
        inner.proofs.push(record.clone());
        inner
            .heads
            .insert(record.user_id.clone(), record.chain_hash.clone());
        Ok(())
    }

    async fn store_blob(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .blobs
            .insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(key.to_string())
    }

    async fn user_proofs(&self, user_id: &str) -> Result<Vec<ProofRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .proofs
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }
}

fn find_job(jobs: &mut [Job], job_id: Uuid) -> Result<&mut Job, StoreError> {
    jobs.iter_mut()
        .find(|j| j.id == job_id)
        .ok_or_else(|| StoreError::Query(format!("no such job {job_id}")))
}

// ---------------------------------------------------------------------------
// PostgreSQL store
// ---------------------------------------------------------------------------

/// Postgres-backed store with filesystem artifacts.
pub struct PostgresStore {
    pool: deadpool_postgres::Pool,
    artifact_dir: PathBuf,
}

impl PostgresStore {
    pub async fn new(
        pg: &PostgresConfig,
        artifacts: &ArtifactsConfig,
    ) -> Result<Self, StoreError> {
        let pool = enfproof_db::create_pool(
            &pg.host,
            pg.port,
            &pg.database,
            &pg.user,
            &pg.password,
            pg.max_connections,
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        enfproof_db::test_connection(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            pool,
            artifact_dir: PathBuf::from(&artifacts.base_directory),
        })
    }
}

#[async_trait]
impl ProofStore for PostgresStore {
    async fn enqueue_job(&self, new: NewJob) -> Result<Job, StoreError> {
        let row = enfproof_db::insert_job(
            &self.pool,
            &enfproof_db::NewJobRow {
                user_id: new.user_id,
                audio_path: new.audio_path,
                frame_paths: new.frame_paths,
            },
        )
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        job_from_row(row)
    }

    async fn claim_next_job(&self, stale_after: Duration) -> Result<Option<Job>, StoreError> {
        let row = enfproof_db::claim_next_job(&self.pool, stale_after.num_seconds())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        row.map(job_from_row).transpose()
    }

    async fn requeue_job(
        &self,
        job_id: Uuid,
        attempt_count: i32,
        error_reason: &str,
    ) -> Result<(), StoreError> {
        enfproof_db::requeue_job(&self.pool, job_id, attempt_count, error_reason)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn mark_done(&self, job_id: Uuid) -> Result<(), StoreError> {
        enfproof_db::mark_done(&self.pool, job_id)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        attempt_count: i32,
        error_reason: &str,
    ) -> Result<(), StoreError> {
        enfproof_db::mark_failed(&self.pool, job_id, attempt_count, error_reason)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = enfproof_db::get_job(&self.pool, job_id)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        row.map(job_from_row).transpose()
    }

    async fn get_chain_head(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        enfproof_db::get_chain_head(&self.pool, user_id)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn commit_proof(&self, record: &ProofRecord) -> Result<(), StoreError> {
        match enfproof_db::commit_proof(&self.pool, record).await {
            Ok(enfproof_db::CommitOutcome::Committed) => Ok(()),
            Ok(enfproof_db::CommitOutcome::StaleHead) => Err(StoreError::StaleChainHead {
                user_id: record.user_id.clone(),
            }),
            Err(e) => Err(StoreError::Query(e.to_string())),
        }
    }

    async fn store_blob(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError> {
        let path = self.artifact_dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Blob(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::Blob(e.to_string()))?;
        log::debug!(
            "stored artifact {} ({}, {} bytes)",
            path.display(),
            content_type,
            bytes.len()
        );
        Ok(path.display().to_string())
    }

    async fn user_proofs(&self, user_id: &str) -> Result<Vec<ProofRecord>, StoreError> {
        enfproof_db::proofs_for_user(&self.pool, user_id)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}

fn job_from_row(row: enfproof_db::JobRow) -> Result<Job, StoreError> {
    let status = JobStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Query(format!("unknown job status {:?}", row.status)))?;
    Ok(Job {
        id: row.id,
        user_id: row.user_id,
        audio_path: row.audio_path,
        frame_paths: row.frame_paths,
        status,
        attempt_count: row.attempt_count,
        created_at: row.created_at,
        started_at: row.started_at,
        finished_at: row.finished_at,
        error_reason: row.error_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(user: &str) -> NewJob {
        NewJob {
            user_id: user.to_string(),
            audio_path: "/data/a.wav".to_string(),
            frame_paths: vec![],
        }
    }

    fn record(user: &str, prev: Option<&str>, hash: &str) -> ProofRecord {
        ProofRecord {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            clip_sha256: "c".into(),
            clip_seconds: 31.0,
            enf_hash: "e".into(),
            enf_quality: 80.0,
            enf_freq_mean: 50.0,
            enf_freq_std: 0.01,
            audio_fp: "fp".into(),
            audio_fp_algo: "specband1".into(),
            frame_phash: String::new(),
            chain_prev: prev.map(str::to_string),
            chain_hash: hash.to_string(),
            trace_path: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_claim_moves_oldest_to_processing() {
        let store = MemoryStore::new();
        let first = store.enqueue_job(new_job("u1")).await.unwrap();
        store.enqueue_job(new_job("u2")).await.unwrap();

        let claimed = store.claim_next_job(Duration::hours(2)).await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(claimed.started_at.is_some());
    }

    #[tokio::test]
    async fn test_claim_exclusivity_under_concurrency() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.enqueue_job(new_job("u1")).await.unwrap();

        let s1 = store.clone();
        let s2 = store.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { s1.claim_next_job(Duration::hours(2)).await.unwrap() }),
            tokio::spawn(async move { s2.claim_next_job(Duration::hours(2)).await.unwrap() }),
        );
        let a = a.unwrap();
        let b = b.unwrap();

        // Exactly one claimer receives the job.
        assert!(a.is_some() ^ b.is_some());
    }

    #[tokio::test]
    async fn test_stale_processing_job_is_reclaimable() {
        let store = MemoryStore::new();
        let job = store.enqueue_job(new_job("u1")).await.unwrap();

        let claimed = store.claim_next_job(Duration::hours(2)).await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);

        // Fresh Processing job is not claimable again.
        assert!(store.claim_next_job(Duration::hours(2)).await.unwrap().is_none());

        // With a zero staleness ceiling the same job is treated as
        // abandoned and may be reclaimed.
        let reclaimed = store.claim_next_job(Duration::zero()).await.unwrap();
        assert_eq!(reclaimed.map(|j| j.id), Some(job.id));
    }

    #[tokio::test]
    async fn test_commit_proof_advances_head() {
        let store = MemoryStore::new();
        assert_eq!(store.get_chain_head("u").await.unwrap(), None);

        store.commit_proof(&record("u", None, "h1")).await.unwrap();
        assert_eq!(store.get_chain_head("u").await.unwrap().as_deref(), Some("h1"));

        store.commit_proof(&record("u", Some("h1"), "h2")).await.unwrap();
        assert_eq!(store.get_chain_head("u").await.unwrap().as_deref(), Some("h2"));
    }

    #[tokio::test]
    async fn test_commit_proof_rejects_stale_head() {
        let store = MemoryStore::new();
        store.commit_proof(&record("u", None, "h1")).await.unwrap();

        // A second first-proof (prev = None) lost the race.
        let err = store.commit_proof(&record("u", None, "h2")).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleChainHead { .. }));

        // Other users are unaffected.
        store.commit_proof(&record("v", None, "h3")).await.unwrap();
    }

    #[tokio::test]
    async fn test_requeue_and_terminal_transitions() {
        let store = MemoryStore::new();
        let job = store.enqueue_job(new_job("u")).await.unwrap();

        store.claim_next_job(Duration::hours(2)).await.unwrap().unwrap();
        store.requeue_job(job.id, 1, "decode blew up").await.unwrap();

        let requeued = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);
        assert_eq!(requeued.attempt_count, 1);
        assert_eq!(requeued.error_reason.as_deref(), Some("decode blew up"));

        store.claim_next_job(Duration::hours(2)).await.unwrap().unwrap();
        store.mark_done(job.id).await.unwrap();
        let done = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Done);
        assert!(done.finished_at.is_some());
        assert!(done.error_reason.is_none());
    }
}
