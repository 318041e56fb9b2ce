use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use enfproof_chain::ProofRecord;

use crate::models::*;

const JOB_COLUMNS: &str =
    "id, user_id, audio_path, frame_paths, status, attempt_count, created_at, started_at, \
     finished_at, error_reason";

const PROOF_COLUMNS: &str =
    "id, user_id, clip_sha256, clip_seconds, enf_hash, enf_quality, enf_freq_mean, enf_freq_std, \
     audio_fp, audio_fp_algo, frame_phash, chain_prev, chain_hash, trace_path, created_at";

/// Insert a new job in QUEUED with a zero attempt count.
pub async fn insert_job(pool: &Pool, new: &NewJobRow) -> Result<JobRow> {
    let client = pool.get().await?;

    let frames = serde_json::to_value(&new.frame_paths)?;
    let row = client
        .query_one(
            format!(
                "INSERT INTO forensic_jobs (id, user_id, audio_path, frame_paths, status, attempt_count) \
                 VALUES ($1, $2, $3, $4, 'QUEUED', 0) \
                 RETURNING {JOB_COLUMNS}"
            )
            .as_str(),
            &[&Uuid::new_v4(), &new.user_id, &new.audio_path, &frames],
        )
        .await
        .context("Failed to insert job")?;

    job_from_row(&row)
}

/// Atomically claim the oldest claimable job.
///
/// Claimable means QUEUED, or PROCESSING with a start timestamp older than
/// `stale_secs` (a crashed worker's leftovers). The subselect takes a row
/// lock with SKIP LOCKED, so concurrent workers never receive the same job.
pub async fn claim_next_job(pool: &Pool, stale_secs: i64) -> Result<Option<JobRow>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            format!(
                "UPDATE forensic_jobs SET status = 'PROCESSING', started_at = now() \
                 WHERE id = ( \
                     SELECT id FROM forensic_jobs \
                     WHERE status = 'QUEUED' \
                        OR (status = 'PROCESSING' AND started_at < now() - ($1::bigint * interval '1 second')) \
                     ORDER BY created_at \
                     LIMIT 1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING {JOB_COLUMNS}"
            )
            .as_str(),
            &[&stale_secs],
        )
        .await
        .context("Failed to claim job")?;

    row.as_ref().map(job_from_row).transpose()
}

/// Return a job to QUEUED after a retryable failure.
pub async fn requeue_job(pool: &Pool, job_id: Uuid, attempt_count: i32, reason: &str) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(
            "UPDATE forensic_jobs \
             SET status = 'QUEUED', attempt_count = $2, error_reason = $3 \
             WHERE id = $1",
            &[&job_id, &attempt_count, &reason],
        )
        .await
        .context("Failed to requeue job")?;

    Ok(())
}

/// Terminal success.
pub async fn mark_done(pool: &Pool, job_id: Uuid) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(
            "UPDATE forensic_jobs \
             SET status = 'DONE', finished_at = now(), error_reason = NULL \
             WHERE id = $1",
            &[&job_id],
        )
        .await
        .context("Failed to mark job done")?;

    Ok(())
}

/// Terminal failure, keeping the last error for audit.
pub async fn mark_failed(pool: &Pool, job_id: Uuid, attempt_count: i32, reason: &str) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(
            "UPDATE forensic_jobs \
             SET status = 'FAILED', attempt_count = $2, error_reason = $3, finished_at = now() \
             WHERE id = $1",
            &[&job_id, &attempt_count, &reason],
        )
        .await
        .context("Failed to mark job failed")?;

    Ok(())
}

/// Get a job by id
pub async fn get_job(pool: &Pool, job_id: Uuid) -> Result<Option<JobRow>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            format!("SELECT {JOB_COLUMNS} FROM forensic_jobs WHERE id = $1").as_str(),
            &[&job_id],
        )
        .await
        .context("Failed to get job")?;

    row.as_ref().map(job_from_row).transpose()
}

/// Current chain head for a user
pub async fn get_chain_head(pool: &Pool, user_id: &str) -> Result<Option<String>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT head_hash FROM chain_heads WHERE user_id = $1",
            &[&user_id],
        )
        .await
        .context("Failed to get chain head")?;

    Ok(row.map(|r| r.get(0)))
}

/// Insert the proof and advance the chain head in one transaction.
///
/// The head row is locked first; if it no longer equals the record's
/// `chain_prev`, nothing is written and `StaleHead` is returned so the
/// caller can recompute against the fresh head. This serializes chain
/// growth per user without coupling users to each other.
pub async fn commit_proof(pool: &Pool, record: &ProofRecord) -> Result<CommitOutcome> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await.context("Failed to open transaction")?;

    let head: Option<String> = tx
        .query_opt(
            "SELECT head_hash FROM chain_heads WHERE user_id = $1 FOR UPDATE",
            &[&record.user_id],
        )
        .await
        .context("Failed to lock chain head")?
        .map(|r| r.get(0));

    if head.as_deref() != record.chain_prev.as_deref() {
        log::warn!(
            "stale chain head for user {}: job computed against {:?}",
            record.user_id,
            record.chain_prev
        );
        return Ok(CommitOutcome::StaleHead);
    }

    tx.execute(
        format!(
            "INSERT INTO proofs ({PROOF_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        )
        .as_str(),
        &[
            &record.id,
            &record.user_id,
            &record.clip_sha256,
            &record.clip_seconds,
            &record.enf_hash,
            &record.enf_quality,
            &record.enf_freq_mean,
            &record.enf_freq_std,
            &record.audio_fp,
            &record.audio_fp_algo,
            &record.frame_phash,
            &record.chain_prev,
            &record.chain_hash,
            &record.trace_path,
            &record.created_at,
        ],
    )
    .await
    .context("Failed to insert proof")?;

    tx.execute(
        "INSERT INTO chain_heads (user_id, head_hash, updated_at) VALUES ($1, $2, now()) \
         ON CONFLICT (user_id) DO UPDATE SET head_hash = $2, updated_at = now()",
        &[&record.user_id, &record.chain_hash],
    )
    .await
    .context("Failed to advance chain head")?;

    tx.commit().await.context("Failed to commit proof transaction")?;

    Ok(CommitOutcome::Committed)
}

/// All proofs for a user, oldest first (chain order).
pub async fn proofs_for_user(pool: &Pool, user_id: &str) -> Result<Vec<ProofRecord>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            format!(
                "SELECT {PROOF_COLUMNS} FROM proofs WHERE user_id = $1 ORDER BY created_at, id"
            )
            .as_str(),
            &[&user_id],
        )
        .await
        .context("Failed to list proofs")?;

    rows.iter().map(proof_from_row).collect()
}

fn job_from_row(row: &Row) -> Result<JobRow> {
    let frames: serde_json::Value = row.get(3);
    let frame_paths: Vec<String> =
        serde_json::from_value(frames).context("Malformed frame_paths JSON")?;

    Ok(JobRow {
        id: row.get(0),
        user_id: row.get(1),
        audio_path: row.get(2),
        frame_paths,
        status: row.get(4),
        attempt_count: row.get(5),
        created_at: row.get(6),
        started_at: row.get(7),
        finished_at: row.get(8),
        error_reason: row.get(9),
    })
}

fn proof_from_row(row: &Row) -> Result<ProofRecord> {
    Ok(ProofRecord {
        id: row.get(0),
        user_id: row.get(1),
        clip_sha256: row.get(2),
        clip_seconds: row.get(3),
        enf_hash: row.get(4),
        enf_quality: row.get(5),
        enf_freq_mean: row.get(6),
        enf_freq_std: row.get(7),
        audio_fp: row.get(8),
        audio_fp_algo: row.get(9),
        frame_phash: row.get(10),
        chain_prev: row.get(11),
        chain_hash: row.get(12),
        trace_path: row.get(13),
        created_at: row.get(14),
    })
}
