//! Clip intake
//!
//! Receives the already-validated upload tuple from the outer transport
//! layer (which owns HTTP parsing and authentication), stages the inputs
//! into the data directory, and enqueues a job. Validation failures happen
//! before any side effect.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::config::EnfConfig;
use crate::error::ExtractError;
use crate::job::{Job, NewJob};
use crate::store::{ProofStore, StoreError};

/// The validated submission tuple.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub user_id: String,
    pub audio_path: PathBuf,
    /// Duration as measured by the upload layer; the worker re-measures
    /// from decoded PCM, this gate just rejects hopeless uploads early.
    pub duration_seconds: f64,
    /// Reference frames in submission order (binary PGM rasters).
    pub frame_paths: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("user_id must be non-empty")]
    EmptyUserId,

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("staging failed: {0}")]
    Staging(String),
}

/// Validate, stage, and enqueue one submission.
///
/// Inputs are copied under a fresh staging directory so the job's locators
/// stay valid independently of the caller's temp files.
pub async fn submit_clip(
    store: &dyn ProofStore,
    data_dir: &Path,
    enf: &EnfConfig,
    request: SubmitRequest,
) -> Result<Job, SubmitError> {
    if request.user_id.trim().is_empty() {
        return Err(SubmitError::EmptyUserId);
    }
    if request.duration_seconds < enf.min_seconds {
        return Err(ExtractError::ClipTooShort {
            seconds: request.duration_seconds,
            min_seconds: enf.min_seconds,
        }
        .into());
    }
    if request.duration_seconds > enf.max_seconds {
        return Err(ExtractError::ClipTooLong {
            seconds: request.duration_seconds,
            max_seconds: enf.max_seconds,
        }
        .into());
    }
    if !request.audio_path.is_file() {
        return Err(ExtractError::InputMissing(request.audio_path.display().to_string()).into());
    }
    for frame in &request.frame_paths {
        if !frame.is_file() {
            return Err(ExtractError::InputMissing(frame.display().to_string()).into());
        }
    }

    let staging = data_dir.join(Uuid::new_v4().to_string());
    std::fs::create_dir_all(&staging).map_err(|e| SubmitError::Staging(e.to_string()))?;

    let audio_name = staged_name("audio", &request.audio_path, "wav");
    let staged_audio = staging.join(audio_name);
    std::fs::copy(&request.audio_path, &staged_audio)
        .map_err(|e| SubmitError::Staging(e.to_string()))?;

    let mut staged_frames = Vec::with_capacity(request.frame_paths.len());
    for (i, frame) in request.frame_paths.iter().enumerate() {
        let staged = staging.join(staged_name(&format!("frame{}", i + 1), frame, "pgm"));
        std::fs::copy(frame, &staged).map_err(|e| SubmitError::Staging(e.to_string()))?;
        staged_frames.push(staged.display().to_string());
    }

    log::info!(
        "staged submission for user {} under {}",
        request.user_id,
        staging.display()
    );

    let job = store
        .enqueue_job(NewJob {
            user_id: request.user_id,
            audio_path: staged_audio.display().to_string(),
            frame_paths: staged_frames,
        })
        .await?;

    Ok(job)
}

fn staged_name(stem: &str, source: &Path, fallback_ext: &str) -> String {
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(fallback_ext);
    format!("{stem}.{ext}")
}
