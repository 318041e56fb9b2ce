//! Worker poll loop and job runner
//!
//! A worker process is a single-threaded claim/sleep loop; correctness
//! under multiple workers rests entirely on the store's atomic claim. The
//! runner here is the one place that decides retry-vs-terminal, from the
//! attempt counter alone. Scratch files are removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use enfproof_chain::ProofRecord;

use crate::audio;
use crate::collab::{AudioFingerprinter, FrameHasher, TraceRenderer};
use crate::collab::{DifferenceFrameHasher, SpectralFingerprinter, SvgTraceRenderer};
use crate::enf;
use crate::error::{ExtractError, JobError};
use crate::job::Job;
use crate::proof::{assemble_proof, ProofInputs};
use crate::service_config::ServiceConfig;
use crate::store::ProofStore;

/// The collaborator set injected into the runner.
pub struct Collaborators {
    pub fingerprinter: Box<dyn AudioFingerprinter>,
    pub frame_hasher: Box<dyn FrameHasher>,
    pub renderer: Box<dyn TraceRenderer>,
}

impl Collaborators {
    /// The default implementations wired by the binaries.
    pub fn default_set() -> Self {
        Self {
            fingerprinter: Box::new(SpectralFingerprinter),
            frame_hasher: Box::new(DifferenceFrameHasher),
            renderer: Box::new(SvgTraceRenderer),
        }
    }
}

/// Claim/sleep loop. Runs until the process is killed.
pub async fn run_worker(
    store: Arc<dyn ProofStore>,
    collaborators: &Collaborators,
    config: &ServiceConfig,
) -> anyhow::Result<()> {
    log::info!("worker started");
    let stale_after = Duration::seconds(config.worker.stale_after_secs);
    let idle = std::time::Duration::from_secs(config.worker.poll_interval_secs);

    loop {
        match store.claim_next_job(stale_after).await {
            Ok(Some(job)) => {
                if let Err(e) = handle_claimed_job(store.as_ref(), collaborators, config, job).await
                {
                    log::warn!("job status write failed: {e}");
                }
            }
            Ok(None) => tokio::time::sleep(idle).await,
            Err(e) => {
                log::warn!("claim failed: {e}");
                tokio::time::sleep(idle).await;
            }
        }
    }
}

/// Process one claimed job and write its terminal (or requeued) status.
///
/// The error this returns is a *status write* failure; pipeline failures
/// are consumed here by the retry decision.
pub async fn handle_claimed_job(
    store: &dyn ProofStore,
    collaborators: &Collaborators,
    config: &ServiceConfig,
    job: Job,
) -> anyhow::Result<()> {
    log::info!(
        "processing job {} (user {}, attempt {})",
        job.id,
        job.user_id,
        job.attempt_count + 1
    );

    match process_job(store, collaborators, config, &job).await {
        Ok(record) => {
            store.mark_done(job.id).await?;
            log::info!(
                "job {} done: proof {} quality {:.1}",
                job.id,
                record.id,
                record.enf_quality
            );
        }
        Err(err) => {
            let attempts = job.attempt_count + 1;
            if err.is_retryable() && attempts < config.worker.max_attempts {
                log::warn!(
                    "job {} attempt {} failed (will retry): {}",
                    job.id,
                    attempts,
                    err
                );
                store.requeue_job(job.id, attempts, &err.to_string()).await?;
            } else {
                log::warn!("job {} failed terminally after {} attempts: {}", job.id, attempts, err);
                store.mark_failed(job.id, attempts, &err.to_string()).await?;
            }
        }
    }

    Ok(())
}

/// The full pipeline for one job: decode, extract, fingerprint, render,
/// chain, commit. Returns the committed proof.
pub async fn process_job(
    store: &dyn ProofStore,
    collaborators: &Collaborators,
    config: &ServiceConfig,
    job: &Job,
) -> Result<ProofRecord, JobError> {
    let scratch = Workdir::create(job.id)?;

    let audio_data = audio::decode_audio(&job.audio_path, &config.enf)?;
    let clip_seconds = audio_data.duration_seconds();
    let clip_sha256 = sha256_file(Path::new(&job.audio_path))
        .map_err(|e| ExtractError::InputMissing(e.to_string()))?;

    let mono = audio_data.to_mono();

    // ENF runs at the low analysis rate; the staged fingerprint WAV keeps
    // the configured decode rate.
    let analysis = audio::resample_to_target(
        &mono,
        audio_data.sample_rate,
        config.enf.analysis_sample_rate,
    );
    let series = enf::extract_enf(&analysis, config.enf.analysis_sample_rate, &config.enf)?;
    if series.low_confidence {
        log::warn!(
            "job {}: ENF mask collapsed, quality capped at {:.1}",
            job.id,
            series.quality
        );
    }

    let staged_wav = scratch.path().join("audio_fp.wav");
    write_mono_wav(
        &staged_wav,
        &audio::resample_to_target(&mono, audio_data.sample_rate, config.worker.decode_sample_rate),
        config.worker.decode_sample_rate,
    )?;
    let audio_fp = collaborators
        .fingerprinter
        .fingerprint(&staged_wav)
        .map_err(|e| JobError::Collaborator {
            name: "audio_fingerprint",
            reason: e.to_string(),
        })?;

    let mut frame_hashes = Vec::with_capacity(job.frame_paths.len());
    for frame_path in &job.frame_paths {
        let bytes = std::fs::read(frame_path)
            .map_err(|e| ExtractError::InputMissing(format!("{frame_path}: {e}")))?;
        let token = collaborators
            .frame_hasher
            .perceptual_hash(&bytes)
            .map_err(|e| JobError::Collaborator {
                name: "frame_phash",
                reason: e.to_string(),
            })?;
        frame_hashes.push(token);
    }

    let trace = collaborators
        .renderer
        .render(&series)
        .map_err(|e| JobError::Collaborator {
            name: "trace_render",
            reason: e.to_string(),
        })?;
    let trace_key = format!("{}/{}/trace.{}", job.user_id, job.id, trace.extension);
    let trace_path = store
        .store_blob(&trace_key, &trace.bytes, trace.content_type)
        .await?;

    let prev = store.get_chain_head(&job.user_id).await?;
    let inputs = ProofInputs {
        user_id: job.user_id.clone(),
        clip_sha256,
        clip_seconds,
        audio_fp,
        audio_fp_algo: collaborators.fingerprinter.algorithm().to_string(),
        frame_hashes,
    };
    let record = assemble_proof(&inputs, &series, prev.as_deref(), Some(trace_path))
        .map_err(|e| JobError::Collaborator {
            name: "proof_assembly",
            reason: e.to_string(),
        })?;

    store.commit_proof(&record).await?;

    Ok(record)
}

/// Scratch directory scoped to one job invocation. Dropped on every exit
/// path, success or failure.
struct Workdir {
    path: PathBuf,
}

impl Workdir {
    fn create(job_id: Uuid) -> Result<Self, JobError> {
        let path = std::env::temp_dir().join(format!("enfproof-job-{job_id}"));
        std::fs::create_dir_all(&path).map_err(|e| JobError::Scratch(e.to_string()))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("scratch cleanup failed for {}: {e}", self.path.display());
            }
        }
    }
}

fn write_mono_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), JobError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| JobError::Scratch(e.to_string()))?;
    for &v in samples {
        let clamped = (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(clamped)
            .map_err(|e| JobError::Scratch(e.to_string()))?;
    }
    writer.finalize().map_err(|e| JobError::Scratch(e.to_string()))?;
    Ok(())
}

/// Streaming SHA-256 of a file, lowercase hex.
fn sha256_file(path: &Path) -> std::io::Result<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, NewJob};
    use crate::store::MemoryStore;
    use std::sync::Mutex;

    fn test_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        // Keep the pipeline light: inputs are generated at the analysis
        // rate so no resampling happens in tests.
        config.worker.decode_sample_rate = 1000;
        config
    }

    fn write_tone_wav(dir: &Path, name: &str, seconds: f64) -> String {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 1000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        let n = (seconds * 1000.0) as usize;
        for i in 0..n {
            let t = i as f64 / 1000.0;
            let v = (std::f64::consts::TAU * 50.0 * t).sin() * 0.8
                + (std::f64::consts::TAU * 123.0 * t).sin() * 0.1;
            writer.write_sample((v * i16::MAX as f64 * 0.9) as i16).unwrap();
        }
        writer.finalize().unwrap();
        path.display().to_string()
    }

    fn write_frame(dir: &Path, name: &str, seed: u8) -> String {
        let path = dir.join(name);
        let mut bytes = b"P5\n32 24\n255\n".to_vec();
        for y in 0..24u16 {
            for x in 0..32u16 {
                bytes.push(((x * 7 + y * 3) as u8).wrapping_add(seed));
            }
        }
        std::fs::write(&path, bytes).unwrap();
        path.display().to_string()
    }

    async fn enqueue(store: &MemoryStore, dir: &Path, user: &str, audio: String) -> Job {
        store
            .enqueue_job(NewJob {
                user_id: user.to_string(),
                audio_path: audio,
                frame_paths: vec![
                    write_frame(dir, "f1.pgm", 0),
                    write_frame(dir, "f2.pgm", 40),
                ],
            })
            .await
            .unwrap()
    }

    async fn claim_and_run(
        store: &MemoryStore,
        collaborators: &Collaborators,
        config: &ServiceConfig,
    ) {
        let job = store
            .claim_next_job(Duration::hours(2))
            .await
            .unwrap()
            .expect("a claimable job");
        handle_claimed_job(store, collaborators, config, job)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_success_path_links_chain() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let config = test_config();
        let collaborators = Collaborators::default_set();

        let audio = write_tone_wav(dir.path(), "a.wav", 31.0);
        let first = enqueue(&store, dir.path(), "u1", audio.clone()).await;
        let second = enqueue(&store, dir.path(), "u1", audio).await;

        claim_and_run(&store, &collaborators, &config).await;
        claim_and_run(&store, &collaborators, &config).await;

        let first = store.get_job(first.id).await.unwrap().unwrap();
        let second = store.get_job(second.id).await.unwrap().unwrap();
        assert_eq!(first.status, JobStatus::Done);
        assert_eq!(second.status, JobStatus::Done);
        assert!(first.error_reason.is_none());

        let proofs = store.user_proofs("u1").await.unwrap();
        assert_eq!(proofs.len(), 2);
        assert!(proofs[0].chain_prev.is_none());
        assert_eq!(
            proofs[1].chain_prev.as_deref(),
            Some(proofs[0].chain_hash.as_str())
        );
        assert!(enfproof_chain::verify_chain(&proofs).is_ok());

        // Head tracks the latest committed proof.
        assert_eq!(
            store.get_chain_head("u1").await.unwrap().as_deref(),
            Some(proofs[1].chain_hash.as_str())
        );

        // Rendered artifact landed in the blob store.
        let locator = proofs[0].trace_path.as_ref().unwrap();
        let (bytes, content_type) = store.blob(locator).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(content_type, "image/svg+xml");

        // Two frames, order-preserving, one field.
        assert_eq!(proofs[0].frame_phash.matches(',').count(), 1);
    }

    #[tokio::test]
    async fn test_retryable_failure_exhausts_attempts() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let config = test_config();
        let collaborators = Collaborators::default_set();

        // Garbage bytes behind a .wav extension: decode fails, retryable.
        let audio = dir.path().join("junk.wav");
        std::fs::write(&audio, b"not really a wav").unwrap();
        let job = enqueue(&store, dir.path(), "u1", audio.display().to_string()).await;

        for _ in 0..config.worker.max_attempts {
            claim_and_run(&store, &collaborators, &config).await;
        }

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempt_count, config.worker.max_attempts);
        assert!(job.error_reason.unwrap().contains("decode"));
        assert!(store.user_proofs("u1").await.unwrap().is_empty());
        // Nothing left to claim.
        assert!(store.claim_next_job(Duration::hours(2)).await.unwrap().is_none());
    }

    struct FlakyFingerprinter {
        failures_left: Mutex<i32>,
    }

    impl AudioFingerprinter for FlakyFingerprinter {
        fn algorithm(&self) -> &'static str {
            "flaky"
        }

        fn fingerprint(&self, wav_path: &Path) -> anyhow::Result<String> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                anyhow::bail!("transient fingerprint outage");
            }
            SpectralFingerprinter.fingerprint(wav_path)
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_final_attempt() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let config = test_config();
        let collaborators = Collaborators {
            fingerprinter: Box::new(FlakyFingerprinter {
                failures_left: Mutex::new(config.worker.max_attempts - 1),
            }),
            frame_hasher: Box::new(DifferenceFrameHasher),
            renderer: Box::new(SvgTraceRenderer),
        };

        let audio = write_tone_wav(dir.path(), "a.wav", 31.0);
        let job = enqueue(&store, dir.path(), "u1", audio).await;

        for _ in 0..config.worker.max_attempts {
            claim_and_run(&store, &collaborators, &config).await;
        }

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        // Two failed attempts recorded, then success.
        assert_eq!(job.attempt_count, config.worker.max_attempts - 1);
        assert_eq!(store.user_proofs("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_input_fails_terminally_at_once() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let config = test_config();
        let collaborators = Collaborators::default_set();

        let job = enqueue(&store, dir.path(), "u1", "/nope/gone.wav".to_string()).await;
        claim_and_run(&store, &collaborators, &config).await;

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_short_clip_fails_terminally_at_once() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let config = test_config();
        let collaborators = Collaborators::default_set();

        let audio = write_tone_wav(dir.path(), "short.wav", 20.0);
        let job = enqueue(&store, dir.path(), "u1", audio).await;
        claim_and_run(&store, &collaborators, &config).await;

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempt_count, 1);
        assert!(job.error_reason.unwrap().contains("below"));
    }

    #[tokio::test]
    async fn test_scratch_dir_removed_on_both_exits() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let config = test_config();
        let collaborators = Collaborators::default_set();

        let good = write_tone_wav(dir.path(), "good.wav", 31.0);
        let job = enqueue(&store, dir.path(), "u1", good).await;
        let scratch = std::env::temp_dir().join(format!("enfproof-job-{}", job.id));
        claim_and_run(&store, &collaborators, &config).await;
        assert!(!scratch.exists());

        let bad = write_tone_wav(dir.path(), "bad.wav", 10.0);
        let job = enqueue(&store, dir.path(), "u1", bad).await;
        let scratch = std::env::temp_dir().join(format!("enfproof-job-{}", job.id));
        claim_and_run(&store, &collaborators, &config).await;
        assert!(!scratch.exists());
    }
}
