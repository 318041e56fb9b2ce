//! ENF Proof Core - Forensic Clip Fingerprinting Library
//!
//! This crate implements electrical-network-frequency (ENF) trace extraction
//! for short clips, combines it with collaborator-supplied audio and frame
//! fingerprints, and drives the job pipeline that appends tamper-evident
//! proofs to each user's ledger.

pub mod audio;
pub mod collab;
pub mod config;
pub mod dsp;
pub mod enf;
pub mod error;
pub mod intake;
pub mod job;
pub mod proof;
pub mod service_config;
pub mod store;
pub mod worker;

pub use config::EnfConfig;
pub use enf::{extract_enf, EnfSeries};
pub use error::{ExtractError, JobError};
pub use intake::{submit_clip, SubmitRequest};
pub use job::{Job, JobStatus, NewJob};
pub use proof::assemble_proof;
pub use service_config::ServiceConfig;
pub use store::{MemoryStore, PostgresStore, ProofStore, StoreError};
pub use worker::{process_job, run_worker, Collaborators};

/// Run the ENF extractor against a media file on disk.
///
/// Decodes, folds to mono, resamples to the analysis rate, and extracts the
/// ENF series. The duration gate is enforced before any filtering starts.
pub fn extract_enf_from_file(path: &str, config: &EnfConfig) -> Result<EnfSeries, ExtractError> {
    let audio_data = audio::decode_audio(path, config)?;
    let mono = audio_data.to_mono();
    let resampled = audio::resample_to_target(
        &mono,
        audio_data.sample_rate,
        config.analysis_sample_rate,
    );
    enf::extract_enf(&resampled, config.analysis_sample_rate, config)
}
