//! Proof assembly
//!
//! Folds the ENF result and the collaborator tokens into the canonical
//! chain payload and the durable proof row. The payload is hashed; the row
//! keeps the full-precision values for audit.

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use enfproof_chain::{chain_hash, ChainPayload, ProofRecord};

use crate::enf::EnfSeries;

/// Inputs to proof assembly that come from outside the extractor.
#[derive(Debug, Clone)]
pub struct ProofInputs {
    pub user_id: String,
    pub clip_sha256: String,
    pub clip_seconds: f64,
    pub audio_fp: String,
    pub audio_fp_algo: String,
    /// One token per reference frame, submission order.
    pub frame_hashes: Vec<String>,
}

/// Build the chain payload and the proof record for one processed clip.
///
/// `prev` is the user's current chain head, `None` for a first proof. The
/// record's `chain_hash` is computed here and nowhere else.
pub fn assemble_proof(
    inputs: &ProofInputs,
    enf: &EnfSeries,
    prev: Option<&str>,
    trace_path: Option<String>,
) -> Result<ProofRecord> {
    let payload = ChainPayload::new(
        &inputs.user_id,
        &inputs.clip_sha256,
        inputs.clip_seconds,
        &enf.content_hash,
        enf.quality,
        &inputs.audio_fp,
        &inputs.frame_hashes,
    );
    let hash = chain_hash(prev, &payload)?;

    Ok(ProofRecord {
        id: Uuid::new_v4(),
        user_id: inputs.user_id.clone(),
        clip_sha256: inputs.clip_sha256.clone(),
        clip_seconds: inputs.clip_seconds,
        enf_hash: enf.content_hash.clone(),
        enf_quality: enf.quality,
        enf_freq_mean: enf.freq_mean,
        enf_freq_std: enf.freq_std,
        audio_fp: inputs.audio_fp.clone(),
        audio_fp_algo: inputs.audio_fp_algo.clone(),
        frame_phash: payload.frame_phash.clone(),
        chain_prev: prev.map(str::to_string),
        chain_hash: hash,
        trace_path,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use enfproof_chain::verify_chain;

    fn enf_series() -> EnfSeries {
        EnfSeries {
            timestamps: vec![0.0, 0.1],
            frequencies: vec![50.01, 49.99],
            quality: 87.654,
            freq_mean: 50.0,
            freq_std: 0.01,
            content_hash: "enfhash".to_string(),
            low_confidence: false,
            output_rate_hz: 10,
        }
    }

    fn inputs(user: &str) -> ProofInputs {
        ProofInputs {
            user_id: user.to_string(),
            clip_sha256: "clip".to_string(),
            clip_seconds: 31.234,
            audio_fp: "fp".repeat(50),
            audio_fp_algo: "specband1".to_string(),
            frame_hashes: vec!["f1".to_string(), "f2".to_string(), "f3".to_string()],
        }
    }

    #[test]
    fn test_assembled_record_verifies_as_chain() {
        let enf = enf_series();
        let first = assemble_proof(&inputs("u"), &enf, None, None).unwrap();
        let second =
            assemble_proof(&inputs("u"), &enf, Some(&first.chain_hash), None).unwrap();

        assert!(first.chain_prev.is_none());
        assert_eq!(second.chain_prev.as_deref(), Some(first.chain_hash.as_str()));
        assert!(verify_chain(&[first, second]).is_ok());
    }

    #[test]
    fn test_frame_order_is_preserved() {
        let enf = enf_series();
        let record = assemble_proof(&inputs("u"), &enf, None, None).unwrap();
        assert_eq!(record.frame_phash, "f1,f2,f3");

        let mut reversed = inputs("u");
        reversed.frame_hashes.reverse();
        let other = assemble_proof(&reversed, &enf, None, None).unwrap();
        assert_ne!(other.chain_hash, record.chain_hash);
    }

    #[test]
    fn test_full_fingerprint_kept_in_record() {
        let enf = enf_series();
        let record = assemble_proof(&inputs("u"), &enf, None, None).unwrap();
        // Record keeps all 100 chars; the payload hashed only a prefix.
        assert_eq!(record.audio_fp.len(), 100);
    }
}
