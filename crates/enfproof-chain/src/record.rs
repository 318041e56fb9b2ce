//! Proof record and chain payload shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    round_to, AUDIO_FP_PREFIX_LEN, CHAIN_VERSION, CLIP_SECONDS_DECIMALS, FRAME_HASH_DELIMITER,
    QUALITY_DECIMALS,
};

/// The fields that enter the chain hash, already normalized to the fixed
/// chain-format precisions. Construct via [`ChainPayload::new`] so the
/// rounding and truncation constants are applied in exactly one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPayload {
    pub v: u8,
    pub user_id: String,
    pub clip_sha256: String,
    pub clip_seconds: f64,
    pub enf_hash: String,
    pub enf_quality: f64,
    pub audio_fp: String,
    pub frame_phash: String,
}

impl ChainPayload {
    pub fn new(
        user_id: &str,
        clip_sha256: &str,
        clip_seconds: f64,
        enf_hash: &str,
        enf_quality: f64,
        audio_fp_token: &str,
        frame_hashes: &[String],
    ) -> Self {
        Self {
            v: CHAIN_VERSION,
            user_id: user_id.to_string(),
            clip_sha256: clip_sha256.to_string(),
            clip_seconds: round_to(clip_seconds, CLIP_SECONDS_DECIMALS),
            enf_hash: enf_hash.to_string(),
            enf_quality: round_to(enf_quality, QUALITY_DECIMALS),
            audio_fp: audio_fp_token.chars().take(AUDIO_FP_PREFIX_LEN).collect(),
            frame_phash: frame_hashes.join(FRAME_HASH_DELIMITER),
        }
    }
}

/// One durable proof row. Append-only: written exactly once at the end of a
/// successful job and never mutated or deleted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRecord {
    pub id: Uuid,
    pub user_id: String,
    pub clip_sha256: String,
    pub clip_seconds: f64,
    pub enf_hash: String,
    pub enf_quality: f64,
    pub enf_freq_mean: f64,
    pub enf_freq_std: f64,
    /// Full fingerprint token; only a fixed prefix participates in hashing.
    pub audio_fp: String,
    pub audio_fp_algo: String,
    /// Per-frame perceptual hash tokens joined in submission order.
    pub frame_phash: String,
    pub chain_prev: Option<String>,
    pub chain_hash: String,
    /// Locator of the rendered trace artifact, if one was stored.
    pub trace_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProofRecord {
    /// Rebuild the chain payload from the durable fields.
    ///
    /// Frame hashes are stored pre-joined, so they pass through unchanged;
    /// the fingerprint prefix and the roundings are re-applied from the
    /// format constants.
    pub fn payload(&self) -> ChainPayload {
        ChainPayload {
            v: CHAIN_VERSION,
            user_id: self.user_id.clone(),
            clip_sha256: self.clip_sha256.clone(),
            clip_seconds: round_to(self.clip_seconds, CLIP_SECONDS_DECIMALS),
            enf_hash: self.enf_hash.clone(),
            enf_quality: round_to(self.enf_quality, QUALITY_DECIMALS),
            audio_fp: self.audio_fp.chars().take(AUDIO_FP_PREFIX_LEN).collect(),
            frame_phash: self.frame_phash.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_applies_format_constants() {
        let fp = "a".repeat(100);
        let payload = ChainPayload::new(
            "user-1",
            "deadbeef",
            31.23456,
            "enfhash",
            87.6543,
            &fp,
            &["h1".to_string(), "h2".to_string()],
        );
        assert_eq!(payload.v, CHAIN_VERSION);
        assert_eq!(payload.clip_seconds, 31.23);
        assert_eq!(payload.enf_quality, 87.65);
        assert_eq!(payload.audio_fp.len(), 64);
        assert_eq!(payload.frame_phash, "h1,h2");
    }

    #[test]
    fn test_short_fingerprint_not_padded() {
        let payload = ChainPayload::new("u", "c", 30.0, "e", 50.0, "short", &[]);
        assert_eq!(payload.audio_fp, "short");
        assert_eq!(payload.frame_phash, "");
    }
}
