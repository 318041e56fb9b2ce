//! Proof record and chain format library
//!
//! Defines the durable proof shape, the canonical payload encoding, and the
//! tamper-evident chain hashing used to link every proof to the previous one
//! submitted by the same user.

pub mod canonical;
pub mod chain;
pub mod record;

pub use canonical::canonical_json;
pub use chain::{chain_hash, verify_chain, ChainVerifyError};
pub use record::{ChainPayload, ProofRecord};

/// Chain format version carried inside every payload.
///
/// The rounding precisions and the fingerprint prefix length below are part
/// of the chain format: changing any of them invalidates recomputation of
/// historical links, so a change requires bumping this version.
pub const CHAIN_VERSION: u8 = 1;

/// Decimal places kept for `clip_seconds` in the payload.
pub const CLIP_SECONDS_DECIMALS: u32 = 2;

/// Decimal places kept for `enf_quality` in the payload.
pub const QUALITY_DECIMALS: u32 = 2;

/// Number of leading characters of the audio fingerprint token that enter
/// the payload. The full token is stored in the proof row only.
pub const AUDIO_FP_PREFIX_LEN: usize = 64;

/// Delimiter joining per-frame perceptual hash tokens into one payload field.
pub const FRAME_HASH_DELIMITER: &str = ",";

/// Round a value to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}
