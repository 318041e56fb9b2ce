//! Tamper-evident chain hashing
//!
//! Every proof links to the previous proof of the same user:
//!
//! ```text
//! chain = sha256( (prev_hash or "") + "\n" + canonical_json(payload) )
//! ```
//!
//! Verifying a ledger of N proofs is N recomputations of this function.

use anyhow::Result;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::canonical::canonical_json;
use crate::record::{ChainPayload, ProofRecord};

/// Compute the chain hash for a payload given the previous head.
///
/// Returns a lowercase hex digest, exactly 64 characters.
pub fn chain_hash(prev_hash: Option<&str>, payload: &ChainPayload) -> Result<String> {
    let canon = canonical_json(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.unwrap_or("").as_bytes());
    hasher.update(b"\n");
    hasher.update(canon.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainVerifyError {
    #[error("proof {index} is the first for this user but carries chain_prev")]
    FirstLinkNotNull { index: usize },
    #[error("proof {index} does not link to the previous proof's chain hash")]
    BrokenLink { index: usize },
    #[error("proof {index} chain hash does not match its recomputed payload hash")]
    HashMismatch { index: usize },
    #[error("proof {index} belongs to user {found}, expected {expected}")]
    ForeignProof {
        index: usize,
        expected: String,
        found: String,
    },
}

/// Verify a single user's proofs, ordered oldest-first.
///
/// Detects any alteration of a stored field, any insertion or removal, and
/// any reordering of the historical record.
pub fn verify_chain(proofs: &[ProofRecord]) -> Result<(), ChainVerifyError> {
    let Some(first) = proofs.first() else {
        return Ok(());
    };
    let user_id = &first.user_id;

    for (index, proof) in proofs.iter().enumerate() {
        if &proof.user_id != user_id {
            return Err(ChainVerifyError::ForeignProof {
                index,
                expected: user_id.clone(),
                found: proof.user_id.clone(),
            });
        }

        match (index, &proof.chain_prev) {
            (0, Some(_)) => return Err(ChainVerifyError::FirstLinkNotNull { index }),
            (0, None) => {}
            (_, prev) => {
                if prev.as_deref() != Some(proofs[index - 1].chain_hash.as_str()) {
                    return Err(ChainVerifyError::BrokenLink { index });
                }
            }
        }

        let recomputed = chain_hash(proof.chain_prev.as_deref(), &proof.payload())
            .map_err(|_| ChainVerifyError::HashMismatch { index })?;
        if recomputed != proof.chain_hash {
            return Err(ChainVerifyError::HashMismatch { index });
        }
    }

    Ok(())
}
