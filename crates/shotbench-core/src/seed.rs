//! Pure seed derivation.
//!
//! Every random stream in a run comes from SHA-256 over a domain tag and the
//! little-endian coordinates of the stream. Replicate seeds depend on
//! `(run_seed, budget, replicate)` only, never on the protocol, so all protocols
//! at a grid point see matched noise realizations.

use sha2::{Digest, Sha256};

const REPLICATE_TAG: &[u8] = b"shotbench/replicate/v1";
const STREAM_TAG: &[u8] = b"shotbench/stream/v1";

fn digest_u64(parts: &[&[u8]]) -> u64 {
    let mut h = Sha256::new();
    for part in parts {
        h.update(part);
    }
    let digest: [u8; 32] = h.finalize().into();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(word)
}

/// Seed for replicate `replicate` at shot budget `budget`.
pub fn derive_seed(run_seed: u64, budget: u64, replicate: usize) -> u64 {
    digest_u64(&[
        REPLICATE_TAG,
        &run_seed.to_le_bytes(),
        &budget.to_le_bytes(),
        &(replicate as u64).to_le_bytes(),
    ])
}

/// Seed for a named auxiliary stream (calibration, bootstrap, ...).
pub fn derive_stream_seed(run_seed: u64, stream: &str, index: u64) -> u64 {
    digest_u64(&[
        STREAM_TAG,
        &run_seed.to_le_bytes(),
        stream.as_bytes(),
        &index.to_le_bytes(),
    ])
}
