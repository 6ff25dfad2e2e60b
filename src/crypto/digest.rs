//! SHA-256 digest computation.

use sha2::{Digest, Sha256};

/// Compute SHA-256 digest of `data` and return it lowercase hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute the stored form of a redemption key.
///
/// Keys carry at least 128 bits of entropy, so an unsalted hash is enough to
/// make a leaked key store useless for minting keys.
pub fn hash_redemption_key(raw_key: &str) -> String {
    sha256_hex(raw_key.as_bytes())
}
