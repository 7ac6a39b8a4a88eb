//! Content-address hasher for canonical style keys.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
pub const HASH_LENGTH: usize = 8;

/// Map serialized style text to `prefix-xxxxxxxx`.
///
/// The digest is sha256, so identifiers are stable across runs and
/// platforms. Truncation makes them collision-tolerant, not collision-proof.
pub fn hash(prefix: &str, serialized: &str) -> String {
    let digest = Sha256::digest(serialized.as_bytes());
    let hex = hex::encode(digest);
    format!("{prefix}-{}", &hex[..HASH_LENGTH])
}
