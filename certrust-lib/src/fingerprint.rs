//! Certificate fingerprint (digest) computation.

use crate::util;
use digest::Digest;

/// Compute the SHA-256 fingerprint of DER-encoded certificate bytes.
///
/// Returns a colon-separated uppercase hex string (e.g., "AB:CD:EF:...").
pub fn compute_fingerprint(der_bytes: &[u8]) -> String {
    util::hex_colon_upper(&sha2::Sha256::digest(der_bytes))
}
