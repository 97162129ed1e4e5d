//! sha-256 checksum computation and verification for downloaded plugin
//! binaries, per §4.7's install protocol step (2).

use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// A sha-256 digest, as a lowercase hex string — the wire form used by
/// [`km_core::PluginManifest::checksum`].
#[must_use]
pub fn checksum_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// Verify that `bytes` hashes to the manifest's declared checksum.
///
/// # Errors
///
/// Returns [`CryptoError::ChecksumMismatch`] if the digests differ.
pub fn verify_checksum(bytes: &[u8], expected_hex: &str) -> CryptoResult<()> {
    let actual = checksum_hex(bytes);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(CryptoError::ChecksumMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        let data = b"plugin binary bytes";
        assert_eq!(checksum_hex(data), checksum_hex(data));
    }

    #[test]
    fn checksum_differs_for_different_inputs() {
        assert_ne!(checksum_hex(b"a"), checksum_hex(b"b"));
    }

    #[test]
    fn verify_checksum_accepts_matching_digest() {
        let data = b"hello plugin";
        let expected = checksum_hex(data);
        assert!(verify_checksum(data, &expected).is_ok());
    }

    #[test]
    fn verify_checksum_is_case_insensitive() {
        let data = b"hello plugin";
        let expected = checksum_hex(data).to_uppercase();
        assert!(verify_checksum(data, &expected).is_ok());
    }

    #[test]
    fn verify_checksum_rejects_tampered_bytes() {
        let data = b"hello plugin";
        let expected = checksum_hex(data);
        let result = verify_checksum(b"hello plugin!", &expected);
        assert!(matches!(result, Err(CryptoError::ChecksumMismatch { .. })));
    }
}
