//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur during checksum or signature verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The sha-256 digest of downloaded bytes does not match the manifest.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The manifest's declared checksum.
        expected: String,
        /// The checksum actually computed over the downloaded bytes.
        actual: String,
    },

    /// A manifest-supplied checksum string was not valid hex.
    #[error("invalid checksum encoding: {0}")]
    InvalidChecksumEncoding(String),

    /// A signature was present but did not verify against any trusted key.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// A signature string was not valid base64 or not 64 bytes once decoded.
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    /// A public key was malformed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// Result type for `km-crypto` operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
