//! Failure taxonomy for the entitlement client, per §7.

use thiserror::Error;

/// Errors the entitlement client can surface to its caller.
#[derive(Debug, Error)]
pub enum EntitlementError {
    /// The entitlement service rejected the API key (401/403).
    #[error("invalid API key")]
    InvalidApiKey,

    /// The service returned 5xx on every retry attempt, or the request
    /// never reached it.
    #[error("entitlement service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A downloaded plugin's checksum or signature did not verify, even
    /// after retrying the download.
    #[error(transparent)]
    Verification(#[from] km_crypto::CryptoError),

    /// The response body could not be parsed into the expected shape.
    #[error("malformed response from entitlement service: {0}")]
    MalformedResponse(String),
}

/// Result type for `km-entitlement` operations.
pub type EntitlementResult<T> = Result<T, EntitlementError>;
