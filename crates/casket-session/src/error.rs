//! Error types for session store operations.

/// Error type for session store operations.
///
/// CAS conflicts and lock-ownership mismatches are not errors: they show up
/// as a `false` save or an aborted operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cache could not be reached or refused the request.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Compressing or decompressing a session body failed.
    #[error(transparent)]
    Codec(#[from] casket_codec::CodecError),

    /// Stored bytes could not be decoded.
    #[error("Corrupt session entry '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// A CAS retry loop ran out of attempts.
    #[error("Gave up on session {id} after {attempts} conflicting attempts")]
    LockContention { id: String, attempts: u32 },
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
