//! Error types for codec operations.

/// Error type for compression and codec selection.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The configured compression name is not one we know.
    #[error("compression type '{0}' is not supported (expected none, gzip, lz4 or quicklz)")]
    UnsupportedCodec(String),

    /// Compressing a payload failed.
    #[error("cannot compress session data with {codec}: {source}")]
    Compress {
        codec: &'static str,
        source: std::io::Error,
    },

    /// Decompressing a payload failed.
    #[error("cannot decompress session data with {codec}: {source}")]
    Decompress {
        codec: &'static str,
        source: std::io::Error,
    },
}

impl CodecError {
    pub(crate) fn corrupt(codec: &'static str, reason: impl Into<String>) -> Self {
        Self::Decompress {
            codec,
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, reason.into()),
        }
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
