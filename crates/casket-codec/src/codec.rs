//! The codec contract and the set of known compression types.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{CodecError, Result};
use crate::{GzipCodec, Lz4Codec, QuickLzCodec};

/// A reversible byte transform applied to serialized session bodies.
///
/// Implementations must be value-preserving: `decompress(compress(x)) == x`
/// for every input, the empty slice included. Failures are reported as a
/// [`CodecError`]; a codec never hands back partial output.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Compress `data` into a freshly allocated buffer.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverse [`Codec::compress`].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Compression algorithms recognised in configuration.
///
/// Names are matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionType {
    /// Store the raw encoding.
    None,
    /// Deflate in a gzip frame.
    #[default]
    Gzip,
    /// LZ4 block with a little-endian size prefix.
    Lz4,
    /// QuickLZ level 3 block.
    QuickLz,
}

impl CompressionType {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Lz4 => "lz4",
            Self::QuickLz => "quicklz",
        }
    }

    /// Construct a fresh codec instance. `None` yields no codec at all.
    pub fn build(&self) -> Option<Arc<dyn Codec>> {
        match self {
            Self::None => None,
            Self::Gzip => Some(Arc::new(GzipCodec::default())),
            Self::Lz4 => Some(Arc::new(Lz4Codec)),
            Self::QuickLz => Some(Arc::new(QuickLzCodec)),
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            "lz4" => Ok(Self::Lz4),
            "quicklz" => Ok(Self::QuickLz),
            _ => Err(CodecError::UnsupportedCodec(s.to_string())),
        }
    }
}
