//! gzip codec backed by `flate2`.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::codec::Codec;
use crate::error::{CodecError, Result};

const NAME: &str = "gzip";

/// Deflate wrapped in a gzip frame, at the default level.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        NAME
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::default());
        encoder
            .write_all(data)
            .map_err(|source| CodecError::Compress { codec: NAME, source })?;
        encoder
            .finish()
            .map_err(|source| CodecError::Compress { codec: NAME, source })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 2);
        decoder
            .read_to_end(&mut out)
            .map_err(|source| CodecError::Decompress { codec: NAME, source })?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compresses_repetitive_payload() {
        let codec = GzipCodec::default();
        let data = "cart=42;".repeat(1000).into_bytes();

        let packed = codec.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(codec.decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_empty_input_round_trips() {
        let codec = GzipCodec;
        let packed = codec.compress(&[]).unwrap();
        assert!(!packed.is_empty());
        assert!(codec.decompress(&packed).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_fails() {
        let codec = GzipCodec::default();
        let err = codec.decompress(b"definitely not gzip").unwrap_err();
        assert!(matches!(err, CodecError::Decompress { codec: "gzip", .. }));
    }
}
