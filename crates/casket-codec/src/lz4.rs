//! LZ4 codec backed by `lz4_flex`.

use crate::codec::Codec;
use crate::error::{CodecError, Result};

const NAME: &str = "lz4";

/// LZ4 block format with the uncompressed size prepended.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn name(&self) -> &'static str {
        NAME
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data).map_err(|e| CodecError::corrupt(NAME, e.to_string()))
    }
}
