//! Native QuickLZ codec.
//!
//! Produces single-block QuickLZ level 3 streams:
//!
//! ```text
//! flags:u8 | [compressed_len, decompressed_len] | body
//! ```
//!
//! The length fields are one byte each for inputs shorter than 216 bytes
//! and little-endian `u32`s otherwise (bit 1 of `flags` marks the long
//! form). Bit 0 of `flags` is set when the body is compressed; when the
//! input does not shrink it is stored verbatim instead.
//!
//! A compressed body is a sequence of 32-bit control words, each followed
//! by up to 31 items. Control bits are consumed least-significant first:
//! `0` is a literal byte, `1` is a back-reference encoded in 1 to 4 bytes.
//! The final ten bytes of the input are always literals.

use crate::codec::Codec;
use crate::error::{CodecError, Result};

const NAME: &str = "quicklz";

const LEVEL: u8 = 3;
const FLAG_COMPRESSED: u8 = 0x01;
const FLAG_LONG_HEADER: u8 = 0x02;
const FLAG_ALWAYS: u8 = 0x40;

const SHORT_HEADER_LEN: usize = 3;
const LONG_HEADER_LEN: usize = 9;
const SHORT_HEADER_LIMIT: usize = 216;
const MAX_INPUT: usize = u32::MAX as usize - 400;

const HASH_VALUES: usize = 4096;
const MIN_OFFSET: usize = 2;
const MAX_OFFSET: usize = 0x1ffff;
const MAX_MATCH: usize = 255;
const UNCONDITIONAL_MATCHLEN: usize = 6;
const UNCOMPRESSED_END: usize = 4;
const TAIL_LEN: usize = UNCONDITIONAL_MATCHLEN + UNCOMPRESSED_END;

const CWORD_LEN: usize = 4;
const CWORD_SENTINEL: u32 = 1 << 31;

// Never trust a header enough to preallocate more than this up front.
const MAX_PREALLOC: usize = 1 << 20;

/// QuickLZ level 3 block codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickLzCodec;

impl Codec for QuickLzCodec {
    fn name(&self) -> &'static str {
        NAME
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() > MAX_INPUT {
            return Err(CodecError::Compress {
                codec: NAME,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("payload of {} bytes exceeds block limit", data.len()),
                ),
            });
        }
        Ok(compress(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        decompress(data)
    }
}

fn compress(source: &[u8]) -> Vec<u8> {
    let header_len = if source.len() < SHORT_HEADER_LIMIT {
        SHORT_HEADER_LEN
    } else {
        LONG_HEADER_LEN
    };

    let mut out = Vec::with_capacity(header_len + source.len() + source.len() / 8 + CWORD_LEN);
    out.resize(header_len, 0);

    let compressed = source.len() > TAIL_LEN && compress_body(source, &mut out, header_len);
    if !compressed {
        out.truncate(header_len);
        out.extend_from_slice(source);
    }

    write_header(&mut out, header_len, compressed, source.len());
    out
}

fn write_header(out: &mut [u8], header_len: usize, compressed: bool, size: usize) {
    let total = out.len();
    let mut flags = FLAG_ALWAYS | (LEVEL << 2);
    if compressed {
        flags |= FLAG_COMPRESSED;
    }
    if header_len == LONG_HEADER_LEN {
        flags |= FLAG_LONG_HEADER;
        out[1..5].copy_from_slice(&(total as u32).to_le_bytes());
        out[5..9].copy_from_slice(&(size as u32).to_le_bytes());
    } else {
        out[1] = total as u8;
        out[2] = size as u8;
    }
    out[0] = flags;
}

#[inline]
fn read3(buf: &[u8], at: usize) -> u32 {
    u32::from(buf[at]) | (u32::from(buf[at + 1]) << 8) | (u32::from(buf[at + 2]) << 16)
}

#[inline]
fn hash(fetch: u32) -> usize {
    (((fetch >> 9) ^ (fetch >> 13) ^ fetch) as usize) & (HASH_VALUES - 1)
}

/// Record `pos` as the latest position for `slot`, unless the current
/// entry is still too close to be usable as a back-reference. Keeping it
/// lets runs of one byte match at the minimum distance.
#[inline]
fn remember(table: &mut [usize], slot: usize, pos: usize) {
    let prev = table[slot];
    if prev == usize::MAX || pos - prev > MIN_OFFSET {
        table[slot] = pos;
    }
}

#[inline]
fn flush_cword(out: &mut [u8], at: usize, cword: u32) {
    out[at..at + CWORD_LEN].copy_from_slice(&((cword >> 1) | CWORD_SENTINEL).to_le_bytes());
}

/// Emit the compressed body after the header. Returns `false` when the
/// result would not be smaller than storing the input.
fn compress_body(source: &[u8], out: &mut Vec<u8>, header_len: usize) -> bool {
    let last_byte = source.len() - 1;
    let last_match_start = last_byte - TAIL_LEN;

    let mut table = vec![usize::MAX; HASH_VALUES];
    let mut cword_at = out.len();
    out.extend_from_slice(&[0; CWORD_LEN]);
    let mut cword = CWORD_SENTINEL;
    let mut src = 0;

    while src <= last_match_start {
        if cword & 1 == 1 {
            if src > source.len() / 2 && out.len() - header_len > src - (src >> 5) {
                return false;
            }
            flush_cword(out, cword_at, cword);
            cword_at = out.len();
            out.extend_from_slice(&[0; CWORD_LEN]);
            cword = CWORD_SENTINEL;
        }

        let fetch = read3(source, src);
        let slot = hash(fetch);
        let candidate = table[slot];
        remember(&mut table, slot, src);

        let mut matchlen = 0;
        if candidate != usize::MAX {
            let offset = src - candidate;
            if offset > MIN_OFFSET && offset <= MAX_OFFSET && read3(source, candidate) == fetch {
                let remaining = (last_byte - src).min(MAX_MATCH);
                let mut m = 3;
                while m < remaining && source[candidate + m] == source[src + m] {
                    m += 1;
                }
                matchlen = m;
            }
        }

        if matchlen >= 3 {
            encode_match(out, src - candidate, matchlen);
            cword = (cword >> 1) | CWORD_SENTINEL;
            for pos in src + 1..src + matchlen {
                if pos + 2 > last_byte {
                    break;
                }
                remember(&mut table, hash(read3(source, pos)), pos);
            }
            src += matchlen;
        } else {
            out.push(source[src]);
            cword >>= 1;
            src += 1;
        }
    }

    while src <= last_byte {
        if cword & 1 == 1 {
            flush_cword(out, cword_at, cword);
            cword_at = out.len();
            out.extend_from_slice(&[0; CWORD_LEN]);
            cword = CWORD_SENTINEL;
        }
        out.push(source[src]);
        cword >>= 1;
        src += 1;
    }

    while cword & 1 != 1 {
        cword >>= 1;
    }
    flush_cword(out, cword_at, cword);

    out.len() - header_len < source.len()
}

fn encode_match(out: &mut Vec<u8>, offset: usize, matchlen: usize) {
    let offset = offset as u32;
    let len = matchlen as u32;
    if matchlen == 3 && offset <= 63 {
        out.push((offset << 2) as u8);
    } else if matchlen == 3 && offset <= 16383 {
        out.extend_from_slice(&((offset << 2) | 1).to_le_bytes()[..2]);
    } else if matchlen <= 18 && offset <= 1023 {
        out.extend_from_slice(&(((len - 3) << 2) | (offset << 6) | 2).to_le_bytes()[..2]);
    } else if matchlen <= 33 {
        out.extend_from_slice(&(((len - 2) << 2) | (offset << 7) | 3).to_le_bytes()[..3]);
    } else {
        out.extend_from_slice(&(((len - 3) << 7) | (offset << 15) | 3).to_le_bytes());
    }
}

/// Decode a back-reference: `(offset, matchlen, encoded width)`.
fn decode_match(fetch: u32) -> (usize, usize, usize) {
    if fetch & 3 == 0 {
        (((fetch & 0xff) >> 2) as usize, 3, 1)
    } else if fetch & 2 == 0 {
        (((fetch & 0xffff) >> 2) as usize, 3, 2)
    } else if fetch & 1 == 0 {
        (
            ((fetch & 0xffff) >> 6) as usize,
            (((fetch >> 2) & 15) + 3) as usize,
            2,
        )
    } else if fetch & 127 != 3 {
        (
            ((fetch >> 7) & 0x1ffff) as usize,
            (((fetch >> 2) & 0x1f) + 2) as usize,
            3,
        )
    } else {
        ((fetch >> 15) as usize, (((fetch >> 7) & 255) + 3) as usize, 4)
    }
}

/// Little-endian read that zero-fills past the end of `buf`.
fn peek_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = buf.get(at + i).copied().unwrap_or(0);
    }
    u32::from_le_bytes(bytes)
}

fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    let flags = *input
        .first()
        .ok_or_else(|| CodecError::corrupt(NAME, "empty input"))?;

    let header_len = if flags & FLAG_LONG_HEADER != 0 {
        LONG_HEADER_LEN
    } else {
        SHORT_HEADER_LEN
    };
    if input.len() < header_len {
        return Err(CodecError::corrupt(NAME, "truncated header"));
    }

    let (total, size) = if header_len == LONG_HEADER_LEN {
        (
            peek_u32(input, 1) as usize,
            peek_u32(input, 5) as usize,
        )
    } else {
        (usize::from(input[1]), usize::from(input[2]))
    };
    if total != input.len() {
        return Err(CodecError::corrupt(
            NAME,
            format!("header declares {} bytes, got {}", total, input.len()),
        ));
    }

    let body = &input[header_len..];
    if flags & FLAG_COMPRESSED == 0 {
        if body.len() != size {
            return Err(CodecError::corrupt(NAME, "stored block length mismatch"));
        }
        return Ok(body.to_vec());
    }

    decompress_body(body, size)
}

fn decompress_body(src: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(size.min(MAX_PREALLOC));
    if size == 0 {
        return Ok(out);
    }
    let last_match_start = size.saturating_sub(1 + TAIL_LEN);
    let truncated = || CodecError::corrupt(NAME, "unexpected end of compressed body");

    let mut pos = 0;
    let mut cword: u32 = 1;
    loop {
        if cword == 1 {
            if pos + CWORD_LEN > src.len() {
                return Err(truncated());
            }
            cword = peek_u32(src, pos) | CWORD_SENTINEL;
            pos += CWORD_LEN;
        }

        if cword & 1 == 1 {
            cword >>= 1;
            let (offset, matchlen, width) = decode_match(peek_u32(src, pos));
            pos += width;
            if pos > src.len() {
                return Err(truncated());
            }
            if offset == 0 || offset > out.len() || out.len() + matchlen > size {
                return Err(CodecError::corrupt(NAME, "back-reference out of range"));
            }
            let start = out.len() - offset;
            for i in 0..matchlen {
                let byte = out[start + i];
                out.push(byte);
            }
        } else if out.len() < last_match_start {
            cword >>= 1;
            out.push(*src.get(pos).ok_or_else(truncated)?);
            pos += 1;
        } else {
            while out.len() < size {
                if cword == 1 {
                    pos += CWORD_LEN;
                    cword = CWORD_SENTINEL;
                }
                out.push(*src.get(pos).ok_or_else(truncated)?);
                pos += 1;
                cword >>= 1;
            }
            return Ok(out);
        }
    }
}
