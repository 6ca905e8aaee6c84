//! Payload compression for Casket session records.
//!
//! Session bodies can optionally be passed through a byte-level codec
//! before they are written to the cache. This crate provides:
//! - The [`Codec`] contract (`compress` / `decompress`)
//! - Implementations for gzip, LZ4 and QuickLZ
//! - A [`CodecSelector`] that fixes one codec instance per process
//!
//! # Example
//!
//! ```rust,ignore
//! use casket_codec::{CompressionType, Codec};
//!
//! let codec = CompressionType::Gzip.build().unwrap();
//! let packed = codec.compress(b"hello hello hello")?;
//! assert_eq!(codec.decompress(&packed)?, b"hello hello hello");
//! ```

mod codec;
mod error;
mod gzip;
mod lz4;
mod quicklz;
mod selector;

pub use codec::{Codec, CompressionType};
pub use error::{CodecError, Result};
pub use gzip::GzipCodec;
pub use lz4::Lz4Codec;
pub use quicklz::QuickLzCodec;
pub use selector::{CodecSelector, global_selector};
