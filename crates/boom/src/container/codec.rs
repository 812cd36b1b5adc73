//! Block compression codecs.
//!
//! Container blocks are compressed as a whole. The codec is named in the file
//! header (`avro.codec`); only `null` and `deflate` are understood here.
//! Deflate uses the raw stream format with no zlib header or checksum.

use crate::error::{BoomError, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Header name of the identity codec.
pub const NULL_CODEC: &str = "null";

/// Header name of the deflate codec.
pub const DEFLATE_CODEC: &str = "deflate";

/// Default deflate compression level.
pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;

/// Compression codec applied to container blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Blocks are stored uncompressed.
    Null,
    /// Raw deflate with the given level (0-9).
    Deflate {
        /// Compression level; only affects writing.
        level: u32,
    },
}

impl Default for Codec {
    fn default() -> Self {
        Self::Deflate {
            level: DEFAULT_DEFLATE_LEVEL,
        }
    }
}

impl Codec {
    /// Resolves a codec from its header name.
    ///
    /// # Errors
    ///
    /// Returns `BoomError::UnsupportedCodec` for any name other than `null`
    /// or `deflate`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            NULL_CODEC => Ok(Self::Null),
            DEFLATE_CODEC => Ok(Self::default()),
            other => Err(BoomError::UnsupportedCodec(other.to_string())),
        }
    }

    /// Returns the name written to the container header.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => NULL_CODEC,
            Self::Deflate { .. } => DEFLATE_CODEC,
        }
    }

    /// Compresses one block of serialized entries.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Null => Ok(data.to_vec()),
            Self::Deflate { level } => {
                let mut encoder = DeflateEncoder::new(
                    Vec::with_capacity(data.len() / 2),
                    Compression::new(*level),
                );
                encoder
                    .write_all(data)
                    .map_err(|e| BoomError::Codec(format!("deflate: {}", e)))?;
                encoder
                    .finish()
                    .map_err(|e| BoomError::Codec(format!("deflate: {}", e)))
            }
        }
    }

    /// Decompresses one block payload.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Null => Ok(data.to_vec()),
            Self::Deflate { .. } => {
                let mut decoder = DeflateDecoder::new(data);
                let mut out = Vec::with_capacity(data.len() * 4);
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| BoomError::Codec(format!("inflate: {}", e)))?;
                Ok(out)
            }
        }
    }
}
