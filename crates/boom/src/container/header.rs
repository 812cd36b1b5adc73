//! Container file header.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Magic: "Obj" 0x01 (4 bytes)                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Metadata map                                                │
//! │  - varint count = 2                                          │
//! │  - "avro.schema" → JSON schema text                          │
//! │  - "avro.codec"  → codec name                                │
//! │  - varint 0 terminator                                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Sync marker (16 random bytes)                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::container::codec::{Codec, NULL_CODEC};
use crate::container::varint::{self, put_bytes, put_long, put_string};
use crate::container::{CODEC_KEY, MAGIC, SCHEMA_KEY, SYNC_SIZE};
use crate::error::{BoomError, Result};
use rand::RngCore;
use std::fmt;
use std::io::{Read, Write};
use tracing::trace;

/// A 16-byte block boundary marker.
pub type SyncMarker = [u8; SYNC_SIZE];

/// Generates a fresh random sync marker.
pub fn generate_sync_marker() -> SyncMarker {
    let mut sync = [0u8; SYNC_SIZE];
    rand::rng().fill_bytes(&mut sync);
    sync
}

/// Parsed container header.
///
/// Headers order by schema text, then codec name, then sync marker bytes;
/// sorting a set of headers therefore groups files that can be merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerHeader {
    /// JSON schema text of the entries.
    pub schema: String,
    /// Codec name (`null` or `deflate`).
    pub codec: String,
    /// Marker written after every block of this file.
    pub sync_marker: SyncMarker,
}

impl ContainerHeader {
    /// Creates a header with a freshly generated sync marker.
    pub fn new(schema: impl Into<String>, codec: Codec) -> Self {
        Self::with_sync_marker(schema, codec.name(), generate_sync_marker())
    }

    /// Creates a header with an explicit sync marker.
    pub fn with_sync_marker(
        schema: impl Into<String>,
        codec: impl Into<String>,
        sync_marker: SyncMarker,
    ) -> Self {
        Self {
            schema: schema.into(),
            codec: codec.into(),
            sync_marker,
        }
    }

    /// Resolves the header's codec name.
    pub fn codec(&self) -> Result<Codec> {
        Codec::from_name(&self.codec)
    }

    /// Returns true if blocks of `other` can be appended to a file with this
    /// header: schema and codec match, the sync marker may differ.
    pub fn is_compatible_with(&self, other: &ContainerHeader) -> bool {
        self.schema == other.schema && self.codec == other.codec
    }

    /// Reads a header from the start of a container stream.
    ///
    /// # Errors
    ///
    /// Returns `BoomError::BadMagic` if the magic bytes don't match,
    /// `BoomError::TruncatedInput` if the stream ends inside the header and
    /// `BoomError::MissingMetadata` if no schema is present.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| BoomError::from_read(e, "header magic"))?;
        if magic != MAGIC {
            return Err(BoomError::BadMagic(magic));
        }

        let mut meta = varint::read_metadata_map(reader)?;

        let schema = meta
            .remove(SCHEMA_KEY)
            .ok_or(BoomError::MissingMetadata(SCHEMA_KEY))?;
        let schema = String::from_utf8(schema)
            .map_err(|e| BoomError::InvalidUtf8(format!("{}: {}", SCHEMA_KEY, e)))?;

        // An absent codec key means the blocks are stored uncompressed.
        let codec = match meta.remove(CODEC_KEY) {
            Some(bytes) => String::from_utf8(bytes)
                .map_err(|e| BoomError::InvalidUtf8(format!("{}: {}", CODEC_KEY, e)))?,
            None => NULL_CODEC.to_string(),
        };

        let mut sync_marker = [0u8; SYNC_SIZE];
        reader
            .read_exact(&mut sync_marker)
            .map_err(|e| BoomError::from_read(e, "header sync marker"))?;

        trace!(codec = %codec, extra_keys = meta.len(), "read container header");

        Ok(Self {
            schema,
            codec,
            sync_marker,
        })
    }

    /// Serializes the header.
    ///
    /// The metadata map always holds exactly the schema and codec entries, in
    /// that order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            MAGIC.len() + self.schema.len() + self.codec.len() + 32 + SYNC_SIZE,
        );
        buf.extend_from_slice(&MAGIC);
        put_long(&mut buf, 2);
        put_string(&mut buf, SCHEMA_KEY);
        put_bytes(&mut buf, self.schema.as_bytes());
        put_string(&mut buf, CODEC_KEY);
        put_bytes(&mut buf, self.codec.as_bytes());
        put_long(&mut buf, 0);
        buf.extend_from_slice(&self.sync_marker);
        buf
    }

    /// Writes the serialized header.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }
}

impl fmt::Display for ContainerHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[codec={}, sync=", self.codec)?;
        for b in &self.sync_marker {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ", schema={} bytes]", self.schema.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContainerHeader {
        ContainerHeader::with_sync_marker(r#"{"type":"string"}"#, "deflate", [7u8; SYNC_SIZE])
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..4], b"Obj\x01");
        assert_eq!(&bytes[bytes.len() - SYNC_SIZE..], &[7u8; SYNC_SIZE]);

        let mut cursor = bytes.as_slice();
        let parsed = ContainerHeader::read_from(&mut cursor).unwrap();
        assert_eq!(parsed, header);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_header_invalid_magic() {
        let mut bytes = sample().to_bytes();
        bytes[3] = 2;
        let mut cursor = bytes.as_slice();
        assert!(matches!(
            ContainerHeader::read_from(&mut cursor),
            Err(BoomError::BadMagic([b'O', b'b', b'j', 2]))
        ));
    }

    #[test]
    fn test_header_truncated() {
        let bytes = sample().to_bytes();
        for cut in [2, 10, bytes.len() - 1] {
            let mut cursor = &bytes[..cut];
            let err = ContainerHeader::read_from(&mut cursor).unwrap_err();
            assert!(
                err.is_truncation() || matches!(err, BoomError::MalformedVarint { .. }),
                "cut at {} gave {:?}",
                cut,
                err
            );
        }
    }

    #[test]
    fn test_missing_codec_means_null() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        put_long(&mut bytes, 1);
        put_string(&mut bytes, SCHEMA_KEY);
        put_bytes(&mut bytes, b"\"long\"");
        put_long(&mut bytes, 0);
        bytes.extend_from_slice(&[1u8; SYNC_SIZE]);

        let header = ContainerHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(header.codec, "null");
        assert_eq!(header.codec().unwrap(), Codec::Null);
    }

    #[test]
    fn test_missing_schema_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        put_long(&mut bytes, 0);
        bytes.extend_from_slice(&[1u8; SYNC_SIZE]);
        assert!(matches!(
            ContainerHeader::read_from(&mut bytes.as_slice()),
            Err(BoomError::MissingMetadata("avro.schema"))
        ));
    }

    #[test]
    fn test_header_ordering() {
        let a = ContainerHeader::with_sync_marker("a", "deflate", [9u8; SYNC_SIZE]);
        let b = ContainerHeader::with_sync_marker("b", "deflate", [0u8; SYNC_SIZE]);
        let c = ContainerHeader::with_sync_marker("b", "null", [0u8; SYNC_SIZE]);
        let mut d_sync = [0u8; SYNC_SIZE];
        d_sync[15] = 0x80;
        let d = ContainerHeader::with_sync_marker("b", "null", d_sync);

        let mut headers = vec![d.clone(), c.clone(), b.clone(), a.clone()];
        headers.sort();
        assert_eq!(headers, vec![a, b.clone(), c.clone(), d.clone()]);

        assert!(c.is_compatible_with(&d));
        assert!(!b.is_compatible_with(&c));
        assert_ne!(c, d);
    }

    #[test]
    fn test_generated_markers_differ() {
        assert_ne!(generate_sync_marker(), generate_sync_marker());
    }
}
