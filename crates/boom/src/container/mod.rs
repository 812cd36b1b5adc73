//! Object container file format.
//!
//! A container file is a header followed by any number of compressed blocks,
//! each block terminated by the file's sync marker:
//!
//! ```text
//! MAGIC | METADATA_MAP | SYNC | (COUNT | LENGTH | PAYLOAD | SYNC)*
//! ```
//!
//! The layout is byte-compatible with Avro object container files, so they
//! can be inspected with standard Avro tooling.

pub mod block;
pub mod codec;
pub mod header;
pub mod varint;
pub mod writer;

pub use block::{ContainerCursor, RawBlock};
pub use codec::Codec;
pub use header::{generate_sync_marker, ContainerHeader, SyncMarker};
pub use writer::ContainerWriter;

/// Magic bytes at the start of every container file.
pub const MAGIC: [u8; 4] = [b'O', b'b', b'j', 1];

/// Length of the sync marker in bytes.
pub const SYNC_SIZE: usize = 16;

/// Metadata key holding the JSON schema text.
pub const SCHEMA_KEY: &str = "avro.schema";

/// Metadata key holding the codec name.
pub const CODEC_KEY: &str = "avro.codec";
