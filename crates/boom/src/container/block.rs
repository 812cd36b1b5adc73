//! Block-level access to container files.
//!
//! Every block on disk is laid out as
//!
//! ```text
//! varint(entryCount) | varint(byteLength) | payload | sync marker (16 bytes)
//! ```
//!
//! [`ContainerCursor`] tracks the byte offset of a buffered reader so callers
//! can reason about split ranges, find the next block boundary by scanning for
//! the sync marker, and pull one block at a time without decompressing it.

use crate::container::header::{ContainerHeader, SyncMarker};
use crate::container::varint::{self, put_long};
use crate::container::SYNC_SIZE;
use crate::error::{BoomError, Result};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::warn;

/// One compressed block as stored on disk, minus its trailing sync marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// Number of entries serialized in the payload.
    pub entry_count: i64,
    /// Codec-compressed entry bytes.
    pub payload: Vec<u8>,
}

impl RawBlock {
    /// Encodes the block prefix and payload, without a sync marker.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload.len() + 20);
        put_long(&mut buf, self.entry_count);
        put_long(&mut buf, self.payload.len() as i64);
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Position-tracking buffered reader over a container stream.
pub struct ContainerCursor<R> {
    inner: BufReader<R>,
    pos: u64,
    len: u64,
}

impl ContainerCursor<File> {
    /// Opens a container file for reading.
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read + Seek> ContainerCursor<R> {
    /// Wraps a seekable stream positioned anywhere; the cursor starts at 0.
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner: BufReader::new(inner),
            pos: 0,
            len,
        })
    }

    /// Total length of the underlying stream.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true for a zero-length stream.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current offset from the start of the stream.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Returns true once every byte of the stream has been consumed.
    pub fn at_eof(&self) -> bool {
        self.pos >= self.len
    }

    /// Moves the cursor to an absolute offset.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    /// Reads the container header from the start of the stream.
    pub fn read_header(&mut self) -> Result<ContainerHeader> {
        self.seek_to(0)?;
        ContainerHeader::read_from(self)
    }

    /// Scans forward byte by byte for the first complete occurrence of `sync`.
    ///
    /// Returns the offset just past the marker, which is where the next block
    /// starts, or `None` if the stream ends first. The scan compares a
    /// 16-byte sliding window and never looks at block contents.
    pub fn advance_past_sync(&mut self, sync: &SyncMarker) -> Result<Option<u64>> {
        let mut window = [0u8; SYNC_SIZE];
        let mut filled = 0usize;
        let mut head = 0usize;
        let mut byte = [0u8; 1];

        loop {
            match self.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            window[head] = byte[0];
            head = (head + 1) % SYNC_SIZE;
            if filled < SYNC_SIZE {
                filled += 1;
                if filled < SYNC_SIZE {
                    continue;
                }
            }

            // The oldest byte of the ring sits at `head`.
            if (0..SYNC_SIZE).all(|i| window[(head + i) % SYNC_SIZE] == sync[i]) {
                return Ok(Some(self.pos));
            }
        }
    }

    /// Reads the next block and verifies its trailing sync marker.
    ///
    /// Returns `None` at end of stream. A block cut short by the end of the
    /// stream is a truncated tail left behind by an aborted writer: it is
    /// logged and also reported as `None`, leaving earlier blocks valid.
    ///
    /// # Errors
    ///
    /// Returns `BoomError::Desync` if the marker after the block differs from
    /// `sync`.
    pub fn next_raw_block(&mut self, sync: &SyncMarker) -> Result<Option<RawBlock>> {
        if self.at_eof() {
            return Ok(None);
        }
        let block_start = self.pos;

        match self.read_block_body(sync) {
            Ok(block) => Ok(Some(block)),
            Err(e) if self.at_eof() && is_short_read(&e) => {
                warn!(
                    offset = block_start,
                    len = self.len,
                    "Truncated block at end of stream, stopping: {}",
                    e
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn read_block_body(&mut self, sync: &SyncMarker) -> Result<RawBlock> {
        let entry_count = varint::read_long(self)?;
        if entry_count < 0 {
            return Err(BoomError::MalformedRecord(format!(
                "negative block entry count {}",
                entry_count
            )));
        }
        let payload = varint::read_length_prefixed_bytes(self)?;

        let marker_offset = self.pos;
        let mut marker = [0u8; SYNC_SIZE];
        self.read_exact(&mut marker)
            .map_err(|e| BoomError::from_read(e, "block sync marker"))?;
        if &marker != sync {
            return Err(BoomError::Desync {
                offset: marker_offset,
            });
        }

        Ok(RawBlock {
            entry_count,
            payload,
        })
    }
}

fn is_short_read(err: &BoomError) -> bool {
    err.is_truncation() || matches!(err, BoomError::MalformedVarint { .. })
}

impl<R: Read> Read for ContainerCursor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}
