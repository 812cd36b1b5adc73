//! Buffered container writer.
//!
//! Serialized entries are appended to an in-memory buffer. Once the buffer
//! reaches the sync interval, on `flush()` and on `finish()`, the buffer is
//! compressed and written as one block followed by the sync marker. The sync
//! interval therefore bounds how far apart split boundaries can be.

use crate::container::block::RawBlock;
use crate::container::codec::Codec;
use crate::container::header::ContainerHeader;
use crate::error::{BoomError, Result};
use std::io::{self, Write};
use tracing::{debug, error, trace};

/// Smallest accepted sync interval in bytes.
pub const MIN_SYNC_INTERVAL: usize = 32;

/// Largest accepted sync interval in bytes (1 GiB).
pub const MAX_SYNC_INTERVAL: usize = 1 << 30;

/// Default sync interval (2 MiB).
pub const DEFAULT_SYNC_INTERVAL: usize = 2 * 1024 * 1024;

/// Writes entries into a container stream.
pub struct ContainerWriter<W: Write> {
    inner: W,
    header: ContainerHeader,
    codec: Codec,
    sync_interval: usize,
    buffer: Vec<u8>,
    buffered_entries: i64,
    blocks_written: u64,
    bytes_written: u64,
    torn: bool,
}

impl<W: Write> ContainerWriter<W> {
    /// Starts a new container with a fresh sync marker and writes its header.
    pub fn new(inner: W, schema: &str, codec: Codec, sync_interval: usize) -> Result<Self> {
        Self::with_header(inner, ContainerHeader::new(schema, codec), codec, sync_interval)
    }

    /// Starts a new container with an explicit header.
    ///
    /// `codec` must carry the same name as `header.codec`; it also supplies the
    /// compression level.
    pub fn with_header(
        mut inner: W,
        header: ContainerHeader,
        codec: Codec,
        sync_interval: usize,
    ) -> Result<Self> {
        if codec.name() != header.codec {
            return Err(BoomError::InvalidConfig(format!(
                "codec {} does not match header codec {}",
                codec.name(),
                header.codec
            )));
        }
        if !(MIN_SYNC_INTERVAL..=MAX_SYNC_INTERVAL).contains(&sync_interval) {
            return Err(BoomError::InvalidConfig(format!(
                "sync interval {} outside {}..={}",
                sync_interval, MIN_SYNC_INTERVAL, MAX_SYNC_INTERVAL
            )));
        }

        let header_bytes = header.to_bytes();
        inner.write_all(&header_bytes)?;
        debug!(header = %header, "started container");

        Ok(Self {
            inner,
            header,
            codec,
            sync_interval,
            buffer: Vec::new(),
            buffered_entries: 0,
            blocks_written: 0,
            bytes_written: header_bytes.len() as u64,
            torn: false,
        })
    }

    /// Returns the container header.
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Number of entries buffered but not yet written as a block.
    pub fn buffered_entries(&self) -> i64 {
        self.buffered_entries
    }

    /// Number of blocks written so far.
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Bytes written to the underlying stream, header included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Returns true once a block write failed after part of the block had
    /// reached the stream.
    ///
    /// The stream then holds a torn block. Sequential readers stop with
    /// `Desync` at that point; blocks written afterwards are only reachable
    /// by split readers whose range starts past the torn bytes.
    pub fn is_torn(&self) -> bool {
        self.torn
    }

    /// Appends one serialized entry, cutting a block if the buffer is full.
    ///
    /// # Errors
    ///
    /// If cutting the block fails every buffered entry is discarded and the
    /// error is returned; the writer stays usable. See [`Self::is_torn`] for
    /// a failure that left part of the block in the stream.
    pub fn append_datum(&mut self, datum: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(datum);
        self.buffered_entries += 1;
        if self.buffer.len() >= self.sync_interval {
            self.write_block()?;
        }
        Ok(())
    }

    /// Writes any buffered entries as a block and flushes the stream.
    pub fn flush(&mut self) -> Result<()> {
        self.write_block()?;
        self.inner.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying stream.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    fn write_block(&mut self) -> Result<()> {
        if self.buffered_entries == 0 {
            return Ok(());
        }

        let entries = self.buffered_entries;
        let data = std::mem::take(&mut self.buffer);
        self.buffered_entries = 0;

        let block = RawBlock {
            entry_count: entries,
            payload: self.codec.compress(&data)?,
        };
        let mut frame = block.encode();
        frame.extend_from_slice(&self.header.sync_marker);
        self.write_frame(&frame)?;

        self.blocks_written += 1;
        self.bytes_written += frame.len() as u64;
        trace!(
            entries,
            raw = data.len(),
            compressed = block.payload.len(),
            "wrote container block"
        );
        Ok(())
    }

    // write_all that remembers whether a failure left a partial frame behind.
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < frame.len() {
            let failure = match self.inner.write(&frame[written..]) {
                Ok(0) => io::Error::from(io::ErrorKind::WriteZero),
                Ok(n) => {
                    written += n;
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => e,
            };
            if written > 0 {
                self.torn = true;
                self.bytes_written += written as u64;
                error!(
                    written,
                    frame = frame.len(),
                    "block write failed part way, stream is torn"
                );
            }
            return Err(failure.into());
        }
        Ok(())
    }
}
