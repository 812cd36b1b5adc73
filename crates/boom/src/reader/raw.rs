//! Raw block reader.
//!
//! Yields the compressed blocks of a split without inflating them. The cost
//! per block is a varint pair, one payload copy and a marker comparison, no
//! matter how large the block is.

use crate::container::{ContainerHeader, RawBlock};
use crate::error::Result;
use crate::reader::split::{CombinedSplit, FileSegment};
use crate::reader::{fraction, SegmentCursor};
use std::sync::Arc;
use tracing::debug;

/// One compressed block together with the header of the file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlockSpan {
    /// Header of the source file, shared by all spans of that file.
    pub header: Arc<ContainerHeader>,
    /// Declared number of log blocks in the payload.
    pub entry_count: i64,
    /// Compressed payload, exactly as stored.
    pub payload: Vec<u8>,
}

impl RawBlockSpan {
    /// Returns true if the block declares no entries.
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Encodes the count, length and payload, without a sync marker.
    pub fn encode_block(&self) -> Vec<u8> {
        RawBlock {
            entry_count: self.entry_count,
            payload: self.payload.clone(),
        }
        .encode()
    }
}

/// Reads the raw blocks of a split.
pub struct RawBlockReader {
    segments: Vec<FileSegment>,
    next_segment: usize,
    current: Option<SegmentCursor>,
    completed_bytes: u64,
    total_bytes: u64,
    blocks_read: u64,
}

impl RawBlockReader {
    /// Creates a reader over `split`. No file is opened until the first read.
    pub fn new(split: CombinedSplit) -> Self {
        let total_bytes = split.total_length();
        Self {
            segments: split.segments().to_vec(),
            next_segment: 0,
            current: None,
            completed_bytes: 0,
            total_bytes,
            blocks_read: 0,
        }
    }

    /// Returns the next block of the split.
    ///
    /// # Errors
    ///
    /// Returns header errors of any segment and `BoomError::Desync` when the
    /// marker after a block does not match its file's header.
    pub fn next_span(&mut self) -> Result<Option<RawBlockSpan>> {
        loop {
            let Some(cursor) = &mut self.current else {
                if !self.open_next_segment()? {
                    return Ok(None);
                }
                continue;
            };

            if let Some(block) = cursor.next_block()? {
                self.blocks_read += 1;
                return Ok(Some(RawBlockSpan {
                    header: Arc::clone(cursor.header()),
                    entry_count: block.entry_count,
                    payload: block.payload,
                }));
            }

            self.current = None;
            let segment = &self.segments[self.next_segment - 1];
            debug!(
                path = %segment.path.display(),
                blocks = self.blocks_read,
                "Finished segment"
            );
            self.completed_bytes += segment.length;
        }
    }

    /// Fraction of the split's bytes consumed, between 0.0 and 1.0.
    pub fn progress(&self) -> f32 {
        let current = self.current.as_ref().map_or(0, SegmentCursor::consumed);
        fraction(self.completed_bytes + current, self.total_bytes)
    }

    /// Number of blocks returned so far.
    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    fn open_next_segment(&mut self) -> Result<bool> {
        while self.next_segment < self.segments.len() {
            let segment = &self.segments[self.next_segment];
            self.next_segment += 1;
            match SegmentCursor::open(segment)? {
                Some(cursor) => {
                    self.current = Some(cursor);
                    return Ok(true);
                }
                None => self.completed_bytes += segment.length,
            }
        }
        Ok(false)
    }
}

impl Iterator for RawBlockReader {
    type Item = Result<RawBlockSpan>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_span().transpose()
    }
}
