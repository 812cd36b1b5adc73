//! Logical record reader.
//!
//! Walks the segments of a split in order, decodes every block that belongs
//! to each range and hands out its lines one at a time.

use crate::block::{LogBlock, LogicalLine};
use crate::container::Codec;
use crate::error::Result;
use crate::reader::split::{CombinedSplit, FileSegment};
use crate::reader::{fraction, SegmentCursor};
use crate::schema::{LogBlockLayout, SchemaRegistry};
use std::collections::VecDeque;
use tracing::debug;

struct OpenSegment {
    cursor: SegmentCursor,
    codec: Codec,
    layout: LogBlockLayout,
}

/// Reads log lines from a split, block order then line order.
pub struct LogicalRecordReader<'a> {
    registry: &'a SchemaRegistry,
    segments: Vec<FileSegment>,
    next_segment: usize,
    current: Option<OpenSegment>,
    // Decoded blocks of the last container block not yet handed out.
    pending: VecDeque<LogBlock>,
    block: Option<LogBlock>,
    line_index: usize,
    completed_bytes: u64,
    total_bytes: u64,
}

impl<'a> LogicalRecordReader<'a> {
    /// Creates a reader over `split`. No file is opened until the first read.
    pub fn new(split: CombinedSplit, registry: &'a SchemaRegistry) -> Self {
        let total_bytes = split.total_length();
        Self {
            registry,
            segments: split.segments().to_vec(),
            next_segment: 0,
            current: None,
            pending: VecDeque::new(),
            block: None,
            line_index: 0,
            completed_bytes: 0,
            total_bytes,
        }
    }

    /// Returns the next line, or `None` once every segment is exhausted.
    ///
    /// # Errors
    ///
    /// Header errors (`BadMagic`, `TruncatedInput`), `Desync`, codec and
    /// decoding errors are returned as they occur. A truncated final block
    /// ends its segment quietly.
    pub fn next_line(&mut self) -> Result<Option<LogicalLine>> {
        loop {
            if let Some(block) = &self.block {
                if let Some(line) = block.lines.get(self.line_index) {
                    self.line_index += 1;
                    return Ok(Some(LogicalLine {
                        timestamp: block.timestamp_of(line)?,
                        message: line.message.clone(),
                        event_id: line.event_id,
                        create_time: block.create_time,
                        block_number: block.block_number,
                        line_number: self.line_index as i64,
                    }));
                }
            }

            if let Some(block) = self.pending.pop_front() {
                self.block = Some(block);
                self.line_index = 0;
                continue;
            }
            self.block = None;

            if !self.read_next_blocks()? {
                return Ok(None);
            }
        }
    }

    /// Fraction of the split's bytes consumed, between 0.0 and 1.0.
    pub fn progress(&self) -> f32 {
        let current = self.current.as_ref().map_or(0, |s| s.cursor.consumed());
        fraction(self.completed_bytes + current, self.total_bytes)
    }

    // Fills `pending` from the next container block, opening segments as
    // needed. Returns false when the split is exhausted.
    fn read_next_blocks(&mut self) -> Result<bool> {
        loop {
            let Some(segment) = &mut self.current else {
                if !self.open_next_segment()? {
                    return Ok(false);
                }
                continue;
            };

            match segment.cursor.next_block()? {
                Some(raw) => {
                    let data = segment.codec.decompress(&raw.payload)?;
                    self.pending
                        .extend(LogBlock::decode_all(&data, raw.entry_count, segment.layout)?);
                    return Ok(true);
                }
                None => {
                    self.close_segment();
                }
            }
        }
    }

    fn open_next_segment(&mut self) -> Result<bool> {
        while self.next_segment < self.segments.len() {
            let index = self.next_segment;
            self.next_segment += 1;

            let Some(cursor) = SegmentCursor::open(&self.segments[index])? else {
                self.completed_bytes += self.segments[index].length;
                continue;
            };
            let header = cursor.header();
            let codec = header.codec()?;
            let layout = self.registry.resolve_log_block(&header.schema)?;
            self.current = Some(OpenSegment {
                cursor,
                codec,
                layout,
            });
            return Ok(true);
        }
        Ok(false)
    }

    fn close_segment(&mut self) {
        if self.current.take().is_some() {
            let segment = &self.segments[self.next_segment - 1];
            debug!(path = %segment.path.display(), "Finished segment");
            self.completed_bytes += segment.length;
        }
    }
}

impl Iterator for LogicalRecordReader<'_> {
    type Item = Result<LogicalLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}
