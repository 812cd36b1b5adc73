//! Log block data model.
//!
//! A [`LogBlock`] groups lines that share one second (forward writing) or one
//! externally supplied `(second, createTime, blockNumber)` identity
//! (reassembly). Its datum encoding is
//!
//! ```text
//! long second | long createTime | long blockNumber | array<line>
//! line = long ms | int eventId | string message
//! ```
//!
//! where an array is written as counted item blocks ending in a zero count.

use crate::container::varint::{self, put_int, put_long, put_string};
use crate::error::{BoomError, Result};
use crate::schema::LogBlockLayout;
use std::io::Read;

/// Milliseconds per second.
pub const MILLIS_PER_SECOND: i64 = 1000;

/// Splits an epoch-millisecond timestamp into `(second, ms_offset)`.
///
/// Pre-epoch timestamps floor towards negative infinity, so the offset is
/// always in `0..1000`.
#[inline]
pub fn split_timestamp(timestamp_ms: i64) -> (i64, u32) {
    (
        timestamp_ms.div_euclid(MILLIS_PER_SECOND),
        timestamp_ms.rem_euclid(MILLIS_PER_SECOND) as u32,
    )
}

/// One line of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Milliseconds past the block's second (0-999).
    pub ms_offset: u32,
    /// Event identifier, 0 unless supplied.
    pub event_id: i32,
    /// Line text.
    pub message: String,
}

impl LogLine {
    /// Creates a line.
    pub fn new(ms_offset: u32, event_id: i32, message: impl Into<String>) -> Self {
        Self {
            ms_offset,
            event_id,
            message: message.into(),
        }
    }
}

/// A batch of lines sharing a block identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBlock {
    /// Epoch seconds shared by every line.
    pub second: i64,
    /// Epoch millis at which the block was opened.
    pub create_time: i64,
    /// 1-based sequence number within the output stream.
    pub block_number: i64,
    /// Lines in append order.
    pub lines: Vec<LogLine>,
}

impl LogBlock {
    /// Creates an empty block.
    pub fn new(second: i64, create_time: i64, block_number: i64) -> Self {
        Self {
            second,
            create_time,
            block_number,
            lines: Vec::new(),
        }
    }

    /// Number of lines in the block.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if the block holds no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns true if this block has the given identity triple.
    pub fn has_identity(&self, second: i64, create_time: i64, block_number: i64) -> bool {
        self.second == second && self.create_time == create_time && self.block_number == block_number
    }

    /// Absolute timestamp of a line of this block.
    ///
    /// # Errors
    ///
    /// `MalformedRecord` if the timestamp does not fit in epoch millis, which
    /// only a corrupt or foreign block can produce.
    pub fn timestamp_of(&self, line: &LogLine) -> Result<i64> {
        let ms = i128::from(self.second) * i128::from(MILLIS_PER_SECOND) + i128::from(line.ms_offset);
        i64::try_from(ms).map_err(|_| {
            BoomError::MalformedRecord(format!(
                "second {} out of range for a millisecond timestamp",
                self.second
            ))
        })
    }

    /// Appends the datum encoding of this block to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        put_long(buf, self.second);
        put_long(buf, self.create_time);
        put_long(buf, self.block_number);
        if !self.lines.is_empty() {
            put_long(buf, self.lines.len() as i64);
            for line in &self.lines {
                put_long(buf, line.ms_offset as i64);
                put_int(buf, line.event_id);
                put_string(buf, &line.message);
            }
        }
        put_long(buf, 0);
    }

    /// Returns the datum encoding of this block.
    pub fn encode(&self) -> Vec<u8> {
        let size: usize = self.lines.iter().map(|l| l.message.len() + 8).sum();
        let mut buf = Vec::with_capacity(size + 32);
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes one block datum.
    ///
    /// Lines of a [`LogBlockLayout::LEGACY`] file have no event id and are
    /// given `event_id = 0`.
    pub fn decode<R: Read>(reader: &mut R, layout: LogBlockLayout) -> Result<Self> {
        let second = varint::read_long(reader)?;
        let create_time = varint::read_long(reader)?;
        let block_number = varint::read_long(reader)?;
        let mut block = Self::new(second, create_time, block_number);

        loop {
            let mut count = varint::read_long(reader)?;
            if count == 0 {
                break;
            }
            if count < 0 {
                count = count.checked_neg().ok_or_else(|| {
                    BoomError::MalformedRecord("line array count overflow".to_string())
                })?;
                let _byte_size = varint::read_long(reader)?;
            }
            block.lines.reserve(count.min(1024) as usize);
            for _ in 0..count {
                block.lines.push(decode_line(reader, layout)?);
            }
        }

        Ok(block)
    }

    /// Decodes the `entry_count` blocks held by one decompressed container
    /// block payload.
    ///
    /// # Errors
    ///
    /// Returns `BoomError::MalformedRecord` if bytes remain after the last
    /// block.
    pub fn decode_all(data: &[u8], entry_count: i64, layout: LogBlockLayout) -> Result<Vec<Self>> {
        let mut cursor = data;
        let mut blocks = Vec::with_capacity(entry_count.clamp(0, 1024) as usize);
        for _ in 0..entry_count {
            blocks.push(Self::decode(&mut cursor, layout)?);
        }
        if !cursor.is_empty() {
            return Err(BoomError::MalformedRecord(format!(
                "{} trailing bytes after {} log blocks",
                cursor.len(),
                entry_count
            )));
        }
        Ok(blocks)
    }
}

fn decode_line<R: Read>(reader: &mut R, layout: LogBlockLayout) -> Result<LogLine> {
    let ms = varint::read_long(reader)?;
    if !(0..MILLIS_PER_SECOND).contains(&ms) {
        return Err(BoomError::MalformedRecord(format!(
            "line offset {}ms outside 0..1000",
            ms
        )));
    }
    let event_id = if layout.has_event_id {
        varint::read_int(reader)?
    } else {
        0
    };
    let message = varint::read_string(reader)?;
    Ok(LogLine {
        ms_offset: ms as u32,
        event_id,
        message,
    })
}

/// One line as produced by the logical reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Epoch millis (`second * 1000 + ms_offset`).
    pub timestamp: i64,
    /// Line text.
    pub message: String,
    /// Event identifier.
    pub event_id: i32,
    /// Creation time of the enclosing block.
    pub create_time: i64,
    /// Number of the enclosing block.
    pub block_number: i64,
    /// 1-based position of the line within its block.
    pub line_number: i64,
}
