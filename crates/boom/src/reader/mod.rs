//! Readers over split ranges of boom files.
//!
//! Both readers share one boundary rule: a block belongs to the range
//! `[start, end)` when the sync marker in front of it starts inside that
//! range. Ranges that partition a file therefore visit every block exactly
//! once, whatever offsets the splitter chose.
//!
//! ```text
//!             start                               end
//!               │                                  │
//!   ...block | SYNC | block A | SYNC | block B | SY│NC | block C ...
//!                   └─ A: marker starts ≥ start   │
//!                                   B ────────────┤  marker starts < end
//!                                                 └─ C belongs to the next range
//! ```

pub mod logical;
pub mod raw;
pub mod split;

pub use logical::LogicalRecordReader;
pub use raw::{RawBlockReader, RawBlockSpan};
pub use split::{CombinedSplit, FileSegment};

use crate::container::{ContainerCursor, ContainerHeader, RawBlock, SYNC_SIZE};
use crate::error::Result;
use std::fs::File;
use std::sync::Arc;
use tracing::{debug, info};

/// An open range of one file, aligned to its first block boundary.
pub(crate) struct SegmentCursor {
    cursor: ContainerCursor<File>,
    header: Arc<ContainerHeader>,
    start: u64,
    length: u64,
    exhausted: bool,
}

impl SegmentCursor {
    /// Opens a segment and positions it on its first block.
    ///
    /// Returns `None` for an empty range or an empty file, in which case the
    /// header is never read.
    pub(crate) fn open(segment: &FileSegment) -> Result<Option<Self>> {
        if segment.length == 0 {
            debug!(path = %segment.path.display(), "Skipping empty segment");
            return Ok(None);
        }
        let mut cursor = ContainerCursor::open(&segment.path)?;
        if cursor.is_empty() {
            debug!(path = %segment.path.display(), "Skipping zero-length file");
            return Ok(None);
        }

        info!(
            path = %segment.path.display(),
            start = segment.start,
            length = segment.length,
            "Initializing segment"
        );
        let header = Arc::new(cursor.read_header()?);

        cursor.seek_to(segment.start)?;
        let exhausted = match cursor.advance_past_sync(&header.sync_marker)? {
            Some(first_block) => {
                info!(offset = first_block, "Found first sync marker");
                false
            }
            None => {
                debug!(path = %segment.path.display(), "No sync marker after range start");
                true
            }
        };

        Ok(Some(Self {
            cursor,
            header,
            start: segment.start,
            length: segment.length,
            exhausted,
        }))
    }

    pub(crate) fn header(&self) -> &Arc<ContainerHeader> {
        &self.header
    }

    /// Reads the next block that belongs to this range.
    pub(crate) fn next_block(&mut self) -> Result<Option<RawBlock>> {
        if self.exhausted {
            return Ok(None);
        }
        // The marker in front of the cursor started SYNC_SIZE bytes earlier.
        let end = self.start.saturating_add(self.length);
        if self.cursor.position() >= end.saturating_add(SYNC_SIZE as u64) {
            self.exhausted = true;
            return Ok(None);
        }
        let block = self.cursor.next_raw_block(&self.header.sync_marker)?;
        if block.is_none() {
            self.exhausted = true;
        }
        Ok(block)
    }

    /// Bytes of the range consumed so far, capped at its length.
    pub(crate) fn consumed(&self) -> u64 {
        if self.exhausted {
            return self.length;
        }
        self.cursor
            .position()
            .saturating_sub(self.start)
            .min(self.length)
    }
}

/// Fraction of `total` bytes covered by `done`, clamped to `0.0..=1.0`.
pub(crate) fn fraction(done: u64, total: u64) -> f32 {
    if total == 0 {
        return 1.0;
    }
    (done as f64 / total as f64).clamp(0.0, 1.0) as f32
}
